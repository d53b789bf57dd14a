//! Stream quanta and the lazy, one-shot sequence they travel in.
//!
//! [`ChunkEvent`] is the unit a postprocessor pipeline operates on.
//! [`ChunkStream`] wraps an async [`Stream`] of chunk events plus the
//! terminal metadata (`finish_reason`, an optional `instruction` slot) a
//! consumer needs once the sequence ends. A stream is consumed exactly once;
//! [`ChunkStream::next_blocking`] is provided for synchronous callers but
//! drives the same underlying async stream.

pub mod postprocessors;

use crate::error::Result;
use futures::Stream;
use futures::StreamExt;
use std::pin::Pin;

/// Routing sentinels a postprocessor (today, only [`postprocessors::JsonKeyExtractorPP`])
/// may tag a chunk with to steer it away from the default stream/aggregate
/// channels. Never produced by an LLM adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingSentinel {
    /// Added to the aggregate string only, not streamed to the client.
    StreamIgnore,
    /// Streamed to the client only, not added to the aggregate string.
    ResponseIgnore,
    /// Discarded from both channels.
    BothIgnore,
}

impl RoutingSentinel {
    fn as_str(&self) -> &'static str {
        match self {
            RoutingSentinel::StreamIgnore => "[STREAM_IGNORE]",
            RoutingSentinel::ResponseIgnore => "[RESPONSE_IGNORE]",
            RoutingSentinel::BothIgnore => "[BOTH_IGNORE]",
        }
    }
}

/// Semantic tag carried by a [`ChunkEvent`].
///
/// A small fixed set of well-known tags (`think`, `char`, `tool`, `status`),
/// an open-ended `Custom` tag for caller-defined types, and the three
/// routing sentinels used internally by postprocessors. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    Think,
    Char,
    Tool,
    Status,
    Custom(String),
    Routing(RoutingSentinel),
}

impl ContentType {
    pub fn custom(tag: impl Into<String>) -> Self {
        ContentType::Custom(tag.into())
    }

    /// Constructs a routing sentinel. Crate-private: only postprocessors
    /// emit these, never the LLM adapter or application code.
    pub(crate) fn routing(sentinel: RoutingSentinel) -> Self {
        ContentType::Routing(sentinel)
    }

    pub fn is_routing_sentinel(&self) -> bool {
        matches!(self, ContentType::Routing(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Think => "think",
            ContentType::Char => "char",
            ContentType::Tool => "tool",
            ContentType::Status => "status",
            ContentType::Custom(s) => s.as_str(),
            ContentType::Routing(r) => r.as_str(),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for ContentType {
    fn from(s: &str) -> Self {
        match s {
            "think" => ContentType::Think,
            "char" => ContentType::Char,
            "tool" => ContentType::Tool,
            "status" => ContentType::Status,
            "[STREAM_IGNORE]" => ContentType::Routing(RoutingSentinel::StreamIgnore),
            "[RESPONSE_IGNORE]" => ContentType::Routing(RoutingSentinel::ResponseIgnore),
            "[BOTH_IGNORE]" => ContentType::Routing(RoutingSentinel::BothIgnore),
            other => ContentType::Custom(other.to_string()),
        }
    }
}

/// One unit of an LLM streaming response after local tagging.
#[derive(Debug, Clone)]
pub struct ChunkEvent {
    pub content: String,
    pub content_type: ContentType,
}

impl ChunkEvent {
    pub fn new(content: impl Into<String>, content_type: ContentType) -> Self {
        Self {
            content: content.into(),
            content_type,
        }
    }

    pub fn char(content: impl Into<String>) -> Self {
        Self::new(content, ContentType::Char)
    }

    pub fn think(content: impl Into<String>) -> Self {
        Self::new(content, ContentType::Think)
    }
}

type BoxedEventStream = Pin<Box<dyn Stream<Item = Result<ChunkEvent>> + Send>>;

/// A one-shot lazy sequence of [`ChunkEvent`]s, with terminal metadata that
/// fills in once the underlying stream is exhausted.
///
/// Consumed via `for-each` (async `StreamExt::next`, or the blocking
/// [`ChunkStream::next_blocking`] for synchronous callers) exactly once. A
/// postprocessor pipeline wraps one `ChunkStream` to produce another.
pub struct ChunkStream {
    inner: BoxedEventStream,
    finish_reason: Option<String>,
    instruction: Option<String>,
}

impl ChunkStream {
    pub fn new(inner: BoxedEventStream) -> Self {
        Self {
            inner,
            finish_reason: None,
            instruction: None,
        }
    }

    pub fn with_finish_reason(mut self, reason: impl Into<String>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    pub fn instruction(&self) -> Option<&str> {
        self.instruction.as_deref()
    }

    /// Wraps a constant string as a synthetic stream, optionally pacing
    /// emission with `interval` between characters.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let events: Vec<Result<ChunkEvent>> = text
            .chars()
            .map(|c| Ok(ChunkEvent::char(c.to_string())))
            .collect();
        ChunkStream::new(Box::pin(futures::stream::iter(events))).with_finish_reason("stop")
    }

    /// Drains the stream, blocking the current thread. Intended for
    /// synchronous call sites; drives the same underlying async stream via
    /// `futures::executor::block_on`, so it must not be called from within
    /// an async task that would deadlock on its own executor.
    pub fn next_blocking(&mut self) -> Option<Result<ChunkEvent>> {
        futures::executor::block_on(self.inner.next())
    }

    /// Drains the channel into a single concatenated string, skipping
    /// routing sentinels tagged `ResponseIgnore`/`BothIgnore` that are not
    /// meant for the aggregate.
    pub async fn collect(mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(event) = self.inner.next().await {
            let event = event?;
            match &event.content_type {
                ContentType::Routing(RoutingSentinel::ResponseIgnore)
                | ContentType::Routing(RoutingSentinel::BothIgnore) => continue,
                _ => out.push_str(&event.content),
            }
        }
        Ok(out)
    }
}

impl Stream for ChunkStream {
    type Item = Result<ChunkEvent>;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
