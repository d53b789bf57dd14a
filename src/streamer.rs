//! Per-request SSE streamer: multiplexes agent activity into OpenAI
//! `chat.completion.chunk`-shaped Server-Sent Events.
//!
//! One [`SseStreamer`] is bound to one HTTP request/response cycle. Multiple
//! producers (the agent loop, derived agents sharing the same streamer) call
//! [`SseStreamer::send`]; a single consumer drains it via
//! [`SseStreamer::start_streaming`] (for the HTTP transport) or
//! [`SseStreamer::collect`] (for a non-streamed response).

use chrono::Utc;
use futures::Stream;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// An OpenAI `chat.completion.chunk` SSE frame, with the Alphora
/// `content_type` extension on `delta`.
#[derive(Debug, Clone, Serialize)]
pub struct SseFrame {
    pub id: String,
    pub object: &'static str,
    pub created: String,
    pub model: String,
    pub choices: Vec<SseChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SseChoice {
    pub index: u32,
    pub delta: SseDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SseDelta {
    pub content: String,
    pub content_type: String,
}

impl SseFrame {
    fn new(id: &str, model: &str, content: String, content_type: String, finish_reason: Option<String>) -> Self {
        Self {
            id: id.to_string(),
            object: "chat.completion.chunk",
            created: Utc::now().to_rfc3339(),
            model: model.to_string(),
            choices: vec![SseChoice {
                index: 0,
                delta: SseDelta { content, content_type },
                finish_reason,
            }],
        }
    }

    /// Renders this frame as a full SSE wire line: `data: {...}\n\n`.
    pub fn to_sse_line(&self) -> String {
        format!("data: {}\n\n", serde_json::to_string(self).unwrap_or_default())
    }
}

enum Item {
    Chunk { content: String, content_type: String },
    Stop { reason: String },
}

/// Single-use, per-request streamer. Bounded channel gives producers
/// back-pressure; after a terminal frame, further `send` calls are no-ops.
pub struct SseStreamer {
    id: String,
    model: String,
    tx: mpsc::Sender<Item>,
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<Item>>>,
    terminated: Arc<AtomicBool>,
    idle_timeout: Duration,
}

impl SseStreamer {
    pub fn new(model: impl Into<String>, idle_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(256);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            tx,
            rx: tokio::sync::Mutex::new(Some(rx)),
            terminated: Arc::new(AtomicBool::new(false)),
            idle_timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Enqueues one content chunk. Never blocks indefinitely: the channel
    /// is bounded, so a full channel applies back-pressure to the caller via
    /// the returned future rather than dropping data. No-op after
    /// termination.
    pub async fn send(&self, content_type: impl Into<String>, content: impl Into<String>) {
        if self.terminated.load(Ordering::SeqCst) {
            return;
        }
        let _ = self
            .tx
            .send(Item::Chunk {
                content: content.into(),
                content_type: content_type.into(),
            })
            .await;
    }

    /// Enqueues the terminal frame with `reason` (`"stop"`, `"error"`,
    /// `"timeout"`, `"cancelled"`). At most one terminal frame is ever
    /// emitted.
    pub async fn stop(&self, reason: impl Into<String>) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(Item::Stop { reason: reason.into() }).await;
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Returns an async iterator of rendered SSE frames for HTTP transport.
    /// Consumes the receiver; callable once per streamer.
    pub async fn start_streaming(&self) -> impl Stream<Item = SseFrame> + Send + 'static {
        let rx = {
            let mut guard = self.rx.lock().await;
            guard.take()
        };
        let id = self.id.clone();
        let model = self.model.clone();
        let idle_timeout = self.idle_timeout;

        stream_frames(rx, id, model, idle_timeout)
    }

    /// Drains the channel into a single concatenated content string, for
    /// non-streamed requests. Stops at the terminal frame.
    pub async fn collect(&self) -> String {
        let mut rx = {
            let mut guard = self.rx.lock().await;
            guard.take()
        };
        let Some(rx) = rx.as_mut() else { return String::new() };

        let mut out = String::new();
        loop {
            match tokio::time::timeout(self.idle_timeout, rx.recv()).await {
                Ok(Some(Item::Chunk { content, .. })) => out.push_str(&content),
                Ok(Some(Item::Stop { .. })) | Ok(None) => break,
                Err(_) => break,
            }
        }
        out
    }
}

/// Unfolds the channel into a stream of frames: one chunk frame per
/// [`Item::Chunk`], a final status frame on [`Item::Stop`] or idle timeout,
/// then termination.
fn stream_frames(
    rx: Option<mpsc::Receiver<Item>>,
    id: String,
    model: String,
    idle_timeout: Duration,
) -> impl Stream<Item = SseFrame> + Send + 'static {
    futures::stream::unfold(rx, move |state| {
        let id = id.clone();
        let model = model.clone();
        async move {
            let mut rx = state?;
            match tokio::time::timeout(idle_timeout, rx.recv()).await {
                Ok(Some(Item::Chunk { content, content_type })) => {
                    let frame = SseFrame::new(&id, &model, content, content_type, None);
                    Some((frame, Some(rx)))
                }
                Ok(Some(Item::Stop { reason })) => {
                    let frame = SseFrame::new(&id, &model, String::new(), "status".to_string(), Some(reason));
                    Some((frame, None))
                }
                Ok(None) => None,
                Err(_) => {
                    let frame = SseFrame::new(&id, &model, String::new(), "status".to_string(), Some("timeout".to_string()));
                    Some((frame, None))
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt as _;

    #[tokio::test]
    async fn test_send_then_stop_emits_terminal_frame() {
        let streamer = SseStreamer::new("test-model", Duration::from_secs(5));
        streamer.send("char", "hello").await;
        streamer.stop("stop").await;

        let frames: Vec<SseFrame> = streamer.start_streaming().await.collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].choices[0].delta.content, "hello");
        assert_eq!(frames[1].choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[tokio::test]
    async fn test_send_after_stop_is_noop() {
        let streamer = SseStreamer::new("test-model", Duration::from_secs(5));
        streamer.stop("stop").await;
        streamer.send("char", "too late").await;
        let frames: Vec<SseFrame> = streamer.start_streaming().await.collect().await;
        assert_eq!(frames.len(), 1);
    }

    #[tokio::test]
    async fn test_collect_concatenates_chunks() {
        let streamer = SseStreamer::new("test-model", Duration::from_secs(5));
        streamer.send("char", "Hello, ").await;
        streamer.send("char", "world.").await;
        streamer.stop("stop").await;
        let content = streamer.collect().await;
        assert_eq!(content, "Hello, world.");
    }

    #[tokio::test]
    async fn test_idle_timeout_emits_timeout_frame() {
        let streamer = SseStreamer::new("test-model", Duration::from_millis(10));
        let frames: Vec<SseFrame> = streamer.start_streaming().await.collect().await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].choices[0].finish_reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_sse_line_format() {
        let frame = SseFrame::new("id1", "model1", "hi".to_string(), "char".to_string(), None);
        let line = frame.to_sse_line();
        assert!(line.starts_with("data: "));
        assert!(line.ends_with("\n\n"));
    }
}
