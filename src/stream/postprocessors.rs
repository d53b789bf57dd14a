//! The seven required stream postprocessors.
//!
//! A postprocessor is a function `ChunkStream -> ChunkStream`; `Postprocessor::then`
//! composes two into one that applies `self` first, then `next`. Each
//! postprocessor here owns whatever per-stream state it needs (buffers,
//! state-machine position) and must not be reused across two separate
//! stream consumptions — call `apply` fresh per stream.

use crate::error::Result;
use crate::stream::{ChunkEvent, ChunkStream, ContentType, RoutingSentinel};
use futures::{Stream, StreamExt};
use regex::Regex;
use std::collections::HashMap;
use std::pin::Pin;

/// A `ChunkStream -> ChunkStream` transform.
pub trait Postprocessor: Send + 'static {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream;

    /// Composes `self` then `next`: `self ≫ next`.
    fn then<P: Postprocessor>(self, next: P) -> Composed
    where
        Self: Sized,
    {
        Composed {
            first: Box::new(self),
            second: Box::new(next),
        }
    }
}

/// The result of composing two postprocessors with [`Postprocessor::then`].
pub struct Composed {
    first: Box<dyn Postprocessor>,
    second: Box<dyn Postprocessor>,
}

impl Postprocessor for Composed {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        self.second.apply(self.first.apply(input))
    }
}

fn wrap<S>(stream: S) -> ChunkStream
where
    S: Stream<Item = Result<ChunkEvent>> + Send + 'static,
{
    ChunkStream::new(Box::pin(stream) as Pin<Box<dyn Stream<Item = Result<ChunkEvent>> + Send>>)
}

// ============================================================================
// FilterPP
// ============================================================================

/// Drops characters in `filter_chars`; optionally restricts to or excludes a
/// set of content types (mutually exclusive). A chunk left empty after
/// filtering is dropped entirely.
pub struct FilterPP {
    filter_chars: Vec<char>,
    include_content_types: Option<Vec<String>>,
    exclude_content_types: Option<Vec<String>>,
}

impl FilterPP {
    pub fn new(filter_chars: impl Into<String>) -> Self {
        Self {
            filter_chars: filter_chars.into().chars().collect(),
            include_content_types: None,
            exclude_content_types: None,
        }
    }

    /// # Panics
    ///
    /// Panics if both `include` and `exclude` sets have already been set —
    /// they are mutually exclusive per the postprocessor's contract.
    pub fn include_content_types(mut self, types: Vec<String>) -> Self {
        assert!(
            self.exclude_content_types.is_none(),
            "include_content_types and exclude_content_types are mutually exclusive"
        );
        self.include_content_types = Some(types);
        self
    }

    pub fn exclude_content_types(mut self, types: Vec<String>) -> Self {
        assert!(
            self.include_content_types.is_none(),
            "include_content_types and exclude_content_types are mutually exclusive"
        );
        self.exclude_content_types = Some(types);
        self
    }
}

impl Postprocessor for FilterPP {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        let filter_chars = self.filter_chars;
        let include = self.include_content_types;
        let exclude = self.exclude_content_types;
        wrap(input.filter_map(move |event| {
            let keep = event.map(|e| {
                let type_str = e.content_type.as_str().to_string();
                if let Some(include) = &include {
                    if !include.contains(&type_str) {
                        return None;
                    }
                }
                if let Some(exclude) = &exclude {
                    if exclude.contains(&type_str) {
                        return None;
                    }
                }
                let filtered: String = e
                    .content
                    .chars()
                    .filter(|c| !filter_chars.contains(c))
                    .collect();
                if filtered.is_empty() {
                    None
                } else {
                    Some(ChunkEvent::new(filtered, e.content_type))
                }
            });
            futures::future::ready(match keep {
                Ok(Some(event)) => Some(Ok(event)),
                Ok(None) => None,
                Err(err) => Some(Err(err)),
            })
        }))
    }
}

// ============================================================================
// ReplacePP
// ============================================================================

/// Applies an ordered list of global `(old, new)` substring replacements to
/// every chunk, then any rules registered for that chunk's specific content
/// type.
pub struct ReplacePP {
    global: Vec<(String, String)>,
    per_type: HashMap<String, Vec<(String, String)>>,
}

impl ReplacePP {
    pub fn new() -> Self {
        Self {
            global: Vec::new(),
            per_type: HashMap::new(),
        }
    }

    pub fn replace(mut self, old: impl Into<String>, new: impl Into<String>) -> Self {
        self.global.push((old.into(), new.into()));
        self
    }

    pub fn replace_for_type(
        mut self,
        content_type: impl Into<String>,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Self {
        self.per_type
            .entry(content_type.into())
            .or_default()
            .push((old.into(), new.into()));
        self
    }
}

impl Default for ReplacePP {
    fn default() -> Self {
        Self::new()
    }
}

impl Postprocessor for ReplacePP {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        let global = self.global;
        let per_type = self.per_type;
        wrap(input.map(move |event| {
            event.map(|e| {
                let mut content = e.content;
                for (old, new) in &global {
                    content = content.replace(old.as_str(), new.as_str());
                }
                if let Some(rules) = per_type.get(e.content_type.as_str()) {
                    for (old, new) in rules {
                        content = content.replace(old.as_str(), new.as_str());
                    }
                }
                ChunkEvent::new(content, e.content_type)
            })
        }))
    }
}

// ============================================================================
// SplitterPP
// ============================================================================

/// Splits each chunk's content into individual characters, emitting one
/// [`ChunkEvent`] per character with the original content type.
pub struct SplitterPP;

impl Postprocessor for SplitterPP {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        wrap(input.flat_map(|event| match event {
            Ok(e) => {
                let content_type = e.content_type;
                let events: Vec<Result<ChunkEvent>> = e
                    .content
                    .chars()
                    .map(|c| Ok(ChunkEvent::new(c.to_string(), content_type.clone())))
                    .collect();
                futures::stream::iter(events)
            }
            Err(err) => futures::stream::iter(vec![Err(err)]),
        }))
    }
}

// ============================================================================
// TypeMapperPP
// ============================================================================

/// Rewrites `content_type` per a `{from -> to}` map; content is unchanged.
/// Types not present in the map pass through untouched.
pub struct TypeMapperPP {
    map: HashMap<String, ContentType>,
}

impl TypeMapperPP {
    pub fn new(map: HashMap<String, ContentType>) -> Self {
        Self { map }
    }
}

impl Postprocessor for TypeMapperPP {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        let map = self.map;
        wrap(input.map(move |event| {
            event.map(|e| {
                let content_type = map
                    .get(e.content_type.as_str())
                    .cloned()
                    .unwrap_or(e.content_type);
                ChunkEvent::new(e.content, content_type)
            })
        }))
    }
}

// ============================================================================
// DynamicTypePP
// ============================================================================

/// If a chunk's content contains any of a set of trigger characters, retags
/// it with that character's configured type (first match wins, in the
/// iteration order the triggers were registered); otherwise applies
/// `default_content_type` if one is set.
pub struct DynamicTypePP {
    triggers: Vec<(char, ContentType)>,
    default_content_type: Option<ContentType>,
}

impl DynamicTypePP {
    pub fn new() -> Self {
        Self {
            triggers: Vec::new(),
            default_content_type: None,
        }
    }

    pub fn on_char(mut self, trigger: char, content_type: ContentType) -> Self {
        self.triggers.push((trigger, content_type));
        self
    }

    pub fn default_content_type(mut self, content_type: ContentType) -> Self {
        self.default_content_type = Some(content_type);
        self
    }
}

impl Default for DynamicTypePP {
    fn default() -> Self {
        Self::new()
    }
}

impl Postprocessor for DynamicTypePP {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        let triggers = self.triggers;
        let default_content_type = self.default_content_type;
        wrap(input.map(move |event| {
            event.map(|e| {
                for (trigger, content_type) in &triggers {
                    if e.content.contains(*trigger) {
                        return ChunkEvent::new(e.content, content_type.clone());
                    }
                }
                match &default_content_type {
                    Some(ct) => ChunkEvent::new(e.content, ct.clone()),
                    None => e,
                }
            })
        }))
    }
}

// ============================================================================
// PatternMatcherPP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchState {
    NotMatching,
    PartialStart,
    Inside,
    PartialEnd,
}

/// Output mode for [`PatternMatcherPP`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOutputMode {
    All,
    OnlyMatched,
    ExcludeMatched,
}

/// Detects regions delimited by a `bos`/`eos` literal marker across chunk
/// boundaries. State machine: `NotMatching -> PartialStart -> Inside ->
/// PartialEnd -> NotMatching`. A small randomized emit buffer
/// (`[min_buffer_size, max_buffer_size]`) smooths emit granularity without
/// ever splitting a marker across an emitted boundary.
pub struct PatternMatcherPP {
    bos: String,
    eos: String,
    matched_type: ContentType,
    unmatched_type: Option<ContentType>,
    include_bos: bool,
    include_eos: bool,
    output_mode: PatternOutputMode,
    min_buffer_size: usize,
    max_buffer_size: usize,
}

impl PatternMatcherPP {
    pub fn new(bos: impl Into<String>, eos: impl Into<String>) -> Self {
        Self {
            bos: bos.into(),
            eos: eos.into(),
            matched_type: ContentType::custom("match"),
            unmatched_type: None,
            include_bos: true,
            include_eos: true,
            output_mode: PatternOutputMode::All,
            min_buffer_size: 2,
            max_buffer_size: 4,
        }
    }

    pub fn matched_type(mut self, content_type: ContentType) -> Self {
        self.matched_type = content_type;
        self
    }

    pub fn unmatched_type(mut self, content_type: ContentType) -> Self {
        self.unmatched_type = Some(content_type);
        self
    }

    pub fn include_bos(mut self, v: bool) -> Self {
        self.include_bos = v;
        self
    }

    pub fn include_eos(mut self, v: bool) -> Self {
        self.include_eos = v;
        self
    }

    pub fn output_mode(mut self, mode: PatternOutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn buffer_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_buffer_size = min;
        self.max_buffer_size = max;
        self
    }

    fn emit_threshold(&self) -> usize {
        if self.max_buffer_size <= self.min_buffer_size {
            self.min_buffer_size.max(1)
        } else {
            self.min_buffer_size + rand::random::<usize>() % (self.max_buffer_size - self.min_buffer_size + 1)
        }
    }
}

impl Postprocessor for PatternMatcherPP {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        let this = *self;
        wrap(async_stream_scan(this, input))
    }
}

/// Scans the combined character stream for `bos`/`eos` markers, buffering
/// enough trailing context to detect a marker split across chunk
/// boundaries, and emits runs of matched/unmatched content per `output_mode`.
/// Mutable state machine driving [`async_stream_scan`], factored out of the
/// stream combinator so its transitions can be unit-stepped per input event.
struct PatternScan {
    pp: PatternMatcherPP,
    state: MatchState,
    pending: String,
    emit_buf: String,
    threshold: usize,
}

impl PatternScan {
    fn new(pp: PatternMatcherPP) -> Self {
        let threshold = pp.emit_threshold();
        Self {
            pp,
            state: MatchState::NotMatching,
            pending: String::new(),
            emit_buf: String::new(),
            threshold,
        }
    }

    fn flush(&mut self, content_type: ContentType, out: &mut Vec<Result<ChunkEvent>>) {
        if !self.emit_buf.is_empty() {
            out.push(Ok(ChunkEvent::new(std::mem::take(&mut self.emit_buf), content_type)));
            self.threshold = self.pp.emit_threshold();
        }
    }

    fn push_event(&mut self, event: ChunkEvent, out: &mut Vec<Result<ChunkEvent>>) {
        self.pending.push_str(&event.content);

        loop {
            match self.state {
                MatchState::NotMatching => {
                    if let Some(pos) = self.pending.find(self.pp.bos.as_str()) {
                        let before = self.pending[..pos].to_string();
                        if !before.is_empty() && self.pp.output_mode != PatternOutputMode::OnlyMatched {
                            self.emit_buf.push_str(&before);
                            if self.emit_buf.chars().count() >= self.threshold {
                                let ct = self.pp.unmatched_type.clone().unwrap_or(event.content_type.clone());
                                self.flush(ct, out);
                            }
                        }
                        self.pending = self.pending[pos + self.pp.bos.len()..].to_string();
                        let ct = self.pp.unmatched_type.clone().unwrap_or(event.content_type.clone());
                        self.flush(ct, out);
                        if self.pp.include_bos && self.pp.output_mode != PatternOutputMode::ExcludeMatched {
                            self.emit_buf.push_str(&self.pp.bos);
                        }
                        self.state = MatchState::Inside;
                        continue;
                    } else if ends_with_partial(&self.pending, &self.pp.bos) {
                        self.state = MatchState::PartialStart;
                        break;
                    } else {
                        if !self.pending.is_empty() && self.pp.output_mode != PatternOutputMode::OnlyMatched {
                            self.emit_buf.push_str(&self.pending);
                            if self.emit_buf.chars().count() >= self.threshold {
                                let ct = self.pp.unmatched_type.clone().unwrap_or(event.content_type.clone());
                                self.flush(ct, out);
                            }
                        }
                        self.pending.clear();
                        break;
                    }
                }
                MatchState::PartialStart => {
                    if self.pending.contains(self.pp.bos.as_str()) || !ends_with_partial(&self.pending, &self.pp.bos) {
                        self.state = MatchState::NotMatching;
                        continue;
                    }
                    break;
                }
                MatchState::Inside => {
                    if let Some(pos) = self.pending.find(self.pp.eos.as_str()) {
                        let inside = self.pending[..pos].to_string();
                        if self.pp.output_mode != PatternOutputMode::ExcludeMatched {
                            self.emit_buf.push_str(&inside);
                        }
                        self.pending = self.pending[pos + self.pp.eos.len()..].to_string();
                        if self.pp.include_eos && self.pp.output_mode != PatternOutputMode::ExcludeMatched {
                            self.emit_buf.push_str(&self.pp.eos);
                        }
                        let ct = self.pp.matched_type.clone();
                        self.flush(ct, out);
                        self.state = MatchState::NotMatching;
                        continue;
                    } else if ends_with_partial(&self.pending, &self.pp.eos) {
                        self.state = MatchState::PartialEnd;
                        break;
                    } else {
                        if self.pp.output_mode != PatternOutputMode::ExcludeMatched {
                            self.emit_buf.push_str(&self.pending);
                            if self.emit_buf.chars().count() >= self.threshold {
                                let ct = self.pp.matched_type.clone();
                                self.flush(ct, out);
                            }
                        }
                        self.pending.clear();
                        break;
                    }
                }
                MatchState::PartialEnd => {
                    if self.pending.contains(self.pp.eos.as_str()) || !ends_with_partial(&self.pending, &self.pp.eos) {
                        self.state = MatchState::Inside;
                        continue;
                    }
                    break;
                }
            }
        }
    }

    fn finalize(&mut self, out: &mut Vec<Result<ChunkEvent>>) {
        if !self.pending.is_empty() {
            let content_type = if self.state == MatchState::Inside || self.state == MatchState::PartialEnd {
                self.pp.matched_type.clone()
            } else {
                self.pp.unmatched_type.clone().unwrap_or(ContentType::Char)
            };
            let pending = std::mem::take(&mut self.pending);
            self.emit_buf.push_str(&pending);
            self.flush(content_type, out);
        }
        let ct = self.pp.unmatched_type.clone().unwrap_or(ContentType::Char);
        self.flush(ct, out);
    }
}

/// Drives [`PatternScan`] off `input` via [`futures::stream::unfold`]: each
/// poll either drains a queued output or pulls and processes one more input
/// event (or, once `input` is exhausted, runs the final flush exactly once).
fn async_stream_scan(pp: PatternMatcherPP, input: ChunkStream) -> impl Stream<Item = Result<ChunkEvent>> {
    struct State {
        scan: PatternScan,
        input: ChunkStream,
        queued: std::collections::VecDeque<Result<ChunkEvent>>,
        input_done: bool,
    }

    let state = State {
        scan: PatternScan::new(pp),
        input,
        queued: std::collections::VecDeque::new(),
        input_done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queued.pop_front() {
                return Some((item, state));
            }
            if state.input_done {
                return None;
            }
            match state.input.next().await {
                Some(Ok(event)) => {
                    let mut out = Vec::new();
                    state.scan.push_event(event, &mut out);
                    state.queued.extend(out);
                }
                Some(Err(err)) => state.queued.push_back(Err(err)),
                None => {
                    let mut out = Vec::new();
                    state.scan.finalize(&mut out);
                    state.queued.extend(out);
                    state.input_done = true;
                }
            }
        }
    })
}

fn ends_with_partial(haystack: &str, needle: &str) -> bool {
    let max = needle.len().min(haystack.len());
    (1..=max).rev().any(|n| haystack.ends_with(&needle[..n]))
}

// ============================================================================
// JsonKeyExtractorPP
// ============================================================================

/// Which channels receive the extracted target value versus the original
/// JSON, per chunk, while extraction is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonExtractOutputMode {
    /// Stream and aggregate the target value only; the raw JSON passthrough
    /// is dropped from both channels.
    TargetOnly,
    /// Stream and aggregate the original JSON untouched.
    Raw,
    /// Stream and aggregate the target value.
    Both,
}

/// Streams the value of `target_key` out of a streaming JSON object,
/// supporting nested dot-paths and `[index]` array access. Tracks
/// string/escape state and nesting level to find the exact extent of the
/// value, optionally stopping at the first top-level `,`/`}` that follows it.
pub struct JsonKeyExtractorPP {
    target_key: String,
    stop_on_comma_or_brace: bool,
    output_mode: JsonExtractOutputMode,
    key_pattern: Regex,
}

impl JsonKeyExtractorPP {
    pub fn new(target_key: impl Into<String>) -> Self {
        let target_key = target_key.into();
        let last_segment = target_key
            .rsplit(|c| c == '.' || c == '[')
            .next()
            .unwrap_or(&target_key)
            .trim_end_matches(']');
        let pattern = format!(
            r#"[{{,]\s*["']{}["']\s*:\s*"#,
            regex::escape(last_segment)
        );
        Self {
            target_key,
            stop_on_comma_or_brace: true,
            output_mode: JsonExtractOutputMode::TargetOnly,
            key_pattern: Regex::new(&pattern).expect("static pattern always compiles"),
        }
    }

    pub fn stop_on_comma_or_brace(mut self, v: bool) -> Self {
        self.stop_on_comma_or_brace = v;
        self
    }

    pub fn output_mode(mut self, mode: JsonExtractOutputMode) -> Self {
        self.output_mode = mode;
        self
    }
}

impl Postprocessor for JsonKeyExtractorPP {
    fn apply(self: Box<Self>, input: ChunkStream) -> ChunkStream {
        let this = *self;
        wrap(json_extract_scan(this, input))
    }
}

/// Mutable state machine driving [`json_extract_scan`], factored out so each
/// input event can be processed independently of how the surrounding stream
/// is driven.
struct JsonExtractScan {
    pp: JsonKeyExtractorPP,
    buffer: String,
    in_target_value: bool,
    finished: bool,
    quote_open: bool,
    escape_next: bool,
    nest_level: i32,
    value_is_string: bool,
    value_quote: char,
    value_first_char: bool,
    routing_for_stream_only: ContentType,
    routing_for_response_only: ContentType,
    routing_for_both: ContentType,
}

impl JsonExtractScan {
    fn new(pp: JsonKeyExtractorPP) -> Self {
        Self {
            pp,
            buffer: String::new(),
            in_target_value: false,
            finished: false,
            quote_open: false,
            escape_next: false,
            nest_level: 0,
            value_is_string: false,
            value_quote: '"',
            value_first_char: true,
            routing_for_stream_only: ContentType::routing(RoutingSentinel::StreamIgnore),
            routing_for_response_only: ContentType::routing(RoutingSentinel::ResponseIgnore),
            routing_for_both: ContentType::routing(RoutingSentinel::BothIgnore),
        }
    }

    fn push_event(&mut self, event: ChunkEvent, out: &mut Vec<Result<ChunkEvent>>) {
        if self.finished {
            out.push(Ok(ChunkEvent::new(event.content, self.routing_for_both.clone())));
            return;
        }

        match self.pp.output_mode {
            JsonExtractOutputMode::TargetOnly => {
                out.push(Ok(ChunkEvent::new(event.content.clone(), self.routing_for_both.clone())));
            }
            JsonExtractOutputMode::Raw => {
                out.push(Ok(ChunkEvent::new(event.content.clone(), event.content_type.clone())));
            }
            JsonExtractOutputMode::Both => {
                out.push(Ok(ChunkEvent::new(event.content.clone(), self.routing_for_response_only.clone())));
            }
        }

        self.buffer.push_str(&event.content);

        if !self.in_target_value {
            if let Some(m) = self.pp.key_pattern.find(&self.buffer) {
                self.in_target_value = true;
                self.buffer = self.buffer[m.end()..].to_string();
                self.value_first_char = true;
            } else {
                return;
            }
        }

        let mut consumed = 0usize;
        let mut region_finished = false;
        for (idx, ch) in self.buffer.char_indices() {
            if self.escape_next {
                self.escape_next = false;
                continue;
            }
            if ch == '\\' {
                self.escape_next = true;
                continue;
            }
            if self.value_first_char {
                self.value_first_char = false;
                if ch == '"' || ch == '\'' {
                    self.value_quote = ch;
                    self.value_is_string = true;
                    self.quote_open = true;
                    continue;
                }
            }
            if self.value_is_string && ch == self.value_quote {
                self.quote_open = false;
                continue;
            }
            if !self.quote_open {
                if ch == '{' || ch == '[' {
                    self.nest_level += 1;
                } else if ch == '}' || ch == ']' {
                    self.nest_level = (self.nest_level - 1).max(0);
                }
            }
            if self.pp.stop_on_comma_or_brace {
                let at_terminator = ch == ',' || ch == '}';
                let terminated = if self.value_is_string {
                    !self.quote_open && self.nest_level == 0 && at_terminator
                } else {
                    self.nest_level == 0 && at_terminator
                };
                if terminated {
                    consumed = idx;
                    region_finished = true;
                    break;
                }
            }
        }

        if region_finished {
            let value_content = self.buffer[..consumed].to_string();
            if !value_content.is_empty() {
                let tag = match self.pp.output_mode {
                    JsonExtractOutputMode::TargetOnly => ContentType::Char,
                    JsonExtractOutputMode::Raw => ContentType::custom("text"),
                    JsonExtractOutputMode::Both => self.routing_for_stream_only.clone(),
                };
                out.push(Ok(ChunkEvent::new(value_content, tag)));
            }
            self.finished = true;
            self.buffer.clear();
        } else if !self.buffer.is_empty() {
            let value_content = self.buffer.clone();
            let tag = match self.pp.output_mode {
                JsonExtractOutputMode::TargetOnly => ContentType::Char,
                JsonExtractOutputMode::Raw => ContentType::custom("text"),
                JsonExtractOutputMode::Both => self.routing_for_stream_only.clone(),
            };
            out.push(Ok(ChunkEvent::new(value_content, tag)));
            self.buffer.clear();
        }
    }
}

/// Drives [`JsonExtractScan`] off `input` via [`futures::stream::unfold`]:
/// each poll either drains a queued output or pulls and processes one more
/// input event.
fn json_extract_scan(pp: JsonKeyExtractorPP, input: ChunkStream) -> impl Stream<Item = Result<ChunkEvent>> {
    struct State {
        scan: JsonExtractScan,
        input: ChunkStream,
        queued: std::collections::VecDeque<Result<ChunkEvent>>,
        input_done: bool,
    }

    let state = State {
        scan: JsonExtractScan::new(pp),
        input,
        queued: std::collections::VecDeque::new(),
        input_done: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queued.pop_front() {
                return Some((item, state));
            }
            if state.input_done {
                return None;
            }
            match state.input.next().await {
                Some(Ok(event)) => {
                    let mut out = Vec::new();
                    state.scan.push_event(event, &mut out);
                    state.queued.extend(out);
                }
                Some(Err(err)) => state.queued.push_back(Err(err)),
                None => state.input_done = true,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChunkStream;
    use futures::StreamExt;

    async fn collect_types(stream: ChunkStream) -> Vec<(String, String)> {
        let events: Vec<_> = stream.collect::<Vec<_>>().await;
        events
            .into_iter()
            .map(|e| {
                let e = e.unwrap();
                (e.content, e.content_type.as_str().to_string())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_filter_drops_chars_and_empty_chunks() {
        let stream = ChunkStream::from_text("a-b-c");
        let out = Box::new(FilterPP::new("-")).apply(stream);
        let events = collect_types(out).await;
        let joined: String = events.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(joined, "abc");
    }

    #[tokio::test]
    async fn test_replace_applies_global_rules() {
        let stream = ChunkStream::from_text("hi");
        let out = Box::new(ReplacePP::new().replace("h", "H")).apply(stream);
        let events = collect_types(out).await;
        let joined: String = events.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(joined, "Hi");
    }

    #[tokio::test]
    async fn test_type_mapper_rewrites_type() {
        let mut map = HashMap::new();
        map.insert("char".to_string(), ContentType::Think);
        let stream = ChunkStream::from_text("x");
        let out = Box::new(TypeMapperPP::new(map)).apply(stream);
        let events = collect_types(out).await;
        assert_eq!(events[0].1, "think");
    }

    #[tokio::test]
    async fn test_type_mapper_is_its_own_inverse_when_bijective() {
        let mut forward = HashMap::new();
        forward.insert("char".to_string(), ContentType::Think);
        let mut backward = HashMap::new();
        backward.insert("think".to_string(), ContentType::Char);

        let stream = ChunkStream::from_text("z");
        let out = Box::new(TypeMapperPP::new(forward)).apply(stream);
        let out = Box::new(TypeMapperPP::new(backward)).apply(out);
        let events = collect_types(out).await;
        assert_eq!(events[0].1, "char");
    }

    #[tokio::test]
    async fn test_dynamic_type_first_match_wins() {
        let pp = DynamicTypePP::new()
            .on_char('!', ContentType::Status)
            .on_char('?', ContentType::Tool);
        let stream = wrap(futures::stream::iter(vec![Ok(ChunkEvent::char("a!b?c"))]));
        let out = Box::new(pp).apply(stream);
        let events = collect_types(out).await;
        assert_eq!(events[0].1, "status");
    }

    #[tokio::test]
    async fn test_splitter_emits_one_event_per_char() {
        let stream = ChunkStream::from_text("ab");
        let out = Box::new(SplitterPP).apply(stream);
        let events = collect_types(out).await;
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_pattern_matcher_extracts_bounded_region() {
        let pp = PatternMatcherPP::new("<<", ">>").output_mode(PatternOutputMode::OnlyMatched);
        let stream = wrap(futures::stream::iter(vec![
            Ok(ChunkEvent::char("before")),
            Ok(ChunkEvent::char("<<inside>>")),
            Ok(ChunkEvent::char("after")),
        ]));
        let out = Box::new(pp).apply(stream);
        let events = collect_types(out).await;
        let joined: String = events.iter().map(|(c, _)| c.as_str()).collect();
        assert!(joined.contains("inside"));
        assert!(!joined.contains("before"));
        assert!(!joined.contains("after"));
    }

    #[tokio::test]
    async fn test_pattern_matcher_handles_marker_split_across_chunks() {
        let pp = PatternMatcherPP::new("<<", ">>").output_mode(PatternOutputMode::OnlyMatched);
        let stream = wrap(futures::stream::iter(vec![
            Ok(ChunkEvent::char("<")),
            Ok(ChunkEvent::char("<value>")),
            Ok(ChunkEvent::char(">")),
        ]));
        let out = Box::new(pp).apply(stream);
        let events = collect_types(out).await;
        let joined: String = events.iter().map(|(c, _)| c.as_str()).collect();
        assert!(joined.contains("value"));
    }

    #[tokio::test]
    async fn test_json_key_extractor_streams_target_only() {
        let pp = JsonKeyExtractorPP::new("intent").output_mode(JsonExtractOutputMode::TargetOnly);
        let stream = wrap(futures::stream::iter(vec![Ok(ChunkEvent::char(
            r#"{"intent": "Data Query", "reason": "x"}"#,
        ))]));
        let out = Box::new(pp).apply(stream);
        let events: Vec<_> = out.collect::<Vec<_>>().await;
        let events: Vec<_> = events.into_iter().map(|e| e.unwrap()).collect();

        // Raw passthrough is dropped from both channels; only the extracted
        // value survives as a normal, non-sentinel content type.
        assert!(events.iter().all(|e| !e.content_type.is_routing_sentinel()));
        let target_text: String = events.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(target_text, "Data Query");
    }
}
