//! Live interpretation of a backend turn
//!
//! Events are fed in arrival order. Status spans are surfaced the moment
//! their close tag arrives so they can be spoken while the turn is still
//! running; the final spoken text is only known once the stream ends.

use std::collections::HashSet;

use serde_json::Value;

use super::events::{ProtocolEvent, ResultSubtype};
use super::tags::{self, TagScanner};

/// Spoken when the backend runs out of agentic turns
pub const MAX_TURNS_TEXT: &str = "I hit the turn limit on that task.";

const SUMMARY_CHARS: usize = 120;
const PREVIEW_CHARS: usize = 200;

/// Something the turn loop should act on now
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A newly closed status span, to be spoken immediately
    Status(String),
    /// The backend invoked a tool
    ToolCall { name: String, summary: String },
    /// A tool finished
    ToolResult { preview: String, is_error: bool },
    /// A complete sentence of streamed text
    Sentence(String),
}

/// Everything known once the stream has ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Continuity handle from the terminal event
    pub handle: Option<String>,
    /// Text to speak
    pub spoken: String,
    /// How the turn ended, if a terminal event arrived
    pub subtype: Option<ResultSubtype>,
    /// Streamed text left over after the last complete sentence
    pub trailing_sentence: Option<String>,
    /// Number of sentences already surfaced
    pub sentences: usize,
}

impl TurnOutcome {
    /// Whether any of the answer was already surfaced sentence by sentence
    #[must_use]
    pub const fn streamed(&self) -> bool {
        self.sentences > 0 || self.trailing_sentence.is_some()
    }
}

/// Stateful interpreter for one turn
#[derive(Debug)]
pub struct StreamInterpreter {
    buffer: String,
    status: TagScanner,
    announced: HashSet<String>,
    sentences: Option<SentenceSplitter>,
    sentence_count: usize,
    final_text: Option<String>,
    handle: Option<String>,
    subtype: Option<ResultSubtype>,
}

impl StreamInterpreter {
    /// Interpreter that surfaces status spans and tool activity
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            status: TagScanner::new("STATUS"),
            announced: HashSet::new(),
            sentences: None,
            sentence_count: 0,
            final_text: None,
            handle: None,
            subtype: None,
        }
    }

    /// Also surface complete sentences as text streams in
    #[must_use]
    pub fn with_sentences(mut self) -> Self {
        self.sentences = Some(SentenceSplitter::default());
        self
    }

    /// Accumulated assistant text so far
    #[must_use]
    pub fn text(&self) -> &str {
        &self.buffer
    }

    /// Process one event
    pub fn feed(&mut self, event: ProtocolEvent) -> Vec<Signal> {
        match event {
            ProtocolEvent::Init { session_id, tools } => {
                tracing::debug!(
                    session = session_id.as_deref().unwrap_or_default(),
                    tools = tools.len(),
                    "backend session initialized"
                );
                Vec::new()
            }
            ProtocolEvent::AssistantText { text } => self.append(&text, false),
            ProtocolEvent::StreamDelta { text } => self.append(&text, true),
            ProtocolEvent::AssistantToolUse { name, input } => {
                let summary = summarize_tool_input(&name, &input);
                tracing::debug!(tool = %name, input = %summary, "tool call");
                vec![Signal::ToolCall { name, summary }]
            }
            ProtocolEvent::UserToolResult { content, is_error } => {
                let preview = preview_result(&content);
                tracing::debug!(ok = !is_error, result = %preview, "tool result");
                vec![Signal::ToolResult { preview, is_error }]
            }
            ProtocolEvent::Result {
                subtype,
                session_id,
                result,
                error,
            } => {
                self.finish_turn(subtype, session_id, result, error);
                Vec::new()
            }
        }
    }

    /// Only deltas feed the sentence splitter, since a full assistant
    /// message repeats text already streamed
    fn append(&mut self, text: &str, delta: bool) -> Vec<Signal> {
        self.buffer.push_str(text);

        let mut signals = Vec::new();
        for span in self.status.scan(&self.buffer) {
            let status = span.trim();
            if !status.is_empty() && self.announced.insert(status.to_string()) {
                tracing::debug!(status, "status");
                signals.push(Signal::Status(status.to_string()));
            }
        }

        if let Some(splitter) = self.sentences.as_mut().filter(|_| delta) {
            for sentence in splitter.push(text) {
                self.sentence_count += 1;
                signals.push(Signal::Sentence(sentence));
            }
        }

        signals
    }

    fn finish_turn(
        &mut self,
        subtype: ResultSubtype,
        session_id: Option<String>,
        result: Option<String>,
        error: Option<String>,
    ) {
        let text = match &subtype {
            ResultSubtype::Success | ResultSubtype::Other(_) => result,
            ResultSubtype::ErrorMaxTurns => {
                tracing::warn!("backend hit its turn limit");
                Some(MAX_TURNS_TEXT.to_string())
            }
            ResultSubtype::Error | ResultSubtype::ErrorDuringExecution => {
                let err = error
                    .or(result)
                    .unwrap_or_else(|| "Unknown error".to_string());
                tracing::error!(error = %err, "backend reported failure");
                Some(format!("Something went wrong: {err}"))
            }
        };

        if let ResultSubtype::Other(kind) = &subtype {
            tracing::warn!(subtype = %kind, "unrecognized result subtype");
        }

        tracing::debug!(handle = session_id.as_deref().unwrap_or_default(), ?subtype, "turn finished");
        self.final_text = text;
        self.handle = session_id;
        self.subtype = Some(subtype);
    }

    /// End the turn and derive the spoken text
    #[must_use]
    pub fn finish(mut self) -> TurnOutcome {
        let source = self
            .final_text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(&self.buffer);
        let spoken = tags::extract_speak(Some(source));

        let trailing_sentence = self.sentences.as_mut().and_then(SentenceSplitter::flush);

        TurnOutcome {
            handle: self.handle,
            spoken,
            subtype: self.subtype,
            trailing_sentence,
            sentences: self.sentence_count,
        }
    }
}

impl Default for StreamInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits streamed text after `.`, `!` or `?` followed by whitespace
#[derive(Debug, Default)]
pub struct SentenceSplitter {
    pending: String,
}

impl SentenceSplitter {
    /// Append text, returning any sentences it completed
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.pending.push_str(text);

        let mut sentences = Vec::new();
        loop {
            let boundary = self
                .pending
                .char_indices()
                .zip(self.pending.chars().skip(1))
                .find(|((_, c), next)| matches!(c, '.' | '!' | '?') && next.is_whitespace())
                .map(|((i, c), _)| i + c.len_utf8());

            let Some(end) = boundary else {
                break;
            };
            let rest = self.pending[end..].trim_start().to_string();
            let sentence = clean(&self.pending[..end]);
            self.pending = rest;
            if let Some(sentence) = sentence {
                sentences.push(sentence);
            }
        }
        sentences
    }

    /// Whatever is left once the stream ends
    pub fn flush(&mut self) -> Option<String> {
        clean(&std::mem::take(&mut self.pending))
    }
}

fn clean(sentence: &str) -> Option<String> {
    let stripped = tags::strip_tags(sentence);
    let trimmed = stripped.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Short display label for a tool invocation
fn summarize_tool_input(name: &str, input: &Value) -> String {
    let field = |key: &str| input.get(key).and_then(Value::as_str);

    match name {
        "Bash" => truncate(field("command").unwrap_or_default(), SUMMARY_CHARS),
        "Read" | "Write" | "Edit" => field("file_path")
            .or_else(|| field("path"))
            .unwrap_or("?")
            .to_string(),
        "Grep" => format!("\"{}\"", field("pattern").unwrap_or("?")),
        _ => truncate(&input.to_string(), SUMMARY_CHARS),
    }
}

/// First part of a tool result on one line
fn preview_result(content: &str) -> String {
    truncate(content, PREVIEW_CHARS).replace('\n', " ")
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}
