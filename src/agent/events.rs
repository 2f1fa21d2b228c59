//! Backend protocol events
//!
//! The CLI backend prints one JSON object per line (`stream-json`). Only the
//! fields the turn loop reads are modelled; everything else is ignored.

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result};

/// How a backend turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSubtype {
    /// Completed normally
    Success,
    /// Ran out of agentic turns
    ErrorMaxTurns,
    /// Generic failure
    Error,
    /// Failure while running tools
    ErrorDuringExecution,
    /// Anything this version does not know about
    Other(String),
}

impl From<&str> for ResultSubtype {
    fn from(value: &str) -> Self {
        match value {
            "success" => Self::Success,
            "error_max_turns" => Self::ErrorMaxTurns,
            "error" => Self::Error,
            "error_during_execution" => Self::ErrorDuringExecution,
            other => Self::Other(other.to_string()),
        }
    }
}

impl ResultSubtype {
    /// Whether the turn ended in failure
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(
            self,
            Self::ErrorMaxTurns | Self::Error | Self::ErrorDuringExecution
        )
    }
}

/// One event from a backend turn
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolEvent {
    /// Session started
    Init {
        session_id: Option<String>,
        tools: Vec<String>,
    },
    /// A complete assistant text block
    AssistantText { text: String },
    /// The assistant invoked a tool
    AssistantToolUse { name: String, input: Value },
    /// A tool finished
    UserToolResult { content: String, is_error: bool },
    /// Partial assistant text
    StreamDelta { text: String },
    /// Terminal event carrying the continuity handle
    Result {
        subtype: ResultSubtype,
        session_id: Option<String>,
        result: Option<String>,
        error: Option<String>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawLine {
    System {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        tools: Vec<Value>,
    },
    Assistant {
        #[serde(default)]
        message: RawMessage,
    },
    User {
        #[serde(default)]
        message: RawMessage,
    },
    StreamEvent {
        #[serde(default)]
        event: RawStreamEvent,
    },
    Result {
        #[serde(default)]
        subtype: String,
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        error: Option<Value>,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Default)]
struct RawMessage {
    #[serde(default)]
    content: Value,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Default)]
struct RawStreamEvent {
    #[serde(default)]
    delta: Option<RawDelta>,
}

#[derive(Deserialize)]
struct RawDelta {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    text: String,
}

impl ProtocolEvent {
    /// Decode one `stream-json` line
    ///
    /// An assistant or user message with several content blocks yields one
    /// event per block. Blank lines and unknown event types yield nothing.
    ///
    /// # Errors
    ///
    /// Returns error if the line is not a JSON event object
    pub fn decode_line(line: &str) -> Result<Vec<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Vec::new());
        }

        let raw: RawLine = serde_json::from_str(line)
            .map_err(|e| Error::Protocol(format!("undecodable line ({e}): {}", preview(line))))?;

        let events = match raw {
            RawLine::System {
                subtype,
                session_id,
                tools,
            } if subtype == "init" => vec![Self::Init {
                session_id,
                tools: tools
                    .into_iter()
                    .filter_map(|t| match t {
                        Value::String(s) => Some(s),
                        Value::Object(o) => o.get("name").and_then(Value::as_str).map(String::from),
                        _ => None,
                    })
                    .collect(),
            }],
            RawLine::Assistant { message } => blocks(message.content)
                .filter_map(|block| match block {
                    RawBlock::Text { text } => Some(Self::AssistantText { text }),
                    RawBlock::ToolUse { name, input } => Some(Self::AssistantToolUse { name, input }),
                    _ => None,
                })
                .collect(),
            RawLine::User { message } => blocks(message.content)
                .filter_map(|block| match block {
                    RawBlock::ToolResult { content, is_error } => Some(Self::UserToolResult {
                        content: flatten_content(&content),
                        is_error,
                    }),
                    _ => None,
                })
                .collect(),
            RawLine::StreamEvent { event } => event
                .delta
                .filter(|d| d.kind == "text_delta" && !d.text.is_empty())
                .map(|d| Self::StreamDelta { text: d.text })
                .into_iter()
                .collect(),
            RawLine::Result {
                subtype,
                session_id,
                result,
                error,
            } => vec![Self::Result {
                subtype: ResultSubtype::from(subtype.as_str()),
                session_id: session_id.filter(|s| !s.is_empty()),
                result,
                error: error.map(|e| match e {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            }],
            RawLine::System { .. } | RawLine::Other => Vec::new(),
        };

        Ok(events)
    }
}

/// Content blocks of a message, skipping any that do not decode
fn blocks(content: Value) -> impl Iterator<Item = RawBlock> {
    let items = match content {
        Value::Array(items) => items,
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
}

/// Tool result content is either a string or a list of text blocks
fn flatten_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn preview(line: &str) -> String {
    line.chars().take(80).collect()
}
