//! Conversational backends and turn interpretation

mod backend;
mod cli;
mod direct;
mod events;
mod interpreter;
pub mod tags;

pub use backend::{Backend, EventStream, TurnRequest};
pub use cli::{ClaudeCli, DEFAULT_BINARY};
pub use direct::{DEFAULT_QUICK_MODEL, DirectApi};
pub use events::{ProtocolEvent, ResultSubtype};
pub use interpreter::{MAX_TURNS_TEXT, SentenceSplitter, Signal, StreamInterpreter, TurnOutcome};
pub use tags::{FALLBACK_TEXT, extract_speak};
