//! Conversational backend abstraction

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use super::events::ProtocolEvent;
use crate::Result;

/// Events of one backend turn, in arrival order
///
/// A well-behaved backend ends with a [`ProtocolEvent::Result`].
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ProtocolEvent>> + Send>>;

/// Everything a backend needs for one turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnRequest {
    /// User prompt, history and context included
    pub prompt: String,
    /// Instructions appended to the backend's own system prompt
    pub system_prompt: String,
    /// Conversation to resume
    pub continuity_handle: Option<String>,
    /// Model override
    pub model: Option<String>,
}

/// A conversational backend
#[async_trait]
pub trait Backend: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Start a turn and stream its events
    ///
    /// # Errors
    ///
    /// Returns error if the turn could not be started
    async fn run(&self, request: TurnRequest) -> Result<EventStream>;
}
