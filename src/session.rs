//! Conversation continuity
//!
//! A session is open while a continuity handle is held and the last turn was
//! less than `timeout` ago. Expiry is evaluated on read; nothing runs in the
//! background.
//!
//! Alongside the handle the session keeps a short transcript of recent turns.
//! It is prefixed to follow-up prompts so context survives when the backend
//! silently starts a fresh conversation instead of resuming.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;

/// Default inactivity window
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of turns kept for history injection
pub const DEFAULT_HISTORY_TURNS: usize = 4;

/// Maximum characters stored per side of a turn
pub const MAX_RECORD_CHARS: usize = 500;

/// One exchange kept for history injection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnRecord {
    /// What the user said
    pub user: String,
    /// What was spoken back
    pub assistant: String,
}

impl TurnRecord {
    /// Create a record, truncating both sides
    #[must_use]
    pub fn new(user: &str, assistant: &str) -> Self {
        Self {
            user: cap(user),
            assistant: cap(assistant),
        }
    }
}

fn cap(text: &str) -> String {
    text.trim().chars().take(MAX_RECORD_CHARS).collect()
}

/// Continuity state for the turn loop
pub struct Session {
    timeout: Duration,
    history_limit: usize,
    clock: Arc<dyn Clock>,
    handle: Option<String>,
    last_activity: Option<Instant>,
    history: VecDeque<TurnRecord>,
    mismatches: u32,
}

impl Session {
    /// Create an inactive session
    #[must_use]
    pub fn new(timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            timeout,
            history_limit: DEFAULT_HISTORY_TURNS,
            clock,
            handle: None,
            last_activity: None,
            history: VecDeque::with_capacity(DEFAULT_HISTORY_TURNS),
            mismatches: 0,
        }
    }

    /// Set how many turns are kept for history injection
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self.trim_history();
        self
    }

    /// The inactivity window
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a handle is held and the window has not lapsed
    #[must_use]
    pub fn is_active(&self) -> bool {
        match (&self.handle, self.last_activity) {
            (Some(_), Some(last)) => self.clock.now().saturating_duration_since(last) < self.timeout,
            _ => false,
        }
    }

    /// Whether a handle is still held after the window lapsed
    ///
    /// Expiry is lazy, so a lapsed session keeps its history until cleared.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.handle.is_some() && !self.is_active()
    }

    /// The handle to present to the backend, `None` once expired
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        if self.is_active() {
            self.handle.as_deref()
        } else {
            None
        }
    }

    /// Time until the window closes, zero when inactive
    #[must_use]
    pub fn time_remaining(&self) -> Duration {
        if !self.is_active() {
            return Duration::ZERO;
        }
        self.last_activity.map_or(Duration::ZERO, |last| {
            self.timeout
                .saturating_sub(self.clock.now().saturating_duration_since(last))
        })
    }

    /// Record the handle returned by a completed turn
    ///
    /// While active, a different handle means the backend forked a new
    /// conversation; only the original has history attached, so it is kept.
    /// After expiry any handle starts a new session with empty history.
    pub fn update(&mut self, handle: &str) {
        if self.is_expired() {
            self.clear();
        }
        match self.handle.as_deref() {
            Some(current) if self.is_active() && current != handle => {
                self.mismatches += 1;
                tracing::warn!(
                    kept = %current,
                    returned = %handle,
                    mismatches = self.mismatches,
                    "backend returned a different session handle, keeping original"
                );
            }
            Some(current) if current == handle => {}
            _ => {
                tracing::info!(handle = %handle, "session active");
                self.handle = Some(handle.to_string());
            }
        }
        self.last_activity = Some(self.clock.now());
    }

    /// Refresh the activity timer without changing the handle
    pub fn touch(&mut self) {
        if self.is_active() {
            self.last_activity = Some(self.clock.now());
        }
    }

    /// End the session, dropping the handle and history
    pub fn clear(&mut self) {
        if self.handle.is_some() {
            tracing::info!("session cleared");
        }
        self.handle = None;
        self.last_activity = None;
        self.history.clear();
        self.mismatches = 0;
    }

    /// Append a turn, evicting the oldest beyond the limit
    pub fn add_history(&mut self, user: &str, assistant: &str) {
        self.history.push_back(TurnRecord::new(user, assistant));
        self.trim_history();
    }

    /// Recorded turns, oldest first
    pub fn history(&self) -> impl Iterator<Item = &TurnRecord> {
        self.history.iter()
    }

    /// How many times the backend returned a mismatched handle
    #[must_use]
    pub const fn mismatches(&self) -> u32 {
        self.mismatches
    }

    /// Render the history as a block to prefix the next prompt
    ///
    /// Empty when no turns are recorded.
    #[must_use]
    pub fn history_prompt(&self) -> String {
        if self.history.is_empty() {
            return String::new();
        }

        let mut block = String::from("[Conversation history from this session]\n");
        for record in &self.history {
            block.push_str("User: ");
            block.push_str(&record.user);
            block.push_str("\nAssistant: ");
            block.push_str(&record.assistant);
            block.push('\n');
        }
        block.push_str("[End of history]");
        block
    }

    fn trim_history(&mut self) {
        while self.history.len() > self.history_limit {
            self.history.pop_front();
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.session_id() {
            Some(id) => {
                let short: String = id.chars().take(8).collect();
                write!(
                    f,
                    "Session(id={short}..., remaining={:.1}s)",
                    self.time_remaining().as_secs_f64()
                )
            }
            None => write!(f, "Session(inactive)"),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("handle", &self.handle)
            .field("active", &self.is_active())
            .field("history", &self.history.len())
            .field("mismatches", &self.mismatches)
            .finish_non_exhaustive()
    }
}
