//! hey-claude - a hands-free voice loop for Claude
//!
//! This library provides the pieces of the loop:
//! - Audio capture and VAD segmentation
//! - Wake phrases and session continuity
//! - Transcription and speech output
//! - Claude backends and stream interpretation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   Microphone                         │
//! │   FrameSource  →  Segmenter (energy gate + VAD)      │
//! └────────────────────┬────────────────────────────────┘
//!                      │ utterance
//! ┌────────────────────▼────────────────────────────────┐
//! │                 TurnController                       │
//! │   Transcriber  │  Wake phrases  │  Session  │  Speaker│
//! └────────────────────┬────────────────────────────────┘
//!                      │ prompt + continuity handle
//! ┌────────────────────▼────────────────────────────────┐
//! │                   Backends                           │
//! │   Claude Code CLI (tools)  │  Messages API (quick)   │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod agent;
pub mod clock;
pub mod config;
pub mod controller;
pub mod daemon;
pub mod error;
pub mod prompt;
pub mod session;
pub mod voice;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use controller::{Backends, ControllerConfig, Step, TurnController, TurnSummary};
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use session::Session;
