//! Error types for hey-claude

use thiserror::Error;

/// Result type alias for hey-claude operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice loop
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Voice activity detection error
    #[error("vad error: {0}")]
    Vad(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Conversational backend could not be started or failed mid-stream
    #[error("backend error: {0}")]
    Backend(String),

    /// Malformed backend protocol payload
    #[error("protocol error: {0}")]
    Protocol(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
