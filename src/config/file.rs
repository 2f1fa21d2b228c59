//! TOML configuration file loading
//!
//! Supports `~/.config/hey-claude/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub audio: AudioFileConfig,

    #[serde(default)]
    pub stt: SttFileConfig,

    #[serde(default)]
    pub tts: TtsFileConfig,

    #[serde(default)]
    pub session: SessionFileConfig,

    #[serde(default)]
    pub wake_word: WakeWordFileConfig,

    #[serde(default)]
    pub claude: ClaudeFileConfig,

    #[serde(default)]
    pub quick: QuickFileConfig,
}

/// Microphone and segmentation settings
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// RMS gate on a [-1, 1] scale (e.g. 0.01)
    pub energy_threshold: Option<f32>,
    /// Seconds of trailing silence that end an utterance
    pub silence_duration: Option<f64>,
    /// Hard cap on one recording, in seconds
    pub max_recording_duration: Option<f64>,
    /// WebRTC VAD aggressiveness, 0 to 3
    pub vad_aggressiveness: Option<u8>,
    /// Substring of the input device name
    pub device: Option<String>,
}

/// Speech-to-text settings
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// "api" or "local"
    pub provider: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// Model for wake phrase checks (API model name or ggml path)
    pub wake_model: Option<String>,
    /// Model for commands (API model name or ggml path)
    pub command_model: Option<String>,
    pub language: Option<String>,
}

/// Text-to-speech settings
#[derive(Debug, Default, Deserialize)]
pub struct TtsFileConfig {
    /// "system", "openai" or "console"
    pub provider: Option<String>,
    pub voice: Option<String>,
    /// Words per minute
    pub rate: Option<u32>,
    /// Extra words per minute for status updates
    pub status_rate_boost: Option<u32>,
    pub api_key: Option<String>,
}

/// Session window settings
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Seconds of silence before a session closes
    pub timeout: Option<f64>,
    /// Turns kept for history injection
    pub history_turns: Option<usize>,
}

/// Phrase lists
#[derive(Debug, Default, Deserialize)]
pub struct WakeWordFileConfig {
    pub phrases: Option<Vec<String>>,
    pub quick_phrases: Option<Vec<String>>,
    pub exit_phrases: Option<Vec<String>>,
}

/// Claude Code CLI settings
#[derive(Debug, Default, Deserialize)]
pub struct ClaudeFileConfig {
    /// Binary name or path
    pub binary: Option<String>,
    pub cwd: Option<String>,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
}

/// Quick mode settings
#[derive(Debug, Default, Deserialize)]
pub struct QuickFileConfig {
    pub enabled: Option<bool>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub rate: Option<u32>,
    pub max_tokens: Option<u32>,
    pub system_prompt: Option<String>,
    pub api_key: Option<String>,
}

/// Load the TOML config file from `path`, or the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> ConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return ConfigFile::default();
    };

    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return ConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/hey-claude/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("hey-claude").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_parses() {
        let file: ConfigFile = toml::from_str(
            r#"
            [audio]
            energy_threshold = 0.02

            [wake_word]
            exit_phrases = ["goodbye", "that's all"]
            "#,
        )
        .unwrap();
        assert_eq!(file.audio.energy_threshold, Some(0.02));
        assert!(file.audio.device.is_none());
        assert_eq!(file.wake_word.exit_phrases.unwrap().len(), 2);
        assert!(file.quick.enabled.is_none());
    }

    #[test]
    fn missing_file_is_default() {
        let file = load_config_file(Some(Path::new("/nonexistent/hey-claude.toml")));
        assert!(file.tts.voice.is_none());
    }

    #[test]
    fn unparsable_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tts\nvoice = ").unwrap();
        let file = load_config_file(Some(&path));
        assert!(file.tts.voice.is_none());
    }

    #[test]
    fn file_is_read_from_given_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[tts]\nvoice = \"Alex\"\nrate = 170\n").unwrap();
        let file = load_config_file(Some(&path));
        assert_eq!(file.tts.voice.as_deref(), Some("Alex"));
        assert_eq!(file.tts.rate, Some(170));
    }
}
