//! Configuration management for hey-claude
//!
//! Values resolve as CLI flag > environment variable > TOML file > default.

pub mod file;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::agent::DEFAULT_QUICK_MODEL;
use crate::session::{DEFAULT_HISTORY_TURNS, DEFAULT_TIMEOUT};
use crate::voice::{
    DEFAULT_API_MODEL, DEFAULT_BASE_URL, DEFAULT_ENERGY_THRESHOLD, DEFAULT_EXIT_PHRASES,
    DEFAULT_PHRASES, DEFAULT_QUICK_PHRASES, SegmenterConfig, SpeechStyle, WakePhrases,
};
use crate::{Error, Result};
use file::ConfigFile;

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub cwd: Option<PathBuf>,
    pub voice: Option<String>,
    pub rate: Option<u32>,
    pub model: Option<String>,
}

/// hey-claude configuration
#[derive(Debug)]
pub struct Config {
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub tts: TtsConfig,
    pub session: SessionConfig,
    pub wake_word: WakeWordConfig,
    pub claude: ClaudeConfig,
    pub quick: QuickConfig,
}

/// Microphone and segmentation configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub energy_threshold: f32,
    pub silence_duration: Duration,
    pub max_recording_duration: Duration,
    /// WebRTC VAD aggressiveness (0 to 3)
    pub vad_aggressiveness: u8,
    /// Input device name filter
    pub device: Option<String>,
}

impl AudioConfig {
    /// Segmenter parameters for these settings
    #[must_use]
    pub fn segmenter(&self) -> SegmenterConfig {
        SegmenterConfig {
            energy_threshold: self.energy_threshold,
            silence_duration: self.silence_duration,
            max_duration: self.max_recording_duration,
            ..SegmenterConfig::default()
        }
    }
}

/// Where transcription runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SttProvider {
    /// `OpenAI`-compatible HTTP endpoint
    Api,
    /// On-device whisper (requires the `whisper` feature)
    Local,
}

impl FromStr for SttProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "api" | "openai" => Ok(Self::Api),
            "local" | "whisper" => Ok(Self::Local),
            other => Err(Error::Config(format!("unknown stt provider \"{other}\""))),
        }
    }
}

/// Speech-to-text configuration
#[derive(Debug)]
pub struct SttConfig {
    pub provider: SttProvider,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    /// API model name, or ggml path for the local provider
    pub wake_model: String,
    /// API model name, or ggml path for the local provider
    pub command_model: String,
    pub language: String,
}

/// How speech is produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsProvider {
    /// `say` or `espeak`
    System,
    /// `OpenAI` speech API
    OpenAi,
    /// Print only
    Console,
}

impl FromStr for TtsProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "system" | "say" => Ok(Self::System),
            "openai" | "cloud" => Ok(Self::OpenAi),
            "console" | "none" => Ok(Self::Console),
            other => Err(Error::Config(format!("unknown tts provider \"{other}\""))),
        }
    }
}

/// Text-to-speech configuration
#[derive(Debug)]
pub struct TtsConfig {
    pub provider: TtsProvider,
    pub style: SpeechStyle,
    /// Extra words per minute for status updates
    pub status_rate_boost: u32,
    pub api_key: Option<SecretString>,
}

/// Session window configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub timeout: Duration,
    pub history_turns: usize,
}

/// Wake, quick and exit phrase lists
#[derive(Debug, Clone)]
pub struct WakeWordConfig {
    pub phrases: Vec<String>,
    pub quick_phrases: Vec<String>,
    pub exit_phrases: Vec<String>,
}

impl WakeWordConfig {
    /// Build the phrase matcher; quick phrases are dropped when quick mode is off
    #[must_use]
    pub fn matcher(&self, quick_enabled: bool) -> WakePhrases {
        let quick = if quick_enabled {
            self.quick_phrases.clone()
        } else {
            Vec::new()
        };
        WakePhrases::new(self.phrases.clone(), quick, self.exit_phrases.clone())
    }
}

/// Claude Code CLI configuration
#[derive(Debug, Clone)]
pub struct ClaudeConfig {
    pub binary: String,
    pub cwd: PathBuf,
    pub model: Option<String>,
    pub system_prompt: Option<PathBuf>,
}

/// Quick mode configuration
#[derive(Debug)]
pub struct QuickConfig {
    pub enabled: bool,
    pub model: String,
    pub style: SpeechStyle,
    pub max_tokens: u32,
    pub system_prompt: Option<PathBuf>,
    pub api_key: Option<SecretString>,
}

impl Config {
    /// Load configuration from the file at `path` (or the default path),
    /// the process environment, and CLI overrides
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or unrecognized
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let fc = file::load_config_file(path);
        Self::resolve(fc, |key| std::env::var(key).ok(), overrides)
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if a value is out of range or unrecognized
    pub fn resolve(
        fc: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let secret = |value: Option<String>| value.map(SecretString::from);

        // Audio (toml > default)
        let energy_threshold = fc.audio.energy_threshold.unwrap_or(DEFAULT_ENERGY_THRESHOLD);
        if !(0.0..=1.0).contains(&energy_threshold) {
            return Err(Error::Config(format!(
                "audio.energy_threshold must be between 0 and 1, got {energy_threshold}"
            )));
        }
        let vad_aggressiveness = fc.audio.vad_aggressiveness.unwrap_or(2);
        if vad_aggressiveness > 3 {
            return Err(Error::Config(format!(
                "audio.vad_aggressiveness must be 0-3, got {vad_aggressiveness}"
            )));
        }
        let audio = AudioConfig {
            energy_threshold,
            silence_duration: seconds(
                "audio.silence_duration",
                fc.audio.silence_duration,
                Duration::from_millis(1500),
            )?,
            max_recording_duration: seconds(
                "audio.max_recording_duration",
                fc.audio.max_recording_duration,
                Duration::from_secs(30),
            )?,
            vad_aggressiveness,
            device: env("HEY_CLAUDE_INPUT_DEVICE").or(fc.audio.device),
        };

        // STT (env > toml > default)
        let stt_provider = env("HEY_CLAUDE_STT_PROVIDER")
            .or(fc.stt.provider)
            .map_or(Ok(SttProvider::Api), |p| p.parse())?;
        let (wake_default, command_default) = match stt_provider {
            SttProvider::Api => (DEFAULT_API_MODEL.to_string(), DEFAULT_API_MODEL.to_string()),
            SttProvider::Local => (local_model("ggml-tiny.en.bin"), local_model("ggml-small.en.bin")),
        };
        let stt = SttConfig {
            provider: stt_provider,
            base_url: env("STT_BASE_URL")
                .or(fc.stt.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key: secret(
                env("STT_API_KEY")
                    .or(fc.stt.api_key)
                    .or_else(|| env("OPENAI_API_KEY")),
            ),
            wake_model: fc.stt.wake_model.unwrap_or(wake_default),
            command_model: fc.stt.command_model.unwrap_or(command_default),
            language: fc.stt.language.unwrap_or_else(|| "en".to_string()),
        };

        // TTS (cli > env > toml > default)
        let tts = TtsConfig {
            provider: env("HEY_CLAUDE_TTS_PROVIDER")
                .or(fc.tts.provider)
                .map_or(Ok(TtsProvider::System), |p| p.parse())?,
            style: SpeechStyle::new(
                overrides
                    .voice
                    .clone()
                    .or_else(|| env("HEY_CLAUDE_VOICE"))
                    .or(fc.tts.voice)
                    .unwrap_or_else(|| "Samantha".to_string()),
                overrides
                    .rate
                    .or_else(|| parsed(env("HEY_CLAUDE_RATE"), "HEY_CLAUDE_RATE"))
                    .or(fc.tts.rate)
                    .unwrap_or(crate::voice::BASE_RATE),
            ),
            status_rate_boost: fc.tts.status_rate_boost.unwrap_or(20),
            api_key: secret(env("OPENAI_API_KEY").or(fc.tts.api_key)),
        };

        // Session (env > toml > default)
        let session = SessionConfig {
            timeout: seconds(
                "session.timeout",
                parsed(env("HEY_CLAUDE_SESSION_TIMEOUT"), "HEY_CLAUDE_SESSION_TIMEOUT")
                    .or(fc.session.timeout),
                DEFAULT_TIMEOUT,
            )?,
            history_turns: fc.session.history_turns.unwrap_or(DEFAULT_HISTORY_TURNS),
        };

        let owned = |list: &[&str]| list.iter().map(ToString::to_string).collect::<Vec<_>>();
        let wake_word = WakeWordConfig {
            phrases: fc.wake_word.phrases.unwrap_or_else(|| owned(DEFAULT_PHRASES)),
            quick_phrases: fc
                .wake_word
                .quick_phrases
                .unwrap_or_else(|| owned(DEFAULT_QUICK_PHRASES)),
            exit_phrases: fc
                .wake_word
                .exit_phrases
                .unwrap_or_else(|| owned(DEFAULT_EXIT_PHRASES)),
        };
        if wake_word.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::Config("wake_word.phrases must not be empty".to_string()));
        }

        // Claude CLI (cli > env > toml > default)
        let cwd = overrides
            .cwd
            .clone()
            .or_else(|| env("HEY_CLAUDE_CWD").map(PathBuf::from))
            .or_else(|| fc.claude.cwd.map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("~"));
        let claude = ClaudeConfig {
            binary: env("CLAUDE_BIN")
                .or(fc.claude.binary)
                .unwrap_or_else(|| crate::agent::DEFAULT_BINARY.to_string()),
            cwd: crate::prompt::expand_home(&cwd),
            model: overrides
                .model
                .clone()
                .or_else(|| env("HEY_CLAUDE_MODEL"))
                .or(fc.claude.model),
            system_prompt: fc.claude.system_prompt.map(|p| crate::prompt::expand_home(Path::new(&p))),
        };

        // Quick mode (env > toml > default)
        let api_key = secret(env("ANTHROPIC_API_KEY").or(fc.quick.api_key));
        let quick = QuickConfig {
            enabled: fc.quick.enabled.unwrap_or(true),
            model: env("HEY_CLAUDE_QUICK_MODEL")
                .or(fc.quick.model)
                .unwrap_or_else(|| DEFAULT_QUICK_MODEL.to_string()),
            style: SpeechStyle::new(
                fc.quick.voice.unwrap_or_else(|| "Junior".to_string()),
                fc.quick.rate.unwrap_or(200),
            ),
            max_tokens: fc.quick.max_tokens.unwrap_or(300),
            system_prompt: fc.quick.system_prompt.map(|p| crate::prompt::expand_home(Path::new(&p))),
            api_key,
        };

        Ok(Self {
            audio,
            stt,
            tts,
            session,
            wake_word,
            claude,
            quick,
        })
    }
}

/// Seconds from the file (or env) as a duration, rejecting non-positive values
fn seconds(name: &str, value: Option<f64>, default: Duration) -> Result<Duration> {
    let Some(secs) = value else {
        return Ok(default);
    };
    if secs <= 0.0 {
        return Err(Error::Config(format!("{name} must be positive, got {secs}")));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| Error::Config(format!("{name}: {e}")))
}

/// Parse an environment value, warning when it is malformed
fn parsed<T: FromStr>(value: Option<String>, key: &str) -> Option<T> {
    let value = value?;
    match value.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring malformed environment value");
            None
        }
    }
}

/// Default location of a local ggml model
fn local_model(name: &str) -> String {
    directories::BaseDirs::new()
        .map_or_else(
            || PathBuf::from("models").join(name),
            |d| d.data_dir().join("hey-claude").join("models").join(name),
        )
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn resolve(toml_text: &str, vars: &[(&str, &str)], overrides: &Overrides) -> Result<Config> {
        let fc: ConfigFile = toml::from_str(toml_text).unwrap();
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::resolve(fc, |k| vars.get(k).cloned(), overrides)
    }

    #[test]
    fn defaults() {
        let config = resolve("", &[], &Overrides::default()).unwrap();
        assert!((config.audio.energy_threshold - 0.01).abs() < f32::EPSILON);
        assert_eq!(config.audio.silence_duration, Duration::from_millis(1500));
        assert_eq!(config.audio.max_recording_duration, Duration::from_secs(30));
        assert_eq!(config.audio.vad_aggressiveness, 2);
        assert_eq!(config.stt.provider, SttProvider::Api);
        assert_eq!(config.stt.wake_model, "whisper-1");
        assert_eq!(config.tts.provider, TtsProvider::System);
        assert_eq!(config.tts.style, SpeechStyle::new("Samantha", 185));
        assert_eq!(config.tts.status_rate_boost, 20);
        assert_eq!(config.session.timeout, Duration::from_secs(30));
        assert_eq!(config.session.history_turns, 4);
        assert_eq!(config.wake_word.quick_phrases, ["hey baby claude"]);
        assert_eq!(config.claude.binary, "claude");
        assert!(config.quick.enabled);
        assert_eq!(config.quick.model, "claude-haiku-4-5");
        assert_eq!(config.quick.style, SpeechStyle::new("Junior", 200));
        assert!(config.quick.api_key.is_none());
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let toml_text = "[tts]\nvoice = \"Alex\"\nrate = 150\n[claude]\nmodel = \"file-model\"\n";

        let config = resolve(toml_text, &[], &Overrides::default()).unwrap();
        assert_eq!(config.tts.style, SpeechStyle::new("Alex", 150));
        assert_eq!(config.claude.model.as_deref(), Some("file-model"));

        let env = [("HEY_CLAUDE_VOICE", "Karen"), ("HEY_CLAUDE_MODEL", "env-model")];
        let config = resolve(toml_text, &env, &Overrides::default()).unwrap();
        assert_eq!(config.tts.style.voice, "Karen");
        assert_eq!(config.claude.model.as_deref(), Some("env-model"));

        let overrides = Overrides {
            voice: Some("Daniel".to_string()),
            rate: Some(220),
            model: Some("cli-model".to_string()),
            cwd: Some(PathBuf::from("/tmp/work")),
        };
        let config = resolve(toml_text, &env, &overrides).unwrap();
        assert_eq!(config.tts.style, SpeechStyle::new("Daniel", 220));
        assert_eq!(config.claude.model.as_deref(), Some("cli-model"));
        assert_eq!(config.claude.cwd, PathBuf::from("/tmp/work"));
    }

    #[test]
    fn secrets_come_from_env_first() {
        let toml_text = "[quick]\napi_key = \"from-file\"\n";
        let env = [("ANTHROPIC_API_KEY", "from-env"), ("OPENAI_API_KEY", "oa")];
        let config = resolve(toml_text, &env, &Overrides::default()).unwrap();
        assert_eq!(config.quick.api_key.unwrap().expose_secret(), "from-env");
        // stt falls back to the openai key
        assert_eq!(config.stt.api_key.unwrap().expose_secret(), "oa");
    }

    #[test]
    fn blank_env_is_ignored() {
        let config = resolve("", &[("HEY_CLAUDE_VOICE", "  ")], &Overrides::default()).unwrap();
        assert_eq!(config.tts.style.voice, "Samantha");
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let overrides = Overrides::default();
        assert!(matches!(
            resolve("[audio]\nvad_aggressiveness = 4\n", &[], &overrides),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            resolve("[session]\ntimeout = 0\n", &[], &overrides),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            resolve("[tts]\nprovider = \"carrier-pigeon\"\n", &[], &overrides),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn malformed_env_number_falls_through() {
        let config = resolve(
            "[session]\ntimeout = 45\n",
            &[("HEY_CLAUDE_SESSION_TIMEOUT", "soon")],
            &Overrides::default(),
        )
        .unwrap();
        assert_eq!(config.session.timeout, Duration::from_secs(45));
    }

    #[test]
    fn quick_phrases_only_when_enabled() {
        let config = resolve("", &[], &Overrides::default()).unwrap();
        let on = config.wake_word.matcher(true);
        let off = config.wake_word.matcher(false);
        assert_eq!(
            on.detect("hey baby claude tell me a joke").map(|m| m.mode),
            Some(crate::voice::TurnMode::Quick)
        );
        assert!(off.detect("hey baby claude tell me a joke").is_none());
        assert!(off.detect("hey claude tell me a joke").is_some());
    }

    #[test]
    fn segmenter_settings_follow_audio_config() {
        let config = resolve("[audio]\nsilence_duration = 3.0\n", &[], &Overrides::default()).unwrap();
        let segmenter = config.audio.segmenter();
        assert_eq!(segmenter.silence_frames(), 100);
        assert_eq!(segmenter.pre_roll_frames, 10);
    }
}
