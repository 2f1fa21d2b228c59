//! Text-to-speech (TTS) output
//!
//! Speaking never fails from the caller's point of view: every speaker
//! degrades to a console echo when its engine is unavailable.

use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::process::Command;

use super::playback::AudioPlayback;
use crate::{Error, Result};

/// Speaking rate the cloud speed multiplier is relative to (words per minute)
pub const BASE_RATE: u32 = 185;

const OPENAI_VOICES: &[&str] = &[
    "alloy", "ash", "coral", "echo", "fable", "nova", "onyx", "sage", "shimmer",
];
const DEFAULT_CLOUD_VOICE: &str = "alloy";
const DEFAULT_CLOUD_MODEL: &str = "tts-1";

/// Voice and speaking rate for one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechStyle {
    pub voice: String,
    /// Words per minute
    pub rate: u32,
}

impl SpeechStyle {
    #[must_use]
    pub fn new(voice: impl Into<String>, rate: u32) -> Self {
        Self {
            voice: voice.into(),
            rate,
        }
    }

    /// Same voice, faster by `boost` words per minute
    #[must_use]
    pub fn faster(&self, boost: u32) -> Self {
        Self {
            voice: self.voice.clone(),
            rate: self.rate.saturating_add(boost),
        }
    }
}

impl Default for SpeechStyle {
    fn default() -> Self {
        Self::new("Samantha", BASE_RATE)
    }
}

/// Says text out loud
#[async_trait]
pub trait Speaker: Send + Sync {
    /// Speak `text`; with `blocking` the call returns once speech is done
    async fn speak(&self, text: &str, style: &SpeechStyle, blocking: bool);
}

/// Prints what would have been said
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSpeaker;

#[async_trait]
impl Speaker for ConsoleSpeaker {
    async fn speak(&self, text: &str, _style: &SpeechStyle, _blocking: bool) {
        echo(text);
    }
}

fn echo(text: &str) {
    if !text.trim().is_empty() {
        println!("[TTS] {text}");
    }
}

#[derive(Debug, Clone)]
enum Engine {
    Say(PathBuf),
    Espeak(PathBuf),
}

/// The operating system's synthesizer (`say` on macOS, `espeak` elsewhere)
#[derive(Debug, Clone)]
pub struct SystemSpeaker {
    engine: Option<Engine>,
}

impl SystemSpeaker {
    /// Look up a synthesizer on `PATH`
    ///
    /// Without one, speech is echoed to the console.
    #[must_use]
    pub fn detect() -> Self {
        let engine = which::which("say")
            .map(Engine::Say)
            .or_else(|_| which::which("espeak").map(Engine::Espeak))
            .ok();

        match &engine {
            Some(Engine::Say(path) | Engine::Espeak(path)) => {
                tracing::debug!(engine = %path.display(), "system speech engine found");
            }
            None => tracing::warn!("no speech engine found, speech will be printed"),
        }

        Self { engine }
    }

    /// Whether a synthesizer was found
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.engine.is_some()
    }

    fn command(&self, text: &str, style: &SpeechStyle) -> Option<Command> {
        let rate = style.rate.to_string();
        let (program, args) = match self.engine.as_ref()? {
            Engine::Say(path) => (path, ["-v", style.voice.as_str(), "-r", rate.as_str(), text]),
            Engine::Espeak(path) => (path, ["-s", rate.as_str(), "--", text, ""]),
        };

        let mut command = Command::new(program);
        command.args(args.iter().filter(|a| !a.is_empty()));
        Some(command)
    }
}

#[async_trait]
impl Speaker for SystemSpeaker {
    async fn speak(&self, text: &str, style: &SpeechStyle, blocking: bool) {
        if text.trim().is_empty() {
            return;
        }
        let Some(mut command) = self.command(text, style) else {
            echo(text);
            return;
        };

        let outcome = if blocking {
            command.status().await.map(|status| {
                if !status.success() {
                    tracing::warn!(%status, "speech engine exited with failure");
                }
            })
        } else {
            // the runtime reaps the detached child
            command.spawn().map(drop)
        };

        if let Err(e) = outcome {
            tracing::warn!(error = %e, "speech engine failed");
            echo(text);
        }
    }
}

/// `OpenAI` speech synthesis played through the default output device
pub struct CloudSpeaker {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    speed: f32,
    response_format: &'static str,
}

impl CloudSpeaker {
    #[must_use]
    pub fn new(api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: super::stt::DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_CLOUD_MODEL.to_string(),
        }
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Synthesize `text` to MP3 bytes
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn synthesize(&self, text: &str, style: &SpeechStyle) -> Result<Vec<u8>> {
        let voice = cloud_voice(&style.voice);
        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice,
            speed: speed_for(style.rate),
            response_format: "mp3",
        };

        tracing::debug!(chars = text.len(), voice, speed = request.speed, "synthesizing speech");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("speech API error {status}: {body}")));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

async fn play(audio: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play_mp3(&audio))
        .await
        .map_err(|e| Error::Audio(format!("playback task failed: {e}")))?
}

#[async_trait]
impl Speaker for CloudSpeaker {
    async fn speak(&self, text: &str, style: &SpeechStyle, blocking: bool) {
        if text.trim().is_empty() {
            return;
        }

        let audio = match self.synthesize(text, style).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed");
                echo(text);
                return;
            }
        };

        if blocking {
            if let Err(e) = play(audio).await {
                tracing::warn!(error = %e, "speech playback failed");
                echo(text);
            }
        } else {
            let text = text.to_string();
            tokio::spawn(async move {
                if let Err(e) = play(audio).await {
                    tracing::warn!(error = %e, "speech playback failed");
                    echo(&text);
                }
            });
        }
    }
}

/// Map words per minute onto the API speed multiplier
#[allow(clippy::cast_precision_loss)]
fn speed_for(rate: u32) -> f32 {
    (rate as f32 / BASE_RATE as f32).clamp(0.25, 4.0)
}

/// Desktop voice names mean nothing to the API
fn cloud_voice(voice: &str) -> &str {
    OPENAI_VOICES
        .iter()
        .find(|v| v.eq_ignore_ascii_case(voice))
        .copied()
        .unwrap_or(DEFAULT_CLOUD_VOICE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_is_relative_to_base_rate() {
        assert!((speed_for(185) - 1.0).abs() < f32::EPSILON);
        assert!((speed_for(370) - 2.0).abs() < f32::EPSILON);
        assert!((speed_for(10) - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn unknown_voices_fall_back() {
        assert_eq!(cloud_voice("Nova"), "nova");
        assert_eq!(cloud_voice("Samantha"), DEFAULT_CLOUD_VOICE);
    }

    #[test]
    fn status_style_is_faster() {
        let style = SpeechStyle::default().faster(20);
        assert_eq!(style.rate, 205);
        assert_eq!(style.voice, "Samantha");
    }

    #[test]
    fn say_command_carries_voice_and_rate() {
        let speaker = SystemSpeaker {
            engine: Some(Engine::Say(PathBuf::from("/usr/bin/say"))),
        };
        let command = speaker
            .command("hello", &SpeechStyle::new("Junior", 200))
            .unwrap();
        let args: Vec<_> = command.as_std().get_args().collect();
        assert_eq!(args, ["-v", "Junior", "-r", "200", "hello"]);
    }

    #[test]
    fn espeak_command_uses_rate_only() {
        let speaker = SystemSpeaker {
            engine: Some(Engine::Espeak(PathBuf::from("/usr/bin/espeak"))),
        };
        let command = speaker
            .command("-dash first", &SpeechStyle::new("Junior", 200))
            .unwrap();
        let args: Vec<_> = command.as_std().get_args().collect();
        assert_eq!(args, ["-s", "200", "--", "-dash first"]);
    }

    #[tokio::test]
    async fn missing_engine_degrades_to_echo() {
        let speaker = SystemSpeaker { engine: None };
        assert!(!speaker.is_available());
        speaker.speak("hello", &SpeechStyle::default(), true).await;
        speaker.speak("   ", &SpeechStyle::default(), false).await;
    }
}
