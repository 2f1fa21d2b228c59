//! Speech-to-text (STT) processing

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use super::capture::samples_to_wav;
use super::frame::{SAMPLE_RATE, Utterance};
use crate::{Error, Result};

/// Default OpenAI-compatible endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default hosted transcription model
pub const DEFAULT_API_MODEL: &str = "whisper-1";

/// Which model a transcription should use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelHint {
    /// Short clip checked for the wake phrase; speed over accuracy
    Wake,
    /// A command to act on; accuracy over speed
    Command,
}

/// Turns an utterance into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe an utterance
    ///
    /// An empty utterance yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns error if transcription fails
    async fn transcribe(&self, utterance: &Utterance, hint: ModelHint) -> Result<String>;
}

/// Response from OpenAI Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Transcribes through an OpenAI-compatible `/audio/transcriptions` endpoint
///
/// A local whisper server works as well as the hosted API, in which case
/// the key may be omitted.
pub struct WhisperApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    wake_model: String,
    command_model: String,
    language: String,
}

impl WhisperApi {
    /// Create a client for `base_url`
    #[must_use]
    pub fn new(base_url: &str, api_key: Option<SecretString>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            wake_model: DEFAULT_API_MODEL.to_string(),
            command_model: DEFAULT_API_MODEL.to_string(),
            language: "en".to_string(),
        }
    }

    /// Set the wake and command models
    #[must_use]
    pub fn with_models(mut self, wake: impl Into<String>, command: impl Into<String>) -> Self {
        self.wake_model = wake.into();
        self.command_model = command.into();
        self
    }

    /// Set the transcription language
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    /// Model used for a hint
    #[must_use]
    pub fn model_for(&self, hint: ModelHint) -> &str {
        match hint {
            ModelHint::Wake => &self.wake_model,
            ModelHint::Command => &self.command_model,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperApi {
    async fn transcribe(&self, utterance: &Utterance, hint: ModelHint) -> Result<String> {
        if utterance.is_empty() {
            return Ok(String::new());
        }

        let audio = samples_to_wav(&utterance.samples(), SAMPLE_RATE)?;
        let model = self.model_for(hint).to_string();
        tracing::debug!(audio_bytes = audio.len(), %model, ?hint, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", model)
            .text("language", self.language.clone());

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.base_url))
            .multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            tracing::error!(error = %e, "transcription request failed");
            e
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription API error {status}: {body}")));
        }

        let result: WhisperResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse response");
            e
        })?;

        let transcript = result.text.trim().to_string();
        tracing::debug!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}

#[cfg(feature = "whisper")]
mod local {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

    use super::{ModelHint, Transcriber};
    use crate::voice::frame::Utterance;
    use crate::{Error, Result};

    struct Model {
        // the state borrows resources owned by the context
        _context: WhisperContext,
        state: Mutex<whisper_rs::WhisperState>,
    }

    impl Model {
        fn load(path: &Path) -> Result<Self> {
            let context = WhisperContext::new_with_params(
                &path.to_string_lossy(),
                WhisperContextParameters::default(),
            )
            .map_err(|e| Error::Stt(format!("failed to load {}: {e}", path.display())))?;
            let state = context
                .create_state()
                .map_err(|e| Error::Stt(format!("whisper state init failed: {e}")))?;
            Ok(Self {
                _context: context,
                state: Mutex::new(state),
            })
        }

        fn run(&self, samples: &[f32], language: &str) -> Result<String> {
            let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
            params.set_print_progress(false);
            params.set_print_realtime(false);
            params.set_no_timestamps(true);
            params.set_language(Some(language));

            let mut state = self
                .state
                .lock()
                .map_err(|e| Error::Stt(format!("whisper lock poisoned: {e}")))?;
            state
                .full(&params, samples)
                .map_err(|e| Error::Stt(format!("whisper inference failed: {e}")))?;

            Ok(state
                .as_iter()
                .filter_map(|seg| seg.to_str().ok().map(str::to_string))
                .collect::<Vec<_>>()
                .join(" ")
                .trim()
                .to_string())
        }
    }

    /// On-device Whisper with separate wake and command models
    pub struct LocalWhisper {
        wake: Arc<Model>,
        command: Arc<Model>,
        language: Arc<str>,
    }

    impl LocalWhisper {
        /// Load both ggml models up front
        ///
        /// # Errors
        ///
        /// Returns error if either model fails to load
        pub fn load(wake_model: &Path, command_model: &Path, language: &str) -> Result<Self> {
            tracing::info!(wake = %wake_model.display(), command = %command_model.display(), "loading whisper models");
            let wake = Arc::new(Model::load(wake_model)?);
            let command = if wake_model == command_model {
                Arc::clone(&wake)
            } else {
                Arc::new(Model::load(command_model)?)
            };
            Ok(Self {
                wake,
                command,
                language: Arc::from(language),
            })
        }
    }

    #[async_trait]
    impl Transcriber for LocalWhisper {
        async fn transcribe(&self, utterance: &Utterance, hint: ModelHint) -> Result<String> {
            if utterance.is_empty() {
                return Ok(String::new());
            }

            let model = match hint {
                ModelHint::Wake => Arc::clone(&self.wake),
                ModelHint::Command => Arc::clone(&self.command),
            };
            let language = Arc::clone(&self.language);
            let samples = utterance.samples();

            tokio::task::spawn_blocking(move || model.run(&samples, &language))
                .await
                .map_err(|e| Error::Stt(format!("whisper task failed: {e}")))?
        }
    }
}

#[cfg(feature = "whisper")]
pub use local::LocalWhisper;
