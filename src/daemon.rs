//! Daemon - the voice loop service
//!
//! Builds the microphone, transcriber, backends and speaker from
//! configuration and runs the turn loop until ctrl-c.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::agent::{ClaudeCli, DirectApi};
use crate::clock::{Clock, SystemClock};
use crate::config::{ClaudeConfig, Config, QuickConfig, SttConfig, SttProvider, TtsConfig, TtsProvider};
use crate::controller::{Backends, ControllerConfig, TurnController};
use crate::prompt::{self, DEFAULT_QUICK_PROMPT, DEFAULT_SYSTEM_PROMPT};
use crate::session::Session;
use crate::voice::{
    CloudSpeaker, ConsoleSpeaker, MicrophoneSource, Segmenter, Speaker, SystemSpeaker,
    Transcriber, WebRtcDetector, WhisperApi,
};
use crate::{Error, Result};

/// The hey-claude daemon
pub struct Daemon {
    config: Config,
}

impl Daemon {
    /// Create a new daemon instance
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }

    /// Run the voice loop until interrupted
    ///
    /// # Errors
    ///
    /// Returns error if a component cannot be initialized
    #[allow(clippy::future_not_send)]
    pub async fn run(self) -> Result<()> {
        let Config {
            audio,
            stt,
            tts,
            session,
            wake_word,
            claude,
            quick,
        } = self.config;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let source = MicrophoneSource::new(audio.device.as_deref())?;
        let detector = WebRtcDetector::new(audio.vad_aggressiveness)?;
        let listener = Segmenter::new(source, detector, audio.segmenter(), Arc::clone(&clock));

        let transcriber = build_transcriber(stt)?;

        let controller_config = ControllerConfig {
            cwd: claude.cwd.clone(),
            system_prompt: prompt::load_system_prompt(
                claude.system_prompt.as_deref(),
                DEFAULT_SYSTEM_PROMPT,
            ),
            quick_system_prompt: prompt::load_system_prompt(
                quick.system_prompt.as_deref(),
                DEFAULT_QUICK_PROMPT,
            ),
            model: claude.model.clone(),
            quick_model: Some(quick.model.clone()),
            style: tts.style.clone(),
            quick_style: quick.style.clone(),
            status_rate_boost: tts.status_rate_boost,
            phrases: wake_word.matcher(quick.enabled),
            ..ControllerConfig::default()
        };

        let backends = build_backends(&claude, quick)?;
        let speaker = build_speaker(tts);
        let session = Session::new(session.timeout, clock).with_history_limit(session.history_turns);

        let mut controller = TurnController::new(
            listener,
            transcriber,
            backends,
            speaker,
            session,
            controller_config,
        );

        // Set up shutdown signal
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down after the current turn, ctrl-c again to force");
                let _ = shutdown_tx.send(()).await;
            }
            // capture can block for a full recording; a second ctrl-c exits now
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });

        tracing::info!(
            wake = ?wake_word.phrases.first(),
            quick = ?wake_word.quick_phrases.first(),
            cwd = %prompt::compact_path(&claude.cwd),
            "hey-claude ready"
        );

        controller.run(shutdown_rx).await;

        tracing::info!("daemon stopped");
        Ok(())
    }
}

/// Create the configured transcriber
///
/// # Errors
///
/// Returns error if local models cannot be loaded, or the local provider is
/// requested in a build without the `whisper` feature
pub fn build_transcriber(stt: SttConfig) -> Result<Box<dyn Transcriber>> {
    match stt.provider {
        SttProvider::Api => {
            tracing::info!(url = %stt.base_url, wake = %stt.wake_model, command = %stt.command_model, "using whisper api");
            Ok(Box::new(
                WhisperApi::new(&stt.base_url, stt.api_key)
                    .with_models(stt.wake_model, stt.command_model)
                    .with_language(stt.language),
            ))
        }
        #[cfg(feature = "whisper")]
        SttProvider::Local => Ok(Box::new(crate::voice::LocalWhisper::load(
            Path::new(&stt.wake_model),
            Path::new(&stt.command_model),
            &stt.language,
        )?)),
        #[cfg(not(feature = "whisper"))]
        SttProvider::Local => Err(Error::Config(format!(
            "local transcription ({}) needs a build with the \"whisper\" feature",
            Path::new(&stt.command_model).display()
        ))),
    }
}

/// Create the standard and quick backends
///
/// # Errors
///
/// Returns error if the Claude CLI cannot be found
pub fn build_backends(claude: &ClaudeConfig, quick: QuickConfig) -> Result<Backends> {
    if !claude.cwd.is_dir() {
        return Err(Error::Config(format!(
            "working directory {} does not exist",
            claude.cwd.display()
        )));
    }
    let standard = ClaudeCli::locate(&claude.binary, claude.cwd.clone())?;

    let quick = match (quick.enabled, quick.api_key) {
        (true, Some(key)) => {
            tracing::debug!(model = %quick.model, "quick mode uses the messages api");
            Some(Box::new(
                DirectApi::new(key)
                    .with_model(quick.model)
                    .with_max_tokens(quick.max_tokens),
            ) as Box<dyn crate::agent::Backend>)
        }
        (true, None) => {
            tracing::warn!("ANTHROPIC_API_KEY not set, quick turns will use the claude cli");
            None
        }
        (false, _) => None,
    };

    Ok(Backends {
        standard: Box::new(standard),
        quick,
    })
}

/// Create the configured speaker
///
/// Falls back to printing when the requested engine is unavailable.
#[must_use]
pub fn build_speaker(tts: TtsConfig) -> Box<dyn Speaker> {
    match (tts.provider, tts.api_key) {
        (TtsProvider::OpenAi, Some(key)) => Box::new(CloudSpeaker::new(key)),
        (TtsProvider::OpenAi, None) => {
            tracing::warn!("OPENAI_API_KEY not set, falling back to system speech");
            Box::new(SystemSpeaker::detect())
        }
        (TtsProvider::System, _) => Box::new(SystemSpeaker::detect()),
        (TtsProvider::Console, _) => Box::new(ConsoleSpeaker),
    }
}
