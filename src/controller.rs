//! The turn loop
//!
//! Each iteration is either IDLE (no live session: capture, look for a wake
//! phrase) or SESSION (listen for a bare follow-up until the window closes).
//! Whatever was heard goes to the backend for the current [`TurnMode`], and
//! the interpreted reply is spoken and folded back into the [`Session`].

use std::path::PathBuf;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;

use crate::Result;
use crate::agent::{
    Backend, FALLBACK_TEXT, Signal, StreamInterpreter, TurnOutcome, TurnRequest,
};
use crate::prompt;
use crate::session::Session;
use crate::voice::{
    FollowUp, Listener, ModelHint, SpeechStyle, Speaker, Transcriber, TurnMode, WakePhrases,
};

const STANDARD_ACK: &str = "mmhm";
const QUICK_ACK: &str = "yeah?";
const NOT_CAUGHT: &str = "I didn't catch that, try again.";
const FAREWELL: &str = "Goodbye!";
const APOLOGY: &str = "Something went wrong. Try again.";
const PROMPT_PREVIEW_CHARS: usize = 120;

/// Settings for [`TurnController`]
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Directory the backend works in, reported in every prompt
    pub cwd: PathBuf,
    /// Instructions for standard turns
    pub system_prompt: String,
    /// Instructions for quick turns
    pub quick_system_prompt: String,
    /// Model override for standard turns
    pub model: Option<String>,
    /// Model override for quick turns
    pub quick_model: Option<String>,
    /// Voice for standard replies and status lines
    pub style: SpeechStyle,
    /// Voice for quick replies
    pub quick_style: SpeechStyle,
    /// Extra words per minute for status announcements
    pub status_rate_boost: u32,
    /// Pause after a failed turn
    pub error_backoff: Duration,
    /// Wake and exit phrases
    pub phrases: WakePhrases,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cwd: PathBuf::from("."),
            system_prompt: prompt::DEFAULT_SYSTEM_PROMPT.trim().to_string(),
            quick_system_prompt: prompt::DEFAULT_QUICK_PROMPT.trim().to_string(),
            model: None,
            quick_model: None,
            style: SpeechStyle::default(),
            quick_style: SpeechStyle::new("Junior", 200),
            status_rate_boost: 20,
            error_backoff: Duration::from_secs(1),
            phrases: WakePhrases::default(),
        }
    }
}

/// Backends keyed by [`TurnMode`]
pub struct Backends {
    /// Runs standard turns
    pub standard: Box<dyn Backend>,
    /// Without a quick backend, quick turns use the standard one
    pub quick: Option<Box<dyn Backend>>,
}

/// Result of one loop iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing actionable was heard
    Idle,
    /// A wake phrase arrived without a usable command
    NotCaught,
    /// The session window closed without a follow-up
    Expired,
    /// An exit phrase ended the session
    Ended,
    /// A backend turn completed
    Turn(TurnSummary),
}

/// What a completed turn did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSummary {
    pub mode: TurnMode,
    /// The command as heard, without history or context
    pub command: String,
    pub spoken: String,
    /// Session handle after the turn
    pub handle: Option<String>,
}

enum Heard {
    Command(String),
    Nothing(Step),
}

/// Drives listening, backend turns and speech for one user
pub struct TurnController<L> {
    listener: L,
    transcriber: Box<dyn Transcriber>,
    backends: Backends,
    speaker: Box<dyn Speaker>,
    session: Session,
    mode: TurnMode,
    config: ControllerConfig,
}

impl<L: Listener> TurnController<L> {
    pub fn new(
        listener: L,
        transcriber: Box<dyn Transcriber>,
        backends: Backends,
        speaker: Box<dyn Speaker>,
        session: Session,
        config: ControllerConfig,
    ) -> Self {
        Self {
            listener,
            transcriber,
            backends,
            speaker,
            session,
            mode: TurnMode::Standard,
            config,
        }
    }

    /// Current session state
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Mode of the current (or last) session
    #[must_use]
    pub const fn mode(&self) -> TurnMode {
        self.mode
    }

    /// Run until a shutdown message arrives
    ///
    /// Shutdown is checked between iterations. A failed iteration is spoken
    /// as an apology and the loop carries on after a short pause.
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) {
        loop {
            if shutdown.try_recv().is_ok() {
                tracing::info!("shutdown requested");
                break;
            }

            match self.step().await {
                Ok(step) => tracing::trace!(?step, "iteration complete"),
                Err(e) => {
                    tracing::error!(error = %e, "turn failed");
                    self.say(APOLOGY, TurnMode::Standard).await;
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
    }

    /// One iteration of the loop
    ///
    /// # Errors
    ///
    /// Returns error if capture, transcription or the backend fails
    #[allow(clippy::future_not_send)]
    pub async fn step(&mut self) -> Result<Step> {
        // the window can lapse during a long reply or backoff
        if self.session.is_expired() {
            self.end_session();
            tracing::info!("session expired between turns, waiting for wake phrase");
        }

        let heard = if self.session.is_active() {
            self.listen_in_session().await?
        } else {
            self.listen_for_wake().await?
        };

        let command = match heard {
            Heard::Command(command) => command,
            Heard::Nothing(step) => return Ok(step),
        };

        if self.config.phrases.is_exit(&command) {
            self.end_session();
            self.say(FAREWELL, TurnMode::Standard).await;
            tracing::info!("session ended");
            return Ok(Step::Ended);
        }

        self.issue(command).await.map(Step::Turn)
    }

    #[allow(clippy::future_not_send)]
    async fn listen_in_session(&mut self) -> Result<Heard> {
        let window = self.session.time_remaining().min(self.session.timeout());
        tracing::info!(session = %self.session, "listening for follow-up");

        let follow_up = self.listener.follow_up(window)?;

        if !self.session.is_active() {
            self.end_session();
            tracing::info!("session timed out, waiting for wake phrase");
            return Ok(Heard::Nothing(Step::Expired));
        }

        match follow_up {
            FollowUp::NoActivity => {
                self.end_session();
                tracing::info!("no follow-up, waiting for wake phrase");
                Ok(Heard::Nothing(Step::Expired))
            }
            FollowUp::NoSpeech => Ok(Heard::Nothing(Step::Idle)),
            FollowUp::Utterance(utterance) => {
                let transcript = self
                    .transcriber
                    .transcribe(&utterance, ModelHint::Command)
                    .await?;
                if transcript.trim().is_empty() {
                    return Ok(Heard::Nothing(Step::Idle));
                }
                Ok(Heard::Command(transcript))
            }
        }
    }

    #[allow(clippy::future_not_send)]
    async fn listen_for_wake(&mut self) -> Result<Heard> {
        let Some(utterance) = self.listener.capture()? else {
            return Ok(Heard::Nothing(Step::Idle));
        };

        let transcript = self.transcriber.transcribe(&utterance, ModelHint::Wake).await?;
        let Some(wake) = self.config.phrases.detect(&transcript) else {
            tracing::debug!(transcript = %transcript, "no wake phrase");
            return Ok(Heard::Nothing(Step::Idle));
        };

        self.mode = wake.mode;
        tracing::info!(mode = %wake.mode, transcript = %transcript, "wake phrase detected");

        match wake.mode {
            TurnMode::Standard => self.say(STANDARD_ACK, TurnMode::Standard).await,
            // mic reopens while the acknowledgement plays
            TurnMode::Quick => {
                let style = self.config.quick_style.clone();
                self.speaker.speak(QUICK_ACK, &style, false).await;
            }
        }

        let mut command = wake.command;
        if command.is_empty() {
            tracing::info!("wake phrase only, waiting for command");
            let Some(utterance) = self.listener.capture()? else {
                return Ok(Heard::Nothing(Step::Idle));
            };
            command = self
                .transcriber
                .transcribe(&utterance, ModelHint::Command)
                .await?;
        }

        if command.trim().is_empty() {
            self.say(NOT_CAUGHT, self.mode).await;
            return Ok(Heard::Nothing(Step::NotCaught));
        }

        Ok(Heard::Command(command.trim().to_string()))
    }

    #[allow(clippy::future_not_send)]
    async fn issue(&mut self, command: String) -> Result<TurnSummary> {
        let mode = self.mode;
        let history = if self.session.is_active() {
            self.session.history_prompt()
        } else {
            String::new()
        };
        let prompt = prompt::compose(&history, &command, &self.config.cwd);

        let (system_prompt, model) = match mode {
            TurnMode::Standard => (&self.config.system_prompt, &self.config.model),
            TurnMode::Quick => (&self.config.quick_system_prompt, &self.config.quick_model),
        };
        let request = TurnRequest {
            prompt,
            system_prompt: system_prompt.clone(),
            continuity_handle: self.session.session_id().map(str::to_string),
            model: model.clone(),
        };

        let backend = match (mode, &self.backends.quick) {
            (TurnMode::Quick, Some(quick)) => quick.as_ref(),
            _ => self.backends.standard.as_ref(),
        };

        let preview: String = request.prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        tracing::info!(%mode, backend = backend.name(), command = %command, prompt = %preview, "sending turn");

        let mut events = backend.run(request).await?;
        let mut interpreter = match mode {
            TurnMode::Standard => StreamInterpreter::new(),
            TurnMode::Quick => StreamInterpreter::new().with_sentences(),
        };

        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    for signal in interpreter.feed(event) {
                        self.on_signal(signal).await;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "backend stream error"),
            }
        }
        drop(events);

        let outcome = interpreter.finish();
        self.settle(&command, &outcome);

        if mode == TurnMode::Quick && outcome.streamed() {
            if let Some(rest) = &outcome.trailing_sentence {
                self.say(rest, mode).await;
            }
        } else {
            self.say(&outcome.spoken, mode).await;
        }

        Ok(TurnSummary {
            mode,
            command,
            spoken: outcome.spoken,
            handle: self.session.session_id().map(str::to_string),
        })
    }

    /// Fold a finished turn into the session
    fn settle(&mut self, command: &str, outcome: &TurnOutcome) {
        match &outcome.handle {
            Some(handle) => self.session.update(handle),
            None => self.session.touch(),
        }

        let failed = outcome.subtype.as_ref().is_some_and(|s| s.is_error());
        if failed {
            tracing::warn!(subtype = ?outcome.subtype, spoken = %outcome.spoken, "[RESULT:ERR]");
        } else {
            tracing::info!(session = %self.session, spoken = %outcome.spoken, "[RESULT:OK]");
        }

        if outcome.spoken != FALLBACK_TEXT {
            self.session.add_history(command, &outcome.spoken);
        }
    }

    #[allow(clippy::future_not_send)]
    async fn on_signal(&self, signal: Signal) {
        match signal {
            Signal::Status(status) => {
                tracing::info!(status = %status, "[STATUS]");
                let style = self.style(self.mode).faster(self.config.status_rate_boost);
                self.speaker.speak(&status, &style, true).await;
            }
            Signal::ToolCall { name, summary } => {
                tracing::info!(tool = %name, input = %summary, "[TOOL]");
            }
            Signal::ToolResult { preview, is_error } => {
                if is_error {
                    tracing::warn!(result = %preview, "[TOOL] failed");
                } else {
                    tracing::debug!(result = %preview, "[TOOL] result");
                }
            }
            Signal::Sentence(sentence) => self.say(&sentence, self.mode).await,
        }
    }

    fn end_session(&mut self) {
        self.session.clear();
        self.mode = TurnMode::Standard;
    }

    const fn style(&self, mode: TurnMode) -> &SpeechStyle {
        match mode {
            TurnMode::Standard => &self.config.style,
            TurnMode::Quick => &self.config.quick_style,
        }
    }

    #[allow(clippy::future_not_send)]
    async fn say(&self, text: &str, mode: TurnMode) {
        tracing::info!(%mode, text, "[SPEAK]");
        self.speaker.speak(text, self.style(mode), true).await;
    }
}
