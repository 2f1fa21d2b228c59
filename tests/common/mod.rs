//! Shared test utilities
//!
//! Scripted stand-ins for the microphone, speech detector, transcriber,
//! backends and speaker. Audio time is driven by a [`ManualClock`] that
//! advances one frame per frame read.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::mpsc;

use hey_claude::agent::{Backend, EventStream, ProtocolEvent, ResultSubtype, TurnRequest};
use hey_claude::voice::{
    AudioFrame, FRAME_DURATION, FrameSource, ModelHint, Segmenter, SegmenterConfig, SpeechDetector,
    SpeechStyle, Speaker, Transcriber, Utterance,
};
use hey_claude::{
    Backends, Clock, ControllerConfig, Error, ManualClock, Result, Session, TurnController,
};

/// Level of a frame the detector accepts as speech
pub const SPEECH: f32 = 0.5;
/// Level that passes the energy gate but is not speech
pub const NOISE: f32 = 0.05;
/// Level below the energy gate
pub const SILENCE: f32 = 0.0;

/// Frames at `level` for `count` frames
#[must_use]
pub fn frames(level: f32, count: usize) -> Vec<f32> {
    vec![level; count]
}

/// A short spoken utterance: lead-in silence, speech, then enough trailing
/// silence to end the segment
#[must_use]
pub fn utterance_levels(speech_frames: usize) -> Vec<f32> {
    let mut levels = frames(SILENCE, 3);
    levels.extend(frames(SPEECH, speech_frames));
    levels.extend(frames(SILENCE, 50));
    levels
}

/// Microphone replaying scripted levels, then silence forever
pub struct ScriptedSource {
    frames: VecDeque<AudioFrame>,
    clock: Arc<ManualClock>,
    pub starts: usize,
    pub stops: usize,
    pub reads: usize,
}

impl ScriptedSource {
    pub fn new(levels: &[f32], clock: Arc<ManualClock>) -> Self {
        Self {
            frames: levels.iter().map(|&l| AudioFrame::constant(l)).collect(),
            clock,
            starts: 0,
            stops: 0,
            reads: 0,
        }
    }

    /// Frames not yet read
    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ScriptedSource {
    fn start(&mut self) -> Result<()> {
        self.starts += 1;
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
    }

    fn next_frame(&mut self, deadline: Instant) -> Result<Option<AudioFrame>> {
        if self.clock.now() >= deadline {
            return Ok(None);
        }
        self.clock.advance(FRAME_DURATION);
        self.reads += 1;
        Ok(Some(
            self.frames
                .pop_front()
                .unwrap_or_else(|| AudioFrame::constant(SILENCE)),
        ))
    }
}

/// Speech is anything at or above `SPEECH / 2`
pub struct LevelDetector {
    pub calls: usize,
}

impl SpeechDetector for LevelDetector {
    fn is_speech(&mut self, frame: &AudioFrame) -> Result<bool> {
        self.calls += 1;
        Ok(frame.rms() >= SPEECH / 2.0)
    }
}

/// Every frame is speech
pub struct AlwaysSpeech;

impl SpeechDetector for AlwaysSpeech {
    fn is_speech(&mut self, _: &AudioFrame) -> Result<bool> {
        Ok(true)
    }
}

/// Every classification fails
pub struct FailingDetector;

impl SpeechDetector for FailingDetector {
    fn is_speech(&mut self, _: &AudioFrame) -> Result<bool> {
        Err(Error::Vad("detector unavailable".to_string()))
    }
}

pub type TestListener = Segmenter<ScriptedSource, LevelDetector>;

/// Segmenter over scripted levels with default settings
pub fn listener(levels: &[f32], clock: &Arc<ManualClock>) -> TestListener {
    let shared: Arc<dyn Clock> = clock.clone();
    Segmenter::new(
        ScriptedSource::new(levels, Arc::clone(clock)),
        LevelDetector { calls: 0 },
        SegmenterConfig::default(),
        shared,
    )
}

/// Returns queued transcripts in order, then empty strings
#[derive(Clone, Default)]
pub struct ScriptedTranscriber {
    transcripts: Arc<Mutex<VecDeque<String>>>,
    pub hints: Arc<Mutex<Vec<ModelHint>>>,
}

impl ScriptedTranscriber {
    pub fn new(transcripts: &[&str]) -> Self {
        Self {
            transcripts: Arc::new(Mutex::new(
                transcripts.iter().map(ToString::to_string).collect(),
            )),
            hints: Arc::default(),
        }
    }

    pub fn push(&self, transcript: &str) {
        self.transcripts
            .lock()
            .expect("transcripts lock")
            .push_back(transcript.to_string());
    }

    pub fn hints(&self) -> Vec<ModelHint> {
        self.hints.lock().expect("hints lock").clone()
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, utterance: &Utterance, hint: ModelHint) -> Result<String> {
        assert!(!utterance.is_empty(), "controller transcribed an empty utterance");
        self.hints.lock().expect("hints lock").push(hint);
        Ok(self
            .transcripts
            .lock()
            .expect("transcripts lock")
            .pop_front()
            .unwrap_or_default())
    }
}

/// Replays queued event lists and records requests
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub turns: Arc<Mutex<VecDeque<Vec<ProtocolEvent>>>>,
    pub requests: Arc<Mutex<Vec<TurnRequest>>>,
    /// Fail every turn, signalling this channel first
    pub fail_with: Option<mpsc::Sender<()>>,
}

impl ScriptedBackend {
    pub fn push(&self, events: Vec<ProtocolEvent>) {
        self.turns.lock().expect("turns lock").push_back(events);
    }

    pub fn requests(&self) -> Vec<TurnRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn run(&self, request: TurnRequest) -> Result<EventStream> {
        self.requests.lock().expect("requests lock").push(request);
        if let Some(tx) = &self.fail_with {
            let _ = tx.try_send(());
            return Err(Error::Backend("scripted failure".to_string()));
        }
        let events = self
            .turns
            .lock()
            .expect("turns lock")
            .pop_front()
            .unwrap_or_default();
        Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
    }
}

/// A successful terminal event
pub fn success(handle: &str, result: &str) -> ProtocolEvent {
    ProtocolEvent::Result {
        subtype: ResultSubtype::Success,
        session_id: Some(handle.to_string()),
        result: Some(result.to_string()),
        error: None,
    }
}

/// One spoken line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spoken {
    pub text: String,
    pub style: SpeechStyle,
    pub blocking: bool,
}

/// Records everything it is asked to say
#[derive(Clone, Default)]
pub struct RecordingSpeaker {
    pub lines: Arc<Mutex<Vec<Spoken>>>,
}

impl RecordingSpeaker {
    pub fn lines(&self) -> Vec<Spoken> {
        self.lines.lock().expect("speaker lock").clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.lines().into_iter().map(|s| s.text).collect()
    }
}

#[async_trait]
impl Speaker for RecordingSpeaker {
    async fn speak(&self, text: &str, style: &SpeechStyle, blocking: bool) {
        self.lines.lock().expect("speaker lock").push(Spoken {
            text: text.to_string(),
            style: style.clone(),
            blocking,
        });
    }
}

/// A controller wired to fakes, with handles to inspect them
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub transcriber: ScriptedTranscriber,
    pub standard: ScriptedBackend,
    pub quick: ScriptedBackend,
    pub speaker: RecordingSpeaker,
    pub controller: TurnController<TestListener>,
}

impl Harness {
    /// Controller hearing `levels` and transcribing them as `transcripts`
    pub fn new(levels: &[f32], transcripts: &[&str]) -> Self {
        Self::with_backend(levels, transcripts, ScriptedBackend::default())
    }

    pub fn with_backend(levels: &[f32], transcripts: &[&str], standard: ScriptedBackend) -> Self {
        let clock = Arc::new(ManualClock::new());
        let shared: Arc<dyn Clock> = clock.clone();
        let transcriber = ScriptedTranscriber::new(transcripts);
        let quick = ScriptedBackend::default();
        let speaker = RecordingSpeaker::default();

        let config = ControllerConfig {
            cwd: PathBuf::from("/work"),
            system_prompt: "standard instructions".to_string(),
            quick_system_prompt: "quick instructions".to_string(),
            quick_model: Some("claude-haiku-4-5".to_string()),
            error_backoff: Duration::ZERO,
            ..ControllerConfig::default()
        };

        let controller = TurnController::new(
            listener(levels, &clock),
            Box::new(transcriber.clone()),
            Backends {
                standard: Box::new(standard.clone()),
                quick: Some(Box::new(quick.clone())),
            },
            Box::new(speaker.clone()),
            Session::new(Duration::from_secs(30), shared),
            config,
        );

        Self {
            clock,
            transcriber,
            standard,
            quick,
            speaker,
            controller,
        }
    }
}
