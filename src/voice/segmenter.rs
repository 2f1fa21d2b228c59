//! VAD segmentation
//!
//! Turns a live frame stream into utterances. Frames below the energy gate
//! never reach the speech detector. Until the detector fires, frames collect
//! in a bounded pre-roll ring that is flushed ahead of the first speech frame
//! so the onset is not clipped.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::capture::FrameSource;
use super::frame::{AudioFrame, FRAME_DURATION, Utterance};
use super::vad::{DEFAULT_ENERGY_THRESHOLD, EnergyGate, SpeechDetector};
use crate::Result;
use crate::clock::Clock;

/// Pre-roll kept ahead of speech onset (300 ms)
pub const PRE_ROLL_FRAMES: usize = 10;

/// Segmentation parameters
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// RMS level below which a frame is treated as silence
    pub energy_threshold: f32,
    /// Trailing silence that ends an utterance
    pub silence_duration: Duration,
    /// Hard cap on a single capture
    pub max_duration: Duration,
    /// Frames retained before speech onset
    pub pre_roll_frames: usize,
}

impl SegmenterConfig {
    /// Number of consecutive non-speech frames that ends an utterance
    #[must_use]
    pub fn silence_frames(&self) -> usize {
        let frames = self.silence_duration.as_millis() / FRAME_DURATION.as_millis();
        usize::try_from(frames).unwrap_or(usize::MAX).max(1)
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            energy_threshold: DEFAULT_ENERGY_THRESHOLD,
            silence_duration: Duration::from_millis(1500),
            max_duration: Duration::from_secs(30),
            pre_roll_frames: PRE_ROLL_FRAMES,
        }
    }
}

/// Outcome of listening for a follow-up inside a session
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    /// Nothing crossed the energy threshold before the timeout
    NoActivity,
    /// Something was heard but the detector never confirmed speech
    NoSpeech,
    /// A complete follow-up utterance
    Utterance(Utterance),
}

/// What the turn loop needs from the audio side
pub trait Listener {
    /// Capture one utterance, waiting as long as the configured maximum
    ///
    /// # Errors
    ///
    /// Returns error if the capture device fails
    fn capture(&mut self) -> Result<Option<Utterance>>;

    /// Wait up to `timeout` for activity, then capture it on the same stream
    ///
    /// # Errors
    ///
    /// Returns error if the capture device fails
    fn follow_up(&mut self, timeout: Duration) -> Result<FollowUp>;
}

/// Per-frame state of one segmentation pass
struct Segmentation {
    pre_roll: VecDeque<AudioFrame>,
    pre_roll_capacity: usize,
    frames: Vec<AudioFrame>,
    started: bool,
    silent: usize,
    silence_limit: usize,
}

impl Segmentation {
    fn new(config: &SegmenterConfig) -> Self {
        Self {
            pre_roll: VecDeque::with_capacity(config.pre_roll_frames),
            pre_roll_capacity: config.pre_roll_frames,
            frames: Vec::new(),
            started: false,
            silent: 0,
            silence_limit: config.silence_frames(),
        }
    }

    fn hold(&mut self, frame: AudioFrame) {
        if self.pre_roll_capacity == 0 {
            return;
        }
        if self.pre_roll.len() == self.pre_roll_capacity {
            self.pre_roll.pop_front();
        }
        self.pre_roll.push_back(frame);
    }

    /// Non-speech frame. Returns true once the silence limit is reached.
    fn quiet(&mut self, frame: AudioFrame) -> bool {
        if self.started {
            self.frames.push(frame);
            self.silent += 1;
            self.silent >= self.silence_limit
        } else {
            self.hold(frame);
            false
        }
    }

    /// Feed one frame. Returns true when the utterance is complete.
    fn push(
        &mut self,
        frame: AudioFrame,
        gate: &EnergyGate,
        detector: &mut dyn SpeechDetector,
    ) -> bool {
        if !gate.passes(&frame) {
            return self.quiet(frame);
        }

        let speech = detector.is_speech(&frame).unwrap_or_else(|e| {
            tracing::debug!(error = %e, "speech detector failed, treating frame as silence");
            false
        });

        if !speech {
            return self.quiet(frame);
        }

        if !self.started {
            self.started = true;
            self.frames.extend(self.pre_roll.drain(..));
        }
        self.silent = 0;
        self.frames.push(frame);
        false
    }

    fn finish(self) -> Option<Utterance> {
        if !self.started || self.frames.is_empty() {
            return None;
        }
        Some(Utterance::new(self.frames))
    }
}

/// Energy-gated, detector-confirmed utterance segmenter
pub struct Segmenter<S, D> {
    source: S,
    detector: D,
    gate: EnergyGate,
    config: SegmenterConfig,
    clock: Arc<dyn Clock>,
}

impl<S: FrameSource, D: SpeechDetector> Segmenter<S, D> {
    /// Create a segmenter over a frame source
    pub fn new(source: S, detector: D, config: SegmenterConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            detector,
            gate: EnergyGate::new(config.energy_threshold),
            config,
            clock,
        }
    }

    /// The active configuration
    #[must_use]
    pub const fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Get a mutable reference to the underlying source
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Record until trailing silence or `max_duration`
    ///
    /// Returns `None` if the detector never confirmed speech.
    ///
    /// # Errors
    ///
    /// Returns error if the capture device fails
    pub fn capture_until_silence(&mut self, max_duration: Duration) -> Result<Option<Utterance>> {
        self.with_stream(|this| {
            let deadline = this.clock.now() + max_duration;
            let mut segmentation = Segmentation::new(&this.config);
            this.segment(&mut segmentation, deadline)?;
            Ok(segmentation.finish())
        })
    }

    /// Block until a frame exceeds the energy threshold or `timeout` elapses
    ///
    /// # Errors
    ///
    /// Returns error if the capture device fails
    pub fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool> {
        self.with_stream(|this| {
            let deadline = this.clock.now() + timeout;
            Ok(this.await_activity(deadline, |_| {})?.is_some())
        })
    }

    /// Wait for activity, then segment it without reopening the stream
    ///
    /// Frames heard while waiting fill the pre-roll and the frame that
    /// crossed the threshold is the first one segmented.
    ///
    /// # Errors
    ///
    /// Returns error if the capture device fails
    pub fn listen_for_follow_up(&mut self, timeout: Duration) -> Result<FollowUp> {
        self.with_stream(|this| {
            let mut segmentation = Segmentation::new(&this.config);
            let deadline = this.clock.now() + timeout;

            let Some(trigger) = this.await_activity(deadline, |f| segmentation.hold(f))? else {
                return Ok(FollowUp::NoActivity);
            };

            tracing::debug!(rms = trigger.rms(), "activity detected");

            let deadline = this.clock.now() + this.config.max_duration;
            let done = segmentation.push(trigger, &this.gate, &mut this.detector);
            if !done {
                this.segment(&mut segmentation, deadline)?;
            }

            Ok(segmentation
                .finish()
                .map_or(FollowUp::NoSpeech, FollowUp::Utterance))
        })
    }

    fn with_stream<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.source.start()?;
        let result = f(self);
        self.source.stop();
        result
    }

    fn expired(&self, deadline: Instant) -> bool {
        self.clock.now() >= deadline
    }

    fn segment(&mut self, segmentation: &mut Segmentation, deadline: Instant) -> Result<()> {
        loop {
            if self.expired(deadline) {
                tracing::debug!("capture hit max duration");
                return Ok(());
            }
            let Some(frame) = self.source.next_frame(deadline)? else {
                return Ok(());
            };
            if segmentation.push(frame, &self.gate, &mut self.detector) {
                return Ok(());
            }
        }
    }

    fn await_activity(
        &mut self,
        deadline: Instant,
        mut idle: impl FnMut(AudioFrame),
    ) -> Result<Option<AudioFrame>> {
        while !self.expired(deadline) {
            let Some(frame) = self.source.next_frame(deadline)? else {
                break;
            };
            if self.gate.is_active(&frame) {
                return Ok(Some(frame));
            }
            idle(frame);
        }
        Ok(None)
    }
}

impl<S: FrameSource, D: SpeechDetector> Listener for Segmenter<S, D> {
    fn capture(&mut self) -> Result<Option<Utterance>> {
        let max = self.config.max_duration;
        self.capture_until_silence(max)
    }

    fn follow_up(&mut self, timeout: Duration) -> Result<FollowUp> {
        self.listen_for_follow_up(timeout)
    }
}
