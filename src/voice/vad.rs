//! Per-frame speech classification
//!
//! Two stages: a cheap RMS [`EnergyGate`] and an injected [`SpeechDetector`].
//! The detector only ever sees frames that already passed the gate.

use webrtc_vad::{SampleRate, Vad, VadMode};

use super::frame::{AudioFrame, FRAME_SAMPLES, SAMPLE_RATE};
use crate::{Error, Result};

/// Default RMS level above which audio counts as "active"
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.01;

/// Classifies a single fixed-size frame as speech or non-speech
pub trait SpeechDetector {
    /// Returns true if the frame contains speech
    ///
    /// # Errors
    ///
    /// Returns error if the frame cannot be classified
    fn is_speech(&mut self, frame: &AudioFrame) -> Result<bool>;
}

/// Cheap loudness check run before the speech detector
#[derive(Debug, Clone, Copy)]
pub struct EnergyGate {
    threshold: f32,
}

impl EnergyGate {
    /// Create a gate with the given RMS threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// The configured threshold
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Frame is loud enough to be worth classifying
    #[must_use]
    pub fn passes(&self, frame: &AudioFrame) -> bool {
        frame.rms() >= self.threshold
    }

    /// Frame is strictly above the threshold (activity detection)
    #[must_use]
    pub fn is_active(&self, frame: &AudioFrame) -> bool {
        frame.rms() > self.threshold
    }
}

impl Default for EnergyGate {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

/// WebRTC VAD speech detector
pub struct WebRtcDetector {
    vad: Vad,
    aggressiveness: u8,
}

impl WebRtcDetector {
    /// Create a detector for 16 kHz audio
    ///
    /// # Arguments
    ///
    /// * `aggressiveness` - 0-3, higher filters non-speech more aggressively
    ///
    /// # Errors
    ///
    /// Returns error if aggressiveness is out of range
    pub fn new(aggressiveness: u8) -> Result<Self> {
        let mode = match aggressiveness {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            3 => VadMode::VeryAggressive,
            other => {
                return Err(Error::Config(format!(
                    "VAD aggressiveness must be 0-3, got {other}"
                )));
            }
        };

        let mut vad = Vad::new();
        vad.set_mode(mode);
        vad.set_sample_rate(SampleRate::Rate16kHz);

        tracing::debug!(
            aggressiveness,
            sample_rate = SAMPLE_RATE,
            frame_samples = FRAME_SAMPLES,
            "webrtc vad initialized"
        );

        Ok(Self {
            vad,
            aggressiveness,
        })
    }

    /// The configured aggressiveness
    #[must_use]
    pub const fn aggressiveness(&self) -> u8 {
        self.aggressiveness
    }
}

impl SpeechDetector for WebRtcDetector {
    fn is_speech(&mut self, frame: &AudioFrame) -> Result<bool> {
        if frame.len() != FRAME_SAMPLES {
            return Err(Error::Vad(format!(
                "expected {FRAME_SAMPLES} samples, got {}",
                frame.len()
            )));
        }

        let pcm = to_pcm16(frame.samples());
        self.vad
            .is_voice_segment(&pcm)
            .map_err(|e| Error::Vad(format!("webrtc vad rejected frame: {e:?}")))
    }
}

/// Convert f32 [-1.0, 1.0] samples to 16-bit PCM
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0) as i16)
        .collect()
}
