//! Audio frames and utterances

use std::time::Duration;

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Frame duration accepted by the WebRTC VAD (10, 20 or 30 ms)
pub const FRAME_MS: u32 = 30;

/// Samples per frame (30 ms at 16 kHz)
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE * FRAME_MS / 1000) as usize;

/// Frame duration as a [`Duration`]
pub const FRAME_DURATION: Duration = Duration::from_millis(FRAME_MS as u64);

/// One fixed-duration block of mono samples in [-1, 1]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Box<[f32]>,
}

impl AudioFrame {
    /// Wrap captured samples
    #[must_use]
    pub fn new(samples: impl Into<Box<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    /// Frame filled with a constant value
    #[must_use]
    pub fn constant(value: f32) -> Self {
        Self::new(vec![value; FRAME_SAMPLES])
    }

    /// Raw samples
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the frame holds no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// RMS energy of the frame
    #[must_use]
    pub fn rms(&self) -> f32 {
        rms(&self.samples)
    }
}

/// One contiguous speech segment, pre-roll included
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Utterance {
    frames: Vec<AudioFrame>,
}

impl Utterance {
    /// Build an utterance from captured frames
    #[must_use]
    pub const fn new(frames: Vec<AudioFrame>) -> Self {
        Self { frames }
    }

    /// The frames in capture order
    #[must_use]
    pub fn frames(&self) -> &[AudioFrame] {
        &self.frames
    }

    /// Whether the utterance contains no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.iter().all(AudioFrame::is_empty)
    }

    /// Concatenated samples
    #[must_use]
    pub fn samples(&self) -> Vec<f32> {
        self.frames
            .iter()
            .flat_map(|f| f.samples().iter().copied())
            .collect()
    }

    /// Audio duration at [`SAMPLE_RATE`]
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn duration(&self) -> Duration {
        let total: usize = self.frames.iter().map(AudioFrame::len).sum();
        Duration::from_secs_f64(total as f64 / f64::from(SAMPLE_RATE))
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
