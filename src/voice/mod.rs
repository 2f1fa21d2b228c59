//! Voice processing module
//!
//! Handles audio capture, speech segmentation, wake phrases, transcription
//! and spoken output.

mod capture;
mod frame;
mod playback;
mod segmenter;
mod stt;
mod tts;
mod vad;
mod wake_word;

pub use capture::{FrameSource, MicrophoneSource, samples_to_wav};
pub use frame::{AudioFrame, FRAME_DURATION, FRAME_MS, FRAME_SAMPLES, SAMPLE_RATE, Utterance, rms};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, tone};
pub use segmenter::{FollowUp, Listener, PRE_ROLL_FRAMES, Segmenter, SegmenterConfig};
#[cfg(feature = "whisper")]
pub use stt::LocalWhisper;
pub use stt::{DEFAULT_API_MODEL, DEFAULT_BASE_URL, ModelHint, Transcriber, WhisperApi};
pub use tts::{BASE_RATE, CloudSpeaker, ConsoleSpeaker, SpeechStyle, Speaker, SystemSpeaker};
pub use vad::{DEFAULT_ENERGY_THRESHOLD, EnergyGate, SpeechDetector, WebRtcDetector};
pub use wake_word::{
    DEFAULT_EXIT_PHRASES, DEFAULT_PHRASES, DEFAULT_QUICK_PHRASES, TurnMode, WakeMatch, WakePhrases,
};
