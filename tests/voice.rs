//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use hey_claude::ManualClock;
use hey_claude::voice::{
    AudioFrame, FRAME_SAMPLES, FollowUp, Listener, SAMPLE_RATE, Segmenter, SegmenterConfig,
    SpeechDetector, TurnMode, WakePhrases, WebRtcDetector, samples_to_wav,
};

mod common;

use common::{
    AlwaysSpeech, FailingDetector, LevelDetector, NOISE, SPEECH, ScriptedSource, frames, listener,
    utterance_levels,
};

fn short_config(max_duration: Duration) -> SegmenterConfig {
    SegmenterConfig {
        max_duration,
        ..SegmenterConfig::default()
    }
}

fn segmenter<D: SpeechDetector>(
    levels: &[f32],
    detector: D,
    config: SegmenterConfig,
) -> Segmenter<ScriptedSource, D> {
    let clock = Arc::new(ManualClock::new());
    Segmenter::new(
        ScriptedSource::new(levels, Arc::clone(&clock)),
        detector,
        config,
        clock,
    )
}

#[test]
fn test_capture_then_follow_up() {
    let clock = Arc::new(ManualClock::new());
    let mut levels = utterance_levels(10);
    levels.extend(utterance_levels(8));
    let mut listener = listener(&levels, &clock);

    let first = listener.capture().unwrap().expect("first utterance");
    // lead-in silence rides along as pre-roll
    assert_eq!(first.frames().len(), 3 + 10 + 50);

    let FollowUp::Utterance(second) = listener.follow_up(Duration::from_secs(30)).unwrap() else {
        panic!("expected a follow-up utterance");
    };
    assert_eq!(second.frames().len(), 3 + 8 + 50);

    let source = listener.source_mut();
    assert_eq!(source.starts, 2);
    assert_eq!(source.stops, 2);
    assert_eq!(source.remaining(), 0);
}

#[test]
fn test_utterance_duration_matches_frames() {
    let clock = Arc::new(ManualClock::new());
    let mut listener = listener(&utterance_levels(10), &clock);

    let utterance = listener.capture().unwrap().expect("utterance");

    assert_eq!(utterance.samples().len(), 63 * FRAME_SAMPLES);
    assert!((utterance.duration().as_secs_f64() - 1.89).abs() < 1e-6);
    assert_eq!(clock.elapsed(), Duration::from_millis(63 * 30));
}

#[test]
fn test_endless_speech_is_capped() {
    let mut segmenter = segmenter(
        &frames(SPEECH, 100),
        AlwaysSpeech,
        short_config(Duration::from_millis(600)),
    );

    let utterance = segmenter.capture().unwrap().expect("capped utterance");

    assert_eq!(utterance.frames().len(), 20);
    assert_eq!(segmenter.source_mut().remaining(), 80);
}

#[test]
fn test_follow_up_with_only_noise() {
    let mut segmenter = segmenter(
        &frames(NOISE, 40),
        LevelDetector { calls: 0 },
        short_config(Duration::from_millis(300)),
    );

    let follow_up = segmenter.follow_up(Duration::from_secs(1)).unwrap();

    assert_eq!(follow_up, FollowUp::NoSpeech);
}

#[test]
fn test_follow_up_times_out_in_silence() {
    let clock = Arc::new(ManualClock::new());
    let mut listener = listener(&[], &clock);

    let follow_up = listener.follow_up(Duration::from_millis(900)).unwrap();

    assert_eq!(follow_up, FollowUp::NoActivity);
    assert_eq!(clock.elapsed(), Duration::from_millis(900));
}

#[test]
fn test_failing_detector_hears_nothing() {
    let mut segmenter = segmenter(
        &utterance_levels(10),
        FailingDetector,
        short_config(Duration::from_secs(3)),
    );

    assert!(segmenter.capture().unwrap().is_none());
}

#[test]
fn test_utterance_encodes_as_wav() {
    let clock = Arc::new(ManualClock::new());
    let mut listener = listener(&utterance_levels(5), &clock);
    let utterance = listener.capture().unwrap().expect("utterance");
    let samples = utterance.samples();

    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_webrtc_detector_on_silence() {
    let mut detector = WebRtcDetector::new(3).unwrap();
    assert_eq!(detector.aggressiveness(), 3);

    assert!(!detector.is_speech(&AudioFrame::constant(0.0)).unwrap());
    assert!(detector.is_speech(&AudioFrame::new(vec![0.0; 10])).is_err());
}

#[test]
fn test_webrtc_detector_rejects_bad_aggressiveness() {
    assert!(WebRtcDetector::new(4).is_err());
}

#[test]
fn test_wake_phrase_variants() {
    let phrases = WakePhrases::default();

    let wake = phrases.detect("Hey cloud, open the logs").expect("misheard variant");
    assert_eq!(wake.mode, TurnMode::Standard);
    assert_eq!(wake.command, "open the logs");

    let wake = phrases.detect("hey baby claude what's two plus two").expect("quick phrase");
    assert_eq!(wake.mode, TurnMode::Quick);
    assert_eq!(wake.command, "what's two plus two");

    assert!(phrases.detect("the cloud is down").is_none());
    assert!(phrases.detect("").is_none());
}

#[test]
fn test_custom_phrases() {
    let phrases = WakePhrases::new(
        vec!["Computer".to_string()],
        Vec::new(),
        vec!["that's all".to_string()],
    );

    let wake = phrases.detect("computer lights on").expect("custom phrase");
    assert_eq!(wake.command, "lights on");
    assert!(phrases.detect("hey baby claude hi").is_none());

    assert!(phrases.is_exit("okay, that's all"));
    assert!(!phrases.is_exit("goodbye"));
}

#[test]
fn test_exit_phrases_match_whole_words() {
    let phrases = WakePhrases::default();

    assert!(phrases.is_exit("Goodbye!"));
    assert!(phrases.is_exit("please stop listening now"));
    assert!(!phrases.is_exit("what exits are there"));
    assert!(!phrases.is_exit("quite a day"));
}
