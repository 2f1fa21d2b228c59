use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hey_claude::config::Overrides;
use hey_claude::voice::{AudioPlayback, FrameSource, MicrophoneSource, PLAYBACK_SAMPLE_RATE, rms, tone};
use hey_claude::{Config, Daemon};

/// hey-claude - talk to Claude hands-free
#[derive(Parser)]
#[command(name = "hey-claude", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/hey-claude/config.toml)
    #[arg(short, long, env = "HEY_CLAUDE_CONFIG")]
    config: Option<PathBuf>,

    /// Working directory for Claude
    #[arg(long)]
    cwd: Option<PathBuf>,

    /// Voice for speech output (e.g. Samantha, Alex)
    #[arg(long)]
    voice: Option<String>,

    /// Speech rate in words per minute
    #[arg(long)]
    rate: Option<u32>,

    /// Claude model override (e.g. claude-haiku-4-5)
    #[arg(long)]
    model: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
#[allow(clippy::enum_variant_names)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,hey_claude=info",
        1 => "info,hey_claude=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let overrides = Overrides {
        cwd: cli.cwd,
        voice: cli.voice,
        rate: cli.rate,
        model: cli.model,
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;
    tracing::debug!(?config, "loaded configuration");

    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(config.audio.device.as_deref(), duration),
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(config, &text).await,
        };
    }

    tracing::info!(
        cwd = %config.claude.cwd.display(),
        voice = %config.tts.style.voice,
        "starting hey-claude"
    );

    Daemon::new(config).run().await?;

    println!("\n[hey-claude] Bye!\n");
    Ok(())
}

/// Test microphone input
fn test_mic(device: Option<&str>, duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut source = MicrophoneSource::new(device)?;
    source.start()?;

    println!("Device rate: {} Hz", source.sample_rate());
    println!("---");

    for i in 0..duration {
        let deadline = Instant::now() + Duration::from_secs(1);
        let mut samples = Vec::new();
        while let Some(frame) = source.next_frame(deadline)? {
            samples.extend_from_slice(frame.samples());
        }

        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    source.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("Speech should sit well above audio.energy_threshold (default 0.01).");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let samples = tone(440.0, Duration::from_secs(2), 0.3);
    println!("Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || AudioPlayback::new()?.play(samples)).await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Speak through the configured speaker
async fn test_tts(config: Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let style = config.tts.style.clone();
    println!("Provider: {:?}, voice: {}, rate: {}", config.tts.provider, style.voice, style.rate);

    let speaker = hey_claude::daemon::build_speaker(config.tts);
    speaker.speak(text, &style, true).await;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
