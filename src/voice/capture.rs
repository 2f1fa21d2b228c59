//! Audio capture from microphone
//!
//! [`FrameSource`] is the blocking frame stream the segmenter reads. A stream
//! is opened with `start` and held open for a whole capture call, so chained
//! waits and captures never clip audio at the seam.

use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, Stream, StreamConfig};
use rubato::{FftFixedIn, Resampler};

use super::frame::{AudioFrame, FRAME_SAMPLES, SAMPLE_RATE};
use crate::{Error, Result};

/// Device-rate samples fed to the resampler per pass
const RESAMPLE_CHUNK: usize = 1024;

/// A live, blocking source of fixed-size audio frames
pub trait FrameSource {
    /// Open the capture context
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn start(&mut self) -> Result<()>;

    /// Close the capture context, discarding buffered audio
    fn stop(&mut self);

    /// Block until the next frame arrives or `deadline` passes
    ///
    /// Returns `None` on deadline.
    ///
    /// # Errors
    ///
    /// Returns error if the stream failed or was never started
    fn next_frame(&mut self, deadline: Instant) -> Result<Option<AudioFrame>>;
}

/// Captures 16 kHz mono frames from an input device
pub struct MicrophoneSource {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    receiver: Option<Receiver<Vec<f32>>>,
    resampler: Option<FftFixedIn<f32>>,
    raw: Vec<f32>,
    pending: VecDeque<f32>,
}

impl MicrophoneSource {
    /// Open the default input device, or the first device whose name
    /// contains `device_name`
    ///
    /// # Errors
    ///
    /// Returns error if no usable input device is found
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let host = cpal::default_host();

        let device = match device_name {
            Some(wanted) => host
                .input_devices()
                .map_err(|e| Error::Audio(e.to_string()))?
                .find(|d| d.name().is_ok_and(|n| n.contains(wanted)))
                .ok_or_else(|| Error::Audio(format!("no input device matching \"{wanted}\"")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| Error::Audio("no input device available".to_string()))?,
        };

        let native = device
            .supported_input_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.sample_format() == SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .map(|c| c.with_sample_rate(SampleRate(SAMPLE_RATE)).config());

        let config = if let Some(config) = native {
            config
        } else {
            let fallback = device
                .default_input_config()
                .map_err(|e| Error::Audio(e.to_string()))?;
            if fallback.sample_format() != SampleFormat::F32 {
                return Err(Error::Audio("no suitable audio config found".to_string()));
            }
            fallback.config()
        };

        let resampler = if config.sample_rate.0 == SAMPLE_RATE {
            None
        } else {
            Some(
                FftFixedIn::<f32>::new(
                    config.sample_rate.0 as usize,
                    SAMPLE_RATE as usize,
                    RESAMPLE_CHUNK,
                    2,
                    1,
                )
                .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?,
            )
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            device_rate = config.sample_rate.0,
            channels = config.channels,
            resampling = resampler.is_some(),
            "audio capture initialized"
        );

        Ok(Self {
            device,
            config,
            stream: None,
            receiver: None,
            resampler,
            raw: Vec::new(),
            pending: VecDeque::new(),
        })
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }

    /// Get the output sample rate
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    /// Move resampled (or native) samples into the pending frame buffer
    fn absorb(&mut self, chunk: Vec<f32>) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            self.pending.extend(chunk);
            return Ok(());
        };

        self.raw.extend(chunk);
        while self.raw.len() >= resampler.input_frames_next() {
            let needed = resampler.input_frames_next();
            let rest = self.raw.split_off(needed);
            let input = std::mem::replace(&mut self.raw, rest);
            let output = resampler
                .process(&[input], None)
                .map_err(|e| Error::Audio(format!("resampling failed: {e}")))?;
            if let Some(mono) = output.into_iter().next() {
                self.pending.extend(mono);
            }
        }
        Ok(())
    }
}

impl FrameSource for MicrophoneSource {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let channels = usize::from(self.config.channels.max(1));

        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono: Vec<f32> = if channels == 1 {
                        data.to_vec()
                    } else {
                        #[allow(clippy::cast_precision_loss)]
                        data.chunks(channels)
                            .map(|c| c.iter().sum::<f32>() / c.len() as f32)
                            .collect()
                    };
                    let _ = tx.send(mono);
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);
        self.receiver = Some(rx);

        tracing::debug!("audio capture started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
        self.receiver = None;
        self.raw.clear();
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    fn next_frame(&mut self, deadline: Instant) -> Result<Option<AudioFrame>> {
        loop {
            if self.pending.len() >= FRAME_SAMPLES {
                let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
                return Ok(Some(AudioFrame::new(frame)));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let rx = self
                .receiver
                .as_ref()
                .ok_or_else(|| Error::Audio("capture not started".to_string()))?;

            match rx.recv_timeout(deadline - now) {
                Ok(chunk) => self.absorb(chunk)?,
                Err(RecvTimeoutError::Timeout) => return Ok(None),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(Error::Audio("input stream closed".to_string()));
                }
            }
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for sample in super::vad::to_pcm16(samples) {
            writer
                .write_sample(sample)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_and_length() {
        let samples = vec![0.0, 0.5, -0.5, 1.0];
        let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + samples.len() * 2);
    }
}
