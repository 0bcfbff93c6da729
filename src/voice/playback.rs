//! Tone playback to speakers

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};

use super::AudioOutput;
use crate::{Error, Result};

/// Sample rate for tone playback
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Peak amplitude of a tone at full volume
const TONE_AMPLITUDE: f32 = 0.3;

/// Fade in/out length, avoids clicks at tone edges
const FADE_SAMPLES: usize = 120;

/// Plays tones on the default output device
///
/// `tone` only enqueues samples; the output stream drains the queue in the
/// background, so the caller paces tones with its own delays.
pub struct Speaker {
    config: StreamConfig,
    queue: Arc<Mutex<VecDeque<f32>>>,
    volume: Arc<AtomicU8>,
    stream: Option<Stream>,
}

impl Speaker {
    /// Create a new speaker instance
    ///
    /// # Errors
    ///
    /// Returns error if audio device cannot be opened
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
            })
            .or_else(|| {
                // Fallback: try stereo
                device.supported_output_configs().ok()?.find(|c| {
                    c.channels() == 2
                        && c.min_sample_rate() <= SampleRate(PLAYBACK_SAMPLE_RATE)
                        && c.max_sample_rate() >= SampleRate(PLAYBACK_SAMPLE_RATE)
                })
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(PLAYBACK_SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = PLAYBACK_SAMPLE_RATE,
            channels = config.channels,
            "audio playback initialized"
        );

        Ok(Self {
            config,
            queue: Arc::new(Mutex::new(VecDeque::new())),
            volume: Arc::new(AtomicU8::new(u8::MAX)),
            stream: None,
        })
    }
}

impl AudioOutput for Speaker {
    fn begin(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".to_string()))?;

        let channels = self.config.channels as usize;
        let queue = Arc::clone(&self.queue);
        let volume = Arc::clone(&self.volume);

        let stream = device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let gain = f32::from(volume.load(Ordering::Relaxed)) / 255.0;
                    let mut queue = queue.lock().ok();
                    for frame in data.chunks_mut(channels) {
                        let sample = queue
                            .as_mut()
                            .and_then(|q| q.pop_front())
                            .unwrap_or(0.0);
                        for out in frame.iter_mut() {
                            *out = sample * gain;
                        }
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio playback started");
        Ok(())
    }

    fn end(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio playback stopped");
        }
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume.store(volume, Ordering::Relaxed);
    }

    fn tone(&mut self, freq_hz: u16, duration_ms: u16) {
        if self.stream.is_none() {
            tracing::warn!(freq_hz, "tone requested while speaker is disabled");
            return;
        }
        let samples = tone_samples(freq_hz, duration_ms, PLAYBACK_SAMPLE_RATE);
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(samples);
        }
    }
}

/// Generate a faded sine tone
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn tone_samples(freq_hz: u16, duration_ms: u16, sample_rate: u32) -> Vec<f32> {
    let count = (u64::from(sample_rate) * u64::from(duration_ms) / 1000) as usize;
    let fade = FADE_SAMPLES.min(count / 2);
    let step = 2.0 * std::f32::consts::PI * f32::from(freq_hz) / sample_rate as f32;

    (0..count)
        .map(|i| {
            let envelope = if fade == 0 {
                1.0
            } else if i < fade {
                i as f32 / fade as f32
            } else if i >= count - fade {
                (count - i) as f32 / fade as f32
            } else {
                1.0
            };
            (step * i as f32).sin() * TONE_AMPLITUDE * envelope
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tone_length_matches_duration() {
        assert_eq!(tone_samples(2400, 100, 24000).len(), 2400);
        assert_eq!(tone_samples(800, 200, 16000).len(), 3200);
        assert!(tone_samples(1000, 0, 24000).is_empty());
    }

    #[test]
    fn tone_starts_and_ends_silent() {
        let samples = tone_samples(2000, 80, PLAYBACK_SAMPLE_RATE);
        assert!(samples[0].abs() < f32::EPSILON);
        assert!(samples[samples.len() - 1].abs() < 0.01);
    }

    #[test]
    fn tone_stays_within_amplitude() {
        let samples = tone_samples(1800, 60, PLAYBACK_SAMPLE_RATE);
        assert!(samples.iter().all(|s| s.abs() <= TONE_AMPLITUDE + f32::EPSILON));
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(peak > TONE_AMPLITUDE * 0.9);
    }
}
