//! Audio capability interfaces and stream format
//!
//! The recording and feedback state machines talk to the microphone and
//! speaker only through [`AudioInput`] and [`AudioOutput`]. Host
//! implementations backed by `cpal` live in `capture` and `playback`.

mod capture;
mod playback;

pub use capture::{MicCapture, samples_to_wav};
pub use playback::{PLAYBACK_SAMPLE_RATE, Speaker, tone_samples};

use crate::Result;

/// Capture sample rate (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// Capture channel count
pub const CHANNELS: u16 = 1;

/// Bits per captured sample
pub const BIT_DEPTH: u16 = 16;

/// Wire format name announced in the session start message
pub const FORMAT: &str = "pcm_s16le";

/// Samples per streamed chunk (20ms @ 16kHz)
pub const CHUNK_SAMPLES: usize = 320;

/// Bytes per streamed chunk
pub const CHUNK_BYTES: usize = CHUNK_SAMPLES * (BIT_DEPTH as usize / 8) * CHANNELS as usize;

/// Microphone capability
pub trait AudioInput {
    /// Enable the microphone
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn begin(&mut self) -> Result<()>;

    /// Disable the microphone and drop any buffered samples
    fn end(&mut self);

    /// Whether the microphone is currently enabled
    fn is_enabled(&self) -> bool;

    /// Fill `buf` with exactly `buf.len()` samples if that many are ready
    ///
    /// Returns `false` without touching `buf` when not enough audio has
    /// been captured yet. Never blocks.
    fn try_record(&mut self, buf: &mut [i16]) -> bool;
}

/// Speaker capability
pub trait AudioOutput {
    /// Enable the speaker
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be opened
    fn begin(&mut self) -> Result<()>;

    /// Disable the speaker
    fn end(&mut self);

    /// Set playback volume (0-255)
    fn set_volume(&mut self, volume: u8);

    /// Start a tone; returns immediately while the tone plays
    fn tone(&mut self, freq_hz: u16, duration_ms: u16);
}

/// Encode samples as little-endian PCM bytes, appending to `out`
pub fn encode_pcm_le(samples: &[i16], out: &mut Vec<u8>) {
    out.reserve(samples.len() * 2);
    for sample in samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_geometry() {
        assert_eq!(CHUNK_SAMPLES, 320);
        assert_eq!(CHUNK_BYTES, 640);
        assert_eq!(
            CHUNK_SAMPLES as u32 * 1000 / SAMPLE_RATE,
            20,
            "one chunk is 20ms of audio"
        );
    }

    #[test]
    fn pcm_is_little_endian() {
        let mut out = Vec::new();
        encode_pcm_le(&[1, -2, 0x1234], &mut out);
        assert_eq!(out, vec![0x01, 0x00, 0xFE, 0xFF, 0x34, 0x12]);
    }
}
