//! Capture collaborators and PCM helpers.
//!
//! The core pipeline only sees mono f32 samples at its configured rate. This
//! module owns everything needed to get there:
//!
//! - [`capture::CaptureSource`]: the blocking `read()` interface the engine drives.
//! - [`microphone::MicrophoneSource`]: cpal input stream → SPSC ring → reader.
//! - [`wav::WavSource`]: WAV file replay.
//! - [`resample::RateConverter`]: device rate → pipeline rate.

pub mod capture;
pub mod device;
#[cfg(feature = "audio-cpal")]
pub mod microphone;
pub mod resample;
pub mod wav;

pub use capture::{CaptureSource, MemorySource};
#[cfg(feature = "audio-cpal")]
pub use microphone::MicrophoneSource;
pub use wav::WavSource;

/// Convert a signed 16-bit PCM sample to f32 in [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32_768.0
}

/// Convert a buffer of signed 16-bit PCM into `out`, replacing its contents.
pub fn i16_slice_to_f32(samples: &[i16], out: &mut Vec<f32>) {
    out.clear();
    out.extend(samples.iter().copied().map(i16_to_f32));
}

/// Average interleaved multi-channel samples down to mono, replacing `out`.
///
/// A trailing partial frame (fewer than `channels` samples) is ignored.
pub fn downmix_into<T: Copy>(data: &[T], channels: usize, to_f32: fn(T) -> f32, out: &mut Vec<f32>) {
    out.clear();
    if channels <= 1 {
        out.extend(data.iter().copied().map(to_f32));
        return;
    }
    out.extend(data.chunks_exact(channels).map(|frame| {
        frame.iter().copied().map(to_f32).sum::<f32>() / channels as f32
    }));
}

/// Average interleaved f32 samples down to mono.
pub fn downmix_interleaved(data: &[f32], channels: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(data.len() / channels.max(1));
    downmix_into(data, channels, |s| s, &mut out);
    out
}
