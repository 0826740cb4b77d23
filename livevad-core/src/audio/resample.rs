//! Sample-rate conversion with a rubato `FastFixedIn` resampler.
//!
//! Microphones commonly run at 44.1 or 48 kHz and WAV files come at any rate;
//! the pipeline rate is fixed at construction (16 kHz by default).
//! `RateConverter` bridges the two on the capture reader thread, never on the
//! real-time audio callback.
//!
//! When both rates match, no rubato session is created and `process` is a copy.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{info, warn};

use crate::error::{Result, VadError};

/// Input frames per rubato call.
pub const DEFAULT_RESAMPLE_CHUNK: usize = 1024;

pub struct RateConverter {
    /// `None` in passthrough mode.
    resampler: Option<FastFixedIn<f32>>,
    /// Input carried over between calls until a full `chunk_size` block exists.
    input_buf: Vec<f32>,
    chunk_size: usize,
    /// output rate / input rate.
    ratio: f64,
    /// Pre-allocated output buffer: `[1][output_frames_max]`.
    output_buf: Vec<Vec<f32>>,
}

impl RateConverter {
    /// # Errors
    /// `VadError::Configuration` for a zero rate, `VadError::AudioDevice` if
    /// rubato rejects the ratio.
    pub fn new(input_rate: u32, output_rate: u32, chunk_size: usize) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            return Err(VadError::config(format!(
                "cannot resample {input_rate} Hz to {output_rate} Hz"
            )));
        }
        let chunk_size = chunk_size.max(1);

        if input_rate == output_rate {
            return Ok(Self {
                resampler: None,
                input_buf: Vec::new(),
                chunk_size,
                ratio: 1.0,
                output_buf: Vec::new(),
            });
        }

        let ratio = output_rate as f64 / input_rate as f64;
        let resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0, // fixed ratio
            PolynomialDegree::Cubic,
            chunk_size,
            1, // mono
        )
        .map_err(|e| VadError::AudioDevice(format!("resampler init: {e}")))?;

        let max_out = resampler.output_frames_max();
        info!(input_rate, output_rate, chunk_size, max_out, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            input_buf: Vec::with_capacity(chunk_size * 2),
            chunk_size,
            ratio,
            output_buf: vec![vec![0f32; max_out]; 1],
        })
    }

    /// Resample `samples`, returning whatever output is ready (possibly none).
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.input_buf.extend_from_slice(samples);
        let mut out = Vec::new();
        let mut consumed = 0;

        while self.input_buf.len() - consumed >= self.chunk_size {
            let block = &self.input_buf[consumed..consumed + self.chunk_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_, produced)) => out.extend_from_slice(&self.output_buf[0][..produced]),
                Err(e) => warn!("resampler process error: {e}"),
            }
            consumed += self.chunk_size;
        }

        self.input_buf.drain(..consumed);
        out
    }

    /// Push the buffered remainder through (zero-padded), for end of stream.
    pub fn flush(&mut self) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Vec::new();
        };
        if self.input_buf.is_empty() {
            return Vec::new();
        }

        let tail = std::mem::take(&mut self.input_buf);
        // Rubato zero-pads the block; keep only the part that maps to real input.
        let expected = (tail.len() as f64 * self.ratio).ceil() as usize;
        let input: [&[f32]; 1] = [tail.as_slice()];
        match resampler.process_partial_into_buffer(Some(&input[..]), &mut self.output_buf, None) {
            Ok((_, produced)) => self.output_buf[0][..produced.min(expected)].to_vec(),
            Err(e) => {
                warn!("resampler flush error: {e}");
                Vec::new()
            }
        }
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }
}
