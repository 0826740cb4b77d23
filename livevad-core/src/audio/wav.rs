//! WAV file capture source.
//!
//! Decodes the whole file up front (any channel count, 8–32 bit integer or
//! 32 bit float), downmixes to mono, converts to the pipeline rate, then hands
//! the audio out in fixed-size chunks. With pacing enabled, `read` sleeps for
//! each chunk's duration so the file replays in real time like a microphone.

use std::path::Path;
use std::thread;
use std::time::Duration;

use hound::{SampleFormat, WavReader};
use tracing::info;

use super::{capture::CaptureSource, downmix_into, resample::RateConverter};
use super::resample::DEFAULT_RESAMPLE_CHUNK;
use crate::error::{Result, VadError};

/// Samples per `read` when not configured (64 ms at 16 kHz).
pub const DEFAULT_WAV_CHUNK: usize = 1024;

pub struct WavSource {
    samples: Vec<f32>,
    position: usize,
    chunk_len: usize,
    sample_rate: u32,
    paced: bool,
    name: String,
}

impl WavSource {
    /// Open `path` and convert it to mono f32 at `target_rate`.
    ///
    /// # Errors
    /// `VadError::Wav` if the file cannot be decoded.
    pub fn open(path: impl AsRef<Path>, target_rate: u32) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(VadError::Capture(format!(
                "{} declares {} channels at {} Hz",
                path.display(),
                spec.channels,
                spec.sample_rate
            )));
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()?,
            SampleFormat::Int => {
                let scale = (1u64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };

        let mut mono = Vec::with_capacity(interleaved.len() / spec.channels as usize);
        downmix_into(&interleaved, spec.channels as usize, |s| s, &mut mono);

        let mut converter = RateConverter::new(spec.sample_rate, target_rate, DEFAULT_RESAMPLE_CHUNK)?;
        let mut samples = converter.process(&mono);
        samples.extend(converter.flush());

        info!(
            path = %path.display(),
            channels = spec.channels,
            file_rate = spec.sample_rate,
            target_rate,
            samples = samples.len(),
            "opened WAV source"
        );

        Ok(Self {
            samples,
            position: 0,
            chunk_len: DEFAULT_WAV_CHUNK,
            sample_rate: target_rate,
            paced: false,
            name: path.display().to_string(),
        })
    }

    pub fn with_chunk_len(mut self, chunk_len: usize) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    /// Sleep for each chunk's duration, replaying in real time.
    pub fn paced(mut self, paced: bool) -> Self {
        self.paced = paced;
        self
    }

    /// Total decoded samples at the target rate.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }
}

impl CaptureSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }
        let end = (self.position + self.chunk_len).min(self.samples.len());
        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        if self.paced {
            thread::sleep(Duration::from_secs_f64(
                chunk.len() as f64 / self.sample_rate as f64,
            ));
        }
        Ok(Some(chunk))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
