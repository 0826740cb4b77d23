//! The capture collaborator interface.

use std::collections::VecDeque;

use crate::error::Result;

/// A blocking source of mono f32 PCM chunks at a fixed sample rate.
///
/// `read` may block, but only for a bounded time so the engine can notice a
/// stop request between reads. Chunk length is arbitrary and may be zero.
pub trait CaptureSource {
    /// Rate of the samples returned by `read`, in Hz.
    fn sample_rate(&self) -> u32;

    /// Next chunk of samples.
    ///
    /// - `Ok(Some(chunk))`: samples (possibly none yet).
    /// - `Ok(None)`: the source is exhausted and will produce nothing more.
    ///
    /// # Errors
    /// `VadError::Capture` on device failure. Never retried by the caller.
    fn read(&mut self) -> Result<Option<Vec<f32>>>;

    fn name(&self) -> &str {
        "capture"
    }
}

/// Replays pre-recorded chunks, then reports exhaustion.
#[derive(Debug, Clone)]
pub struct MemorySource {
    sample_rate: u32,
    chunks: VecDeque<Vec<f32>>,
}

impl MemorySource {
    pub fn new(sample_rate: u32, chunks: impl IntoIterator<Item = Vec<f32>>) -> Self {
        Self {
            sample_rate,
            chunks: chunks.into_iter().collect(),
        }
    }

    /// Split `samples` into chunks of `chunk_len` (the last one may be shorter).
    pub fn from_samples(sample_rate: u32, samples: &[f32], chunk_len: usize) -> Self {
        Self::new(
            sample_rate,
            samples.chunks(chunk_len.max(1)).map(<[f32]>::to_vec),
        )
    }

    pub fn remaining_chunks(&self) -> usize {
        self.chunks.len()
    }
}

impl CaptureSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self) -> Result<Option<Vec<f32>>> {
        Ok(self.chunks.pop_front())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_source_replays_then_exhausts() {
        let mut source = MemorySource::from_samples(16_000, &[0.0; 10], 4);
        assert_eq!(source.remaining_chunks(), 3);
        assert_eq!(source.read().unwrap().map(|c| c.len()), Some(4));
        assert_eq!(source.read().unwrap().map(|c| c.len()), Some(4));
        assert_eq!(source.read().unwrap().map(|c| c.len()), Some(2));
        assert!(source.read().unwrap().is_none());
    }
}
