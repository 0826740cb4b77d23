//! Latest-value handoff between the capture thread and readers.
//!
//! The producer builds a complete `PublishedSnapshot`, wraps it in an `Arc`,
//! and swaps the pointer into the slot under a write lock held only for the
//! swap. Readers clone the `Arc` under a read lock. A reader therefore sees a
//! whole snapshot or the previous whole snapshot, never a mix of the two.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// What consumers observe. Superseded by the next frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedSnapshot {
    /// Publish sequence number, starting at 0 and increasing by one per frame.
    pub seq: u64,
    /// Smoothed speech state.
    pub is_speech: bool,
    /// Raw classifier decision for the frame.
    pub raw_is_speech: bool,
    /// Classifier score (RMS or confidence) for the frame.
    pub score: f32,
    pub consecutive_count: u32,
    pub frame_index: u64,
    /// Position of the frame's end in the input stream.
    pub stream_offset: Duration,
    /// Bounded copy of the most recent frame.
    pub last_frame_samples: Vec<f32>,
    pub published_at: Instant,
}

/// Single-writer, multi-reader slot holding the latest snapshot.
#[derive(Debug, Default)]
pub struct SnapshotSlot {
    latest: RwLock<Option<Arc<PublishedSnapshot>>>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, snapshot: PublishedSnapshot) {
        let next = Arc::new(snapshot);
        let previous = std::mem::replace(&mut *self.latest.write(), Some(next));
        // Drop the old snapshot outside the lock.
        drop(previous);
    }

    /// Latest snapshot, or `None` before the first frame completes.
    pub fn latest(&self) -> Option<Arc<PublishedSnapshot>> {
        self.latest.read().clone()
    }

    pub fn clear(&self) {
        let previous = self.latest.write().take();
        drop(previous);
    }
}

/// Cloneable, `Send + Sync` read handle given to consumers.
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    slot: Arc<SnapshotSlot>,
}

impl SnapshotReader {
    pub fn new(slot: Arc<SnapshotSlot>) -> Self {
        Self { slot }
    }

    /// Non-blocking read of the most recent snapshot.
    pub fn read_latest(&self) -> Option<Arc<PublishedSnapshot>> {
        self.slot.latest()
    }

    /// Smoothed speech state, `false` before any data.
    pub fn is_speech(&self) -> bool {
        self.read_latest().map(|s| s.is_speech).unwrap_or(false)
    }
}

/// Reduce `samples` to at most `max_points`, keeping the peak of each bucket.
///
/// Frames that already fit are copied verbatim.
pub fn summarize_waveform(samples: &[f32], max_points: usize) -> Vec<f32> {
    let max_points = max_points.max(1);
    if samples.len() <= max_points {
        return samples.to_vec();
    }
    (0..max_points)
        .map(|bucket| {
            let start = bucket * samples.len() / max_points;
            let end = ((bucket + 1) * samples.len() / max_points).max(start + 1);
            samples[start..end]
                .iter()
                .copied()
                .fold(0.0f32, |peak, s| if s.abs() > peak.abs() { s } else { peak })
        })
        .collect()
}
