//! Energy-threshold classifier.
//!
//! ## Algorithm
//!
//! 1. Compute the RMS of the frame.
//! 2. If RMS > `threshold` → speech, otherwise silence.
//!
//! Stateless and O(frame length). The RMS is reported as the decision score.

use super::{rms, Decision, FrameClassifier};
use crate::buffering::frame::Frame;
use crate::error::Result;

/// Default RMS threshold in normalized amplitude.
pub const DEFAULT_ENERGY_THRESHOLD: f32 = 0.015;

#[derive(Debug, Clone)]
pub struct EnergyClassifier {
    /// RMS amplitude threshold. Frames strictly above this are speech.
    /// Typical range: 0.01–0.05 for a quiet microphone.
    threshold: f32,
}

impl EnergyClassifier {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_ENERGY_THRESHOLD)
    }
}

impl FrameClassifier for EnergyClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Decision> {
        let score = rms(&frame.samples);
        Ok(Decision {
            is_speech: score > self.threshold,
            score,
        })
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}
