//! Frame classification and smoothing.
//!
//! The `FrameClassifier` trait is the extensibility point: swap `EnergyClassifier`
//! for `WebRtcClassifier`, or any future model, without touching the pipeline.
//! Raw per-frame decisions are then debounced by [`smoothing::StateSmoother`].

pub mod energy;
pub mod smoothing;

#[cfg(feature = "vad-earshot")]
pub mod webrtc;

pub use energy::EnergyClassifier;
pub use smoothing::{SmoothedState, SpeechState, StateSmoother};

#[cfg(feature = "vad-earshot")]
pub use webrtc::WebRtcClassifier;

use crate::buffering::frame::Frame;
use crate::config::{ClassifierKind, VadConfig};
use crate::error::Result;

/// Per-frame classification result. Ephemeral: consumed by the smoother.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub is_speech: bool,
    /// RMS energy or classifier confidence, for display.
    pub score: f32,
}

impl Decision {
    pub fn speech(score: f32) -> Self {
        Self {
            is_speech: true,
            score,
        }
    }

    pub fn silence(score: f32) -> Self {
        Self {
            is_speech: false,
            score,
        }
    }
}

/// Trait for all frame classifiers.
///
/// Frames handed to `classify` always have the pipeline's configured length.
/// Smoothing across frames is the pipeline's job, so implementations return the
/// raw decision for each frame. Black-box backends (the WebRTC detector) may
/// keep internal adaptive state between frames; they clear it in `reset`.
pub trait FrameClassifier: Send + 'static {
    /// Classify one frame.
    ///
    /// # Errors
    /// Returns `VadError::Classifier` if the backend rejects the frame.
    fn classify(&mut self, frame: &Frame) -> Result<Decision>;

    /// Reset backend state between sessions. No-op by default.
    fn reset(&mut self) {}

    fn name(&self) -> &'static str;
}

/// Build the classifier selected by `config.classifier`.
pub fn build_classifier(config: &VadConfig) -> Result<Box<dyn FrameClassifier>> {
    match config.classifier {
        ClassifierKind::Energy => Ok(Box::new(EnergyClassifier::new(config.energy_threshold))),
        #[cfg(feature = "vad-earshot")]
        ClassifierKind::Webrtc => Ok(Box::new(WebRtcClassifier::from_config(config)?)),
        #[cfg(not(feature = "vad-earshot"))]
        ClassifierKind::Webrtc => Err(crate::error::VadError::config(
            "webrtc classifier requires the 'vad-earshot' feature",
        )),
    }
}

/// Root-mean-square of a sample slice. Zero for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}
