//! Aggressiveness-leveled classifier backed by `earshot`, a pure-Rust port of
//! the WebRTC voice activity detector.
//!
//! The detector is treated as a black box: the frame is converted to i16 PCM,
//! handed to `predict_16khz`, and its boolean is trusted as-is. The decision
//! score is the frame RMS, computed separately for visualization.
//!
//! | level | earshot profile |
//! |-------|-----------------|
//! | 0 | `QUALITY` |
//! | 1 | `LBR` |
//! | 2 | `AGGRESSIVE` |
//! | 3 | `VERY_AGGRESSIVE` |

use earshot::{VoiceActivityDetector, VoiceActivityProfile};
use tracing::debug;

use super::{rms, Decision, FrameClassifier};
use crate::buffering::frame::Frame;
use crate::config::{VadConfig, MAX_AGGRESSIVENESS, WEBRTC_FRAME_DURATIONS_MS, WEBRTC_SAMPLE_RATE};
use crate::error::{Result, VadError};

pub struct WebRtcClassifier {
    detector: VoiceActivityDetector,
    aggressiveness: u8,
    frame_len: usize,
    scratch: Vec<i16>,
}

impl WebRtcClassifier {
    /// Build a classifier for 16 kHz frames of `frame_duration_ms` (10, 20 or 30).
    ///
    /// # Errors
    /// `VadError::Configuration` for an unsupported level or frame duration.
    pub fn new(aggressiveness: u8, frame_duration_ms: u32) -> Result<Self> {
        if !WEBRTC_FRAME_DURATIONS_MS.contains(&frame_duration_ms) {
            return Err(VadError::config(format!(
                "webrtc classifier requires a frame of 10, 20 or 30 ms, got {frame_duration_ms}"
            )));
        }
        let profile = profile_for(aggressiveness)?;
        let frame_len = (WEBRTC_SAMPLE_RATE * frame_duration_ms / 1000) as usize;
        debug!(aggressiveness, frame_len, "webrtc classifier ready");
        Ok(Self {
            detector: VoiceActivityDetector::new(profile),
            aggressiveness,
            frame_len,
            scratch: Vec::with_capacity(frame_len),
        })
    }

    pub fn from_config(config: &VadConfig) -> Result<Self> {
        if config.sample_rate != WEBRTC_SAMPLE_RATE {
            return Err(VadError::config(format!(
                "webrtc classifier requires {WEBRTC_SAMPLE_RATE} Hz, got {}",
                config.sample_rate
            )));
        }
        Self::new(config.aggressiveness, config.frame_duration_ms)
    }

    pub fn aggressiveness(&self) -> u8 {
        self.aggressiveness
    }
}

fn profile_for(aggressiveness: u8) -> Result<VoiceActivityProfile> {
    match aggressiveness {
        0 => Ok(VoiceActivityProfile::QUALITY),
        1 => Ok(VoiceActivityProfile::LBR),
        2 => Ok(VoiceActivityProfile::AGGRESSIVE),
        3 => Ok(VoiceActivityProfile::VERY_AGGRESSIVE),
        other => Err(VadError::config(format!(
            "aggressiveness {other} outside 0..={MAX_AGGRESSIVENESS}"
        ))),
    }
}

impl FrameClassifier for WebRtcClassifier {
    fn classify(&mut self, frame: &Frame) -> Result<Decision> {
        if frame.len() != self.frame_len {
            return Err(VadError::Classifier(format!(
                "frame {} has {} samples, webrtc classifier expects {}",
                frame.index,
                frame.len(),
                self.frame_len
            )));
        }

        self.scratch.clear();
        self.scratch
            .extend(frame.samples.iter().map(|s| (s.clamp(-1.0, 1.0) * 32_767.0) as i16));

        let is_speech = self.detector.predict_16khz(&self.scratch).map_err(|_| {
            VadError::Classifier(format!("webrtc detector rejected frame {}", frame.index))
        })?;

        Ok(Decision {
            is_speech,
            score: rms(&frame.samples),
        })
    }

    fn reset(&mut self) {
        self.detector.reset();
    }

    fn name(&self) -> &'static str {
        "webrtc"
    }
}
