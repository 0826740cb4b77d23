//! Pipeline configuration.
//!
//! `VadConfig` is a plain serde struct with defaults for every field, so a JSON
//! file only needs to name the options it changes. Validation is separate from
//! deserialization: `VadPipeline::new` and `VadEngine::new` call
//! [`VadConfig::validate`] and refuse to build on any violation.

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Result, VadError};

/// Sample rate the WebRTC classifier operates at (Hz).
pub const WEBRTC_SAMPLE_RATE: u32 = 16_000;

/// Highest accepted sample rate (Hz).
pub const MAX_SAMPLE_RATE: u32 = 384_000;

/// Longest accepted frame (ms).
pub const MAX_FRAME_DURATION_MS: u32 = 1_000;

/// Frame durations the WebRTC classifier accepts (ms).
pub const WEBRTC_FRAME_DURATIONS_MS: [u32; 3] = [10, 20, 30];

/// Highest accepted aggressiveness level.
pub const MAX_AGGRESSIVENESS: u8 = 3;

/// Which frame classifier the pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    /// RMS energy compared against `energy_threshold`.
    #[default]
    Energy,
    /// WebRTC VAD port parameterized by `aggressiveness`.
    Webrtc,
}

impl ClassifierKind {
    pub fn label(self) -> &'static str {
        match self {
            ClassifierKind::Energy => "energy",
            ClassifierKind::Webrtc => "webrtc",
        }
    }
}

impl FromStr for ClassifierKind {
    type Err = VadError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "energy" | "rms" => Ok(ClassifierKind::Energy),
            "webrtc" | "earshot" => Ok(ClassifierKind::Webrtc),
            other => Err(VadError::config(format!("unknown classifier '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct VadConfig {
    /// Input sample rate in Hz. Fixed for the lifetime of a pipeline.
    pub sample_rate: u32,
    /// Duration of one classification frame in milliseconds.
    pub frame_duration_ms: u32,
    /// RMS level above which the energy classifier reports speech.
    pub energy_threshold: f32,
    /// WebRTC classifier level, 0 (least) to 3 (most aggressive).
    pub aggressiveness: u8,
    /// Consecutive agreeing frames required to flip the smoothed state.
    pub hold_frames: u32,
    pub classifier: ClassifierKind,
    /// Maximum number of points in the published waveform.
    pub waveform_points: usize,
    /// Microphone name to prefer over the system default.
    pub preferred_input_device: Option<String>,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_duration_ms: 30,
            energy_threshold: 0.015,
            aggressiveness: 3,
            hold_frames: 3,
            classifier: ClassifierKind::Energy,
            waveform_points: 480,
            preferred_input_device: None,
        }
    }
}

impl VadConfig {
    /// Samples per frame: `sample_rate * frame_duration_ms / 1000`.
    pub fn frame_len(&self) -> usize {
        (self.sample_rate as u64 * self.frame_duration_ms as u64 / 1000) as usize
    }

    /// Check every option, returning the first violation found.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(VadError::config(format!(
                "sample rate {} outside 1..={MAX_SAMPLE_RATE} Hz",
                self.sample_rate
            )));
        }
        if self.frame_duration_ms == 0 || self.frame_duration_ms > MAX_FRAME_DURATION_MS {
            return Err(VadError::config(format!(
                "frame duration {} outside 1..={MAX_FRAME_DURATION_MS} ms",
                self.frame_duration_ms
            )));
        }
        if self.frame_len() == 0 {
            return Err(VadError::config(format!(
                "frame of {} ms at {} Hz contains no samples",
                self.frame_duration_ms, self.sample_rate
            )));
        }
        if !self.energy_threshold.is_finite()
            || self.energy_threshold <= 0.0
            || self.energy_threshold > 1.0
        {
            return Err(VadError::config(format!(
                "energy threshold {} outside (0, 1]",
                self.energy_threshold
            )));
        }
        if self.aggressiveness > MAX_AGGRESSIVENESS {
            return Err(VadError::config(format!(
                "aggressiveness {} outside 0..={MAX_AGGRESSIVENESS}",
                self.aggressiveness
            )));
        }
        if self.hold_frames == 0 {
            return Err(VadError::config("hold_frames must be at least 1"));
        }
        if self.waveform_points == 0 {
            return Err(VadError::config("waveform_points must be at least 1"));
        }
        if self.classifier == ClassifierKind::Webrtc {
            if self.sample_rate != WEBRTC_SAMPLE_RATE {
                return Err(VadError::config(format!(
                    "webrtc classifier requires {WEBRTC_SAMPLE_RATE} Hz, got {}",
                    self.sample_rate
                )));
            }
            if !WEBRTC_FRAME_DURATIONS_MS.contains(&self.frame_duration_ms) {
                return Err(VadError::config(format!(
                    "webrtc classifier requires a frame of 10, 20 or 30 ms, got {}",
                    self.frame_duration_ms
                )));
            }
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        info!(path = %path.display(), "loaded VAD config");
        Ok(config)
    }

    /// Apply `LIVEVAD_*` environment overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup. Unparseable values are logged and skipped.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(key, value = %raw, "ignoring unparseable override");
                    None
                }
            }
        }

        if let Some(v) = parsed(&lookup, "LIVEVAD_SAMPLE_RATE") {
            self.sample_rate = v;
        }
        if let Some(v) = parsed(&lookup, "LIVEVAD_FRAME_MS") {
            self.frame_duration_ms = v;
        }
        if let Some(v) = parsed(&lookup, "LIVEVAD_ENERGY_THRESHOLD") {
            self.energy_threshold = v;
        }
        if let Some(v) = parsed(&lookup, "LIVEVAD_AGGRESSIVENESS") {
            self.aggressiveness = v;
        }
        if let Some(v) = parsed(&lookup, "LIVEVAD_HOLD_FRAMES") {
            self.hold_frames = v;
        }
        if let Some(v) = parsed(&lookup, "LIVEVAD_CLASSIFIER") {
            self.classifier = v;
        }
    }
}
