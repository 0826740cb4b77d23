use thiserror::Error;

/// All errors produced by livevad-core.
#[derive(Debug, Error)]
pub enum VadError {
    /// Invalid sample rate, frame duration, threshold or level. Fatal at construction.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Capture-side failure (overflow, disconnect, stream error).
    #[error("capture error: {0}")]
    Capture(String),

    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    /// The frame classifier rejected a frame.
    #[error("classifier error: {0}")]
    Classifier(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VadError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        VadError::Configuration(msg.into())
    }

    /// `true` for errors raised by the capture collaborator rather than the core.
    pub fn is_capture(&self) -> bool {
        matches!(
            self,
            VadError::Capture(_) | VadError::AudioDevice(_) | VadError::NoDefaultInputDevice
        )
    }
}

pub type Result<T> = std::result::Result<T, VadError>;
