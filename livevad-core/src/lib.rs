//! # livevad-core
//!
//! Live voice activity detection for a continuous audio stream.
//!
//! ## Architecture
//!
//! ```text
//! Microphone / WAV → CaptureSource ─► VadPipeline::ingest (capture thread)
//!                                          │
//!                                  FrameBuffer → fixed-length frames
//!                                          │
//!                                  FrameClassifier (energy | webrtc)
//!                                          │
//!                                  StateSmoother (hold_frames hysteresis)
//!                                          │
//!                           SnapshotSlot ──► SnapshotReader::read_latest (any thread)
//!                                          └► broadcast::Sender<SpeechStateEvent>
//! ```
//!
//! The cpal callback only pushes into a lock-free ring. Framing,
//! classification and publishing happen on the capture thread; readers never
//! block it for longer than a pointer swap.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod config;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod vad;

// Convenience re-exports for downstream crates
pub use audio::{CaptureSource, MemorySource, WavSource};
pub use buffering::{Frame, FrameBuffer};
pub use config::{ClassifierKind, VadConfig};
pub use engine::{
    pipeline::CaptureExit, DiagnosticsSnapshot, PublishedSnapshot, SnapshotReader, VadEngine,
    VadPipeline,
};
pub use error::{Result, VadError};
pub use ipc::events::{EngineStatus, EngineStatusEvent, SpeechStateEvent, VadActivityEvent};
pub use vad::{Decision, EnergyClassifier, FrameClassifier, SmoothedState, StateSmoother};

#[cfg(feature = "audio-cpal")]
pub use audio::MicrophoneSource;

#[cfg(feature = "vad-earshot")]
pub use vad::WebRtcClassifier;
