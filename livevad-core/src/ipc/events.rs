//! Events broadcast by the pipeline and engine.
//!
//! | Event | Emitted |
//! |-------|---------|
//! | `SpeechStateEvent` | on every smoothed SILENT ↔ SPEECH transition |
//! | `VadActivityEvent` | once per classified frame (raw decision) |
//! | `EngineStatusEvent` | on engine lifecycle changes |
//!
//! Broadcasting is lossy: a lagging subscriber misses events, the producer never waits.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Speech state events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechStateEvent {
    /// Monotonically increasing transition sequence number.
    pub seq: u64,
    /// New smoothed state.
    pub is_speech: bool,
    /// Frame whose decision completed the transition.
    pub frame_index: u64,
    /// Stream position of that frame's end, in milliseconds.
    pub stream_offset_ms: u64,
}

// ---------------------------------------------------------------------------
// Activity events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VadActivityEvent {
    /// Monotonically increasing frame sequence number.
    pub seq: u64,
    /// Classifier score (RMS level for the energy classifier).
    pub score: f32,
    /// Raw, unsmoothed decision for the frame.
    pub is_speech: bool,
}

// ---------------------------------------------------------------------------
// Engine status events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    /// Optional human-readable detail (e.g. error message).
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Created, capture not started.
    Idle,
    /// Capture thread running, frames flowing.
    Listening,
    /// Stopped by request or because the source ran out.
    Stopped,
    /// Capture or classification failed; `start` again to retry.
    Error,
}
