//! Event types broadcast to subscribers.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them as JSON (to a UI, a log sink, a socket) without re-mapping.

pub mod events;
