//! Port for mirroring the mission event log.
//!
//! This is separate from `tracing`-based operation logs: tracing carries
//! human-readable diagnostics, while this port receives every appended
//! [`MissionEvent`] in machine-readable form (e.g. JSONL) for audit and
//! replay.

use overmind_domain::MissionEvent;

/// Receives each event after the repository has appended it.
///
/// `record` is synchronous and infallible so a failing sink never disrupts
/// a mission; implementations swallow their own I/O errors.
pub trait MissionEventSink: Send + Sync {
    fn record(&self, event: &MissionEvent);
}

/// No-op implementation for tests and when the event log is disabled.
pub struct NoEventSink;

impl MissionEventSink for NoEventSink {
    fn record(&self, _event: &MissionEvent) {}
}
