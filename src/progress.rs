//! Progress-callback trait for stage-boundary pipeline events.
//!
//! Inject an [`Arc<dyn StageProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress`] to receive an event at
//! every stage boundary as the pipeline runs.
//!
//! # Why callbacks instead of channels?
//!
//! The callback approach is the least-invasive integration point: callers can
//! forward events to a Tokio broadcast channel, a WebSocket, a job-queue
//! status record, or a terminal progress bar — without the library knowing
//! anything about how the host application communicates. The trait is
//! `Send + Sync` so the same callback can outlive an `tokio::spawn`ed run.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single stage-boundary event.
///
/// `progress` is a percentage milestone in `0..=100`, or `-1` when the run
/// has failed and is about to return an error. The milestone sequence for a
/// successful run is fixed (0, 5, 10, 20, 40, 60, 80, 100) so external
/// listeners can key UI states off exact values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Percentage milestone, or -1 on failure.
    pub progress: i32,
    /// Human-readable description of what just started or finished.
    pub status: String,
}

impl ProgressEvent {
    pub fn new(progress: i32, status: impl Into<String>) -> Self {
        Self {
            progress,
            status: status.into(),
        }
    }

    /// The terminal event emitted when a stage fails fatally.
    pub fn failed(status: impl Into<String>) -> Self {
        Self::new(-1, status)
    }
}

/// Called by the pipeline at each stage boundary.
///
/// Implementations must be `Send + Sync`. Events arrive strictly in milestone
/// order from a single task; no synchronisation beyond `Send + Sync` is
/// needed.
pub trait StageProgressCallback: Send + Sync {
    /// Called with each milestone event, including the terminal `-1` on
    /// failure.
    fn on_progress(&self, event: &ProgressEvent) {
        let _ = event;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopStageProgress;

impl StageProgressCallback for NoopStageProgress {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn StageProgressCallback>;
