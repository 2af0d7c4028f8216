//! Progress tracking for one encoder job
//!
//! Maps encoder elapsed time to completed segments and owns the startup
//! gate of the job. The tracker never touches the registry; it hands
//! [`ProgressUpdate`]s to the orchestrator, which applies and publishes them.

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{HlsError, Result};
use crate::segment::SegmentPlan;

/// Segments newly completed by a job
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// New exclusive end of the completed range
    pub end_segment: u32,
    /// Every index that became complete, in ascending order
    pub completed: Vec<u32>,
}

/// Startup gate, resolved once with the outcome of the buffer wait
pub type StartupGate = oneshot::Receiver<Result<()>>;

pub struct ProgressTracker {
    plan: SegmentPlan,
    start_segment: u32,
    start_time_secs: f64,
    min_buffered_segments: u32,
    end_segment: u32,
    gate: Option<oneshot::Sender<Result<()>>>,
}

impl ProgressTracker {
    /// Tracker for a job that began writing `start_segment` at
    /// `start_time_secs` in the source
    pub fn new(
        plan: SegmentPlan,
        start_segment: u32,
        start_time_secs: f64,
        min_buffered_segments: u32,
    ) -> (Self, StartupGate) {
        let (tx, rx) = oneshot::channel();
        let tracker = Self {
            plan,
            start_segment,
            start_time_secs,
            min_buffered_segments,
            end_segment: start_segment,
            gate: Some(tx),
        };
        (tracker, rx)
    }

    /// Handle one elapsed-time tick.
    ///
    /// The encoder clock starts at zero at the input seek point, so the
    /// source position is `start_time + elapsed`. Jumps of several segments
    /// report every skipped index.
    pub fn on_progress(&mut self, elapsed_secs: f64) -> Option<ProgressUpdate> {
        if !(elapsed_secs > 0.0) {
            return None;
        }
        let position = self.start_time_secs + elapsed_secs;
        let completed = self.plan.completed_segment_for(position);
        debug!(
            "Progress tick elapsed={:.3} position={:.3} completed={}",
            elapsed_secs, position, completed
        );
        self.advance_to(completed)
    }

    /// Handle a clean encoder exit: everything up to the end is written
    pub fn on_finished(&mut self) -> Option<ProgressUpdate> {
        self.advance_to(self.plan.segment_count)
    }

    fn advance_to(&mut self, completed: u32) -> Option<ProgressUpdate> {
        let completed = completed.min(self.plan.segment_count);
        if completed <= self.end_segment {
            return None;
        }
        let update = ProgressUpdate {
            end_segment: completed,
            completed: (self.end_segment..completed).collect(),
        };
        self.end_segment = completed;
        Some(update)
    }

    /// Whether the startup buffer is satisfied
    pub fn is_buffered(&self) -> bool {
        self.end_segment - self.start_segment >= self.min_buffered_segments
            || self.end_segment >= self.plan.segment_count
    }

    pub fn gate_pending(&self) -> bool {
        self.gate.is_some()
    }

    /// Release the gate with success if the buffer is satisfied
    pub fn release_if_buffered(&mut self) {
        if self.is_buffered() {
            self.release(Ok(()));
        }
    }

    /// Resolve the gate with `outcome` unless it was already resolved.
    /// Returns whether this call resolved it.
    pub fn release(&mut self, outcome: Result<()>) -> bool {
        match self.gate.take() {
            Some(tx) => {
                // The caller may have gone away
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }
}

/// Wait on a startup gate; a gate dropped without an outcome means the
/// job ended before buffering
pub async fn wait_for_gate(gate: StartupGate) -> Result<()> {
    match gate.await {
        Ok(outcome) => outcome,
        Err(_) => Err(HlsError::EncoderLaunch(
            "encoder ended before the startup buffer was ready".to_string(),
        )),
    }
}
