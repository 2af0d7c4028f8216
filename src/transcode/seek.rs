//! Seek coordination
//!
//! Decides, for a requested segment, whether it can be served now, whether
//! the running job will reach it soon enough to wait, or whether the encode
//! has to be restarted at the segment.

use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use super::orchestrator::TranscodeOrchestrator;
use crate::error::{HlsError, Result};

/// Restarts a single request may trigger before giving up
const MAX_RESTARTS: u32 = 3;

/// How a segment request was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    /// The segment was already written
    Ready,
    /// The running job produced it while we waited
    Waited,
    /// The encode was restarted to produce it
    Restarted,
}

#[derive(Clone)]
pub struct SeekCoordinator {
    orchestrator: Arc<TranscodeOrchestrator>,
}

impl SeekCoordinator {
    pub fn new(orchestrator: Arc<TranscodeOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Return once segment `index` of `token` is written.
    ///
    /// Dropping the returned future drops its subscription, so a client
    /// that disconnects while waiting leaves nothing behind.
    pub async fn set_segment_target(&self, token: &str, index: u32) -> Result<SeekOutcome> {
        let mut waited = false;
        let mut restarts = 0;

        loop {
            // Subscribe before looking so no update slips in between
            let mut updates = self
                .orchestrator
                .subscribe(token)
                .ok_or_else(|| HlsError::SessionNotFound(token.to_string()))?;
            let session = self
                .orchestrator
                .session(token)
                .ok_or_else(|| HlsError::SessionNotFound(token.to_string()))?;

            if index >= session.segment_count() {
                return Err(HlsError::SegmentNotFound {
                    token: token.to_string(),
                    sequence: index,
                });
            }

            if session.has_segment(index) {
                return Ok(match (restarts, waited) {
                    (0, false) => SeekOutcome::Ready,
                    (0, true) => SeekOutcome::Waited,
                    _ => SeekOutcome::Restarted,
                });
            }

            if session.job_active() && session.lookahead_contains(index) {
                debug!(
                    "Waiting for segment {} of {} (encoded {}..{})",
                    index, token, session.start_segment, session.end_segment
                );
                waited = true;
                loop {
                    match updates.recv().await {
                        Ok(update) => {
                            if update.has_segment(index)
                                || !update.job_active()
                                || !update.lookahead_contains(index)
                            {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            debug!("Seek waiter for {} lagged by {} update(s)", token, skipped);
                            break;
                        }
                        Err(RecvError::Closed) => {
                            return Err(HlsError::SessionNotFound(token.to_string()));
                        }
                    }
                }
                continue;
            }

            if restarts >= MAX_RESTARTS {
                return Err(HlsError::EncoderProcess(format!(
                    "segment {} of {} still missing after {} restarts",
                    index, token, restarts
                )));
            }

            info!(
                "Segment {} of {} outside encoded range {}..{}, restarting",
                index, token, session.start_segment, session.end_segment
            );
            self.orchestrator.retarget(token, index).await?;
            restarts += 1;
        }
    }
}
