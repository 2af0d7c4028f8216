//! Transcode session state

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::segment::{SegmentContainer, SegmentPlan};

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// One active or cached encode, keyed by token.
///
/// `start_segment..end_segment` is the range the current encoder run has
/// completed so far; `end_segment` is exclusive.
#[derive(Debug)]
pub struct TranscodeSession {
    pub token: String,
    /// Source identifier, also the segment file name stem
    pub media_ref_id: String,
    pub media_path: PathBuf,
    pub output_dir: PathBuf,
    pub plan: SegmentPlan,
    pub container: SegmentContainer,
    pub min_buffered_segments: u32,
    pub start_segment: u32,
    pub end_segment: u32,
    /// Segments known to be fully written, from disk or from progress
    pub transcoded_segments: BTreeSet<u32>,
    pub encoder_command_description: String,
    /// Id of the encoder job currently writing for this token
    pub active_job: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub last_accessed: AtomicU64,
}

impl Clone for TranscodeSession {
    fn clone(&self) -> Self {
        Self {
            token: self.token.clone(),
            media_ref_id: self.media_ref_id.clone(),
            media_path: self.media_path.clone(),
            output_dir: self.output_dir.clone(),
            plan: self.plan,
            container: self.container,
            min_buffered_segments: self.min_buffered_segments,
            start_segment: self.start_segment,
            end_segment: self.end_segment,
            transcoded_segments: self.transcoded_segments.clone(),
            encoder_command_description: self.encoder_command_description.clone(),
            active_job: self.active_job,
            created_at: self.created_at,
            last_accessed: AtomicU64::new(self.last_accessed.load(Ordering::Relaxed)),
        }
    }
}

impl TranscodeSession {
    /// Create a session with no job attached
    pub fn new(
        token: impl Into<String>,
        media_ref_id: impl Into<String>,
        media_path: PathBuf,
        output_dir: PathBuf,
        plan: SegmentPlan,
        container: SegmentContainer,
        min_buffered_segments: u32,
    ) -> Self {
        Self {
            token: token.into(),
            media_ref_id: media_ref_id.into(),
            media_path,
            output_dir,
            plan,
            container,
            min_buffered_segments,
            start_segment: 0,
            end_segment: 0,
            transcoded_segments: BTreeSet::new(),
            encoder_command_description: String::new(),
            active_job: None,
            created_at: Utc::now(),
            last_accessed: AtomicU64::new(now_secs()),
        }
    }

    pub fn segment_count(&self) -> u32 {
        self.plan.segment_count
    }

    pub fn job_active(&self) -> bool {
        self.active_job.is_some()
    }

    pub fn has_segment(&self, index: u32) -> bool {
        self.transcoded_segments.contains(&index)
    }

    /// Last segment index worth waiting for rather than restarting
    pub fn max_acceptable_segment(&self) -> u32 {
        self.end_segment
            .saturating_add(2 * self.min_buffered_segments)
            .min(self.segment_count())
    }

    /// Whether `index` lies in the lookahead window of the current run
    pub fn lookahead_contains(&self, index: u32) -> bool {
        index >= self.start_segment && index <= self.max_acceptable_segment()
    }

    /// Whether the current run has written its startup lead
    pub fn startup_buffered(&self) -> bool {
        self.end_segment.saturating_sub(self.start_segment) >= self.min_buffered_segments
            || self.end_segment >= self.segment_count()
    }

    /// Update last accessed time to now
    pub fn touch(&self) {
        self.last_accessed.store(now_secs(), Ordering::Relaxed);
    }

    /// Get seconds since last access
    pub fn time_since_last_access(&self) -> u64 {
        now_secs().saturating_sub(self.last_accessed.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            token: self.token.clone(),
            media_ref_id: self.media_ref_id.clone(),
            output_dir: self.output_dir.clone(),
            runtime_secs: self.plan.runtime_secs,
            segment_length_secs: self.plan.segment_length_secs,
            segment_count: self.plan.segment_count,
            start_segment: self.start_segment,
            end_segment: self.end_segment,
            transcoded_segments: self.transcoded_segments.len(),
            job_active: self.job_active(),
            encoder_command: self.encoder_command_description.clone(),
            created_at: self.created_at,
            idle_secs: self.time_since_last_access(),
        }
    }
}

/// Serializable view of a session for the debug endpoints
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub token: String,
    pub media_ref_id: String,
    pub output_dir: PathBuf,
    pub runtime_secs: f64,
    pub segment_length_secs: u32,
    pub segment_count: u32,
    pub start_segment: u32,
    pub end_segment: u32,
    pub transcoded_segments: usize,
    pub job_active: bool,
    pub encoder_command: String,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
}
