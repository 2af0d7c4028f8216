//! Transcode orchestrator
//!
//! Owns the session registry and the encoder jobs. Every mutation of a
//! session goes through here: launches, progress updates, job exits and
//! stops. Per token, launches and stops are serialized by an async mutex so
//! an old job is fully reaped before a new one writes into the same output
//! directory.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::encoder::{Encoder, EncoderCommand, EncoderEvent};
use super::progress::{wait_for_gate, ProgressTracker, ProgressUpdate, StartupGate};
use super::session::TranscodeSession;
use crate::config::TranscodeConfig;
use crate::error::{HlsError, Result};
use crate::segment::{plan_segments, segment_file_name, start_segment_for, SegmentProbe};

/// Where a new encode should begin
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StartPosition {
    /// Playback position in seconds; backed off by one segment
    Time(f64),
    /// Exact segment index
    Segment(u32),
}

/// Arguments of [`TranscodeOrchestrator::start_transcode`]
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub token: String,
    pub media_ref_id: String,
    pub media_path: PathBuf,
    pub output_dir: PathBuf,
    pub runtime_secs: f64,
    pub start: StartPosition,
    pub min_buffered_segments: u32,
}

struct JobHandle {
    id: u64,
    cancel: CancellationToken,
    finished: JoinHandle<()>,
}

/// Published session state
pub type SessionUpdate = Arc<TranscodeSession>;

pub struct TranscodeOrchestrator {
    config: TranscodeConfig,
    max_concurrent_sessions: Option<usize>,
    encoder: Arc<dyn Encoder>,
    probe: Arc<dyn SegmentProbe>,
    sessions: DashMap<String, TranscodeSession>,
    jobs: DashMap<String, JobHandle>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    channels: DashMap<String, broadcast::Sender<SessionUpdate>>,
    next_job_id: AtomicU64,
    shutting_down: AtomicBool,
}

impl TranscodeOrchestrator {
    pub fn new(
        config: TranscodeConfig,
        max_concurrent_sessions: Option<usize>,
        encoder: Arc<dyn Encoder>,
        probe: Arc<dyn SegmentProbe>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            max_concurrent_sessions,
            encoder,
            probe,
            sessions: DashMap::new(),
            jobs: DashMap::new(),
            locks: DashMap::new(),
            channels: DashMap::new(),
            next_job_id: AtomicU64::new(1),
            shutting_down: AtomicBool::new(false),
        })
    }

    /// Start (or reuse) the encode for a token and wait for its startup
    /// buffer.
    ///
    /// A token with an active job launches no new process; the caller waits
    /// for that job's startup buffer instead.
    pub async fn start_transcode(self: &Arc<Self>, request: StartRequest) -> Result<TranscodeSession> {
        let lock = self.token_lock(&request.token);
        let guard = lock.lock().await;

        if let Some(session) = self.session(&request.token) {
            if session.job_active() {
                drop(guard);
                debug!("Reusing active job for session {}", request.token);
                return self.wait_for_startup_buffer(&request.token).await;
            }
        }

        let gate = self.launch_locked(&request).await?;
        drop(guard);

        if let Some(gate) = gate {
            wait_for_gate(gate).await?;
        }

        self.session(&request.token)
            .ok_or_else(|| HlsError::SessionNotFound(request.token.clone()))
    }

    /// Restart the encode of an existing session at `segment`, unless the
    /// segment became available or reachable while waiting for the lock
    pub async fn retarget(self: &Arc<Self>, token: &str, segment: u32) -> Result<()> {
        let lock = self.token_lock(token);
        let guard = lock.lock().await;

        let session = self
            .session(token)
            .ok_or_else(|| HlsError::SessionNotFound(token.to_string()))?;

        if session.has_segment(segment) {
            return Ok(());
        }
        if session.job_active() && session.lookahead_contains(segment) {
            debug!(
                "Segment {} of {} already in range of the running job",
                segment, token
            );
            return Ok(());
        }

        info!(
            "Retargeting session {} from segments {}..{} to segment {}",
            token, session.start_segment, session.end_segment, segment
        );

        let request = StartRequest {
            token: token.to_string(),
            media_ref_id: session.media_ref_id.clone(),
            media_path: session.media_path.clone(),
            output_dir: session.output_dir.clone(),
            runtime_secs: session.plan.runtime_secs,
            start: StartPosition::Segment(segment),
            min_buffered_segments: session.min_buffered_segments,
        };
        let gate = self.launch_locked(&request).await?;
        drop(guard);

        match gate {
            Some(gate) => wait_for_gate(gate).await,
            None => Ok(()),
        }
    }

    /// Wait until the running job of `token` has written its startup lead
    async fn wait_for_startup_buffer(&self, token: &str) -> Result<TranscodeSession> {
        loop {
            let mut updates = self
                .subscribe(token)
                .ok_or_else(|| HlsError::SessionNotFound(token.to_string()))?;
            let session = self
                .session(token)
                .ok_or_else(|| HlsError::SessionNotFound(token.to_string()))?;

            if session.startup_buffered() {
                return Ok(session);
            }
            if !session.job_active() {
                return Err(HlsError::EncoderLaunch(format!(
                    "job of session {} exited before its startup buffer filled",
                    token
                )));
            }

            match updates.recv().await {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    return Err(HlsError::SessionNotFound(token.to_string()));
                }
            }
        }
    }

    /// Remove a session, stop its job and optionally delete its output.
    /// Unknown tokens are a no-op.
    pub async fn stop_session(&self, token: &str, delete_output: bool) -> Result<()> {
        let lock = self.token_lock(token);
        let guard = lock.lock().await;

        let session = self.sessions.remove(token).map(|(_, s)| s);
        self.channels.remove(token);
        self.stop_job(token).await;

        if let Some(session) = &session {
            info!(
                "Stopped session {} (delete_output={})",
                token, delete_output
            );
            if delete_output {
                remove_output_dir(&session.output_dir).await?;
            }
        }

        drop(guard);
        drop(lock);
        self.locks
            .remove_if(token, |_, l| Arc::strong_count(l) == 1);
        Ok(())
    }

    /// Stop sessions idle for longer than `idle_timeout_secs`.
    /// Returns the number of stopped sessions.
    pub async fn evict_idle(&self, idle_timeout_secs: u64, delete_output: bool) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().time_since_last_access() > idle_timeout_secs)
            .map(|entry| entry.key().clone())
            .collect();

        let mut count = 0;
        for token in expired {
            match self.stop_session(&token, delete_output).await {
                Ok(()) => count += 1,
                Err(e) => warn!("Failed to evict session {}: {}", token, e),
            }
        }
        count
    }

    /// Cancel every running job, keeping sessions and outputs. No job is
    /// launched afterwards.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let tokens: Vec<String> = self.jobs.iter().map(|e| e.key().clone()).collect();
        info!("Cancelling {} encoder job(s)", tokens.len());
        for token in tokens {
            let lock = self.token_lock(&token);
            let _guard = lock.lock().await;
            self.stop_job(&token).await;
        }
    }

    /// Current state of a session
    pub fn session(&self, token: &str) -> Option<TranscodeSession> {
        self.sessions.get(token).map(|s| s.clone())
    }

    pub fn sessions(&self) -> Vec<TranscodeSession> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Record an access to a session. Returns false for unknown tokens.
    pub fn touch(&self, token: &str) -> bool {
        match self.sessions.get(token) {
            Some(session) => {
                session.touch();
                true
            }
            None => false,
        }
    }

    /// Subscribe to state changes of a session
    pub fn subscribe(&self, token: &str) -> Option<broadcast::Receiver<SessionUpdate>> {
        self.channels.get(token).map(|tx| tx.subscribe())
    }

    pub fn active_job_count(&self) -> usize {
        self.sessions.iter().filter(|e| e.value().job_active()).count()
    }

    fn token_lock(&self, token: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(token.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Cancel the job of a token and wait until its process is reaped
    async fn stop_job(&self, token: &str) {
        if let Some((_, job)) = self.jobs.remove(token) {
            debug!("Cancelling job {} of session {}", job.id, token);
            job.cancel.cancel();
            if let Err(e) = job.finished.await {
                warn!("Job {} of session {} panicked: {}", job.id, token, e);
            }
        }
    }

    /// Launch a job for `request`. The caller holds the token lock.
    ///
    /// Returns the startup gate, or `None` when everything from the
    /// requested point is already on disk and nothing was launched.
    async fn launch_locked(self: &Arc<Self>, request: &StartRequest) -> Result<Option<StartupGate>> {
        let token = request.token.as_str();
        let length = self.config.segment_length_secs;

        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(HlsError::ShuttingDown);
        }
        let container = self.config.segment_container;

        if !tokio::fs::metadata(&request.media_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Err(HlsError::SourceUnavailable(
                request.media_path.display().to_string(),
            ));
        }

        let had_job = self
            .sessions
            .get(token)
            .map(|s| s.job_active())
            .unwrap_or(false);
        if let Some(limit) = self.max_concurrent_sessions {
            let others = self.active_job_count().saturating_sub(usize::from(had_job));
            if others >= limit {
                return Err(HlsError::TooManySessions(limit));
            }
        }

        self.stop_job(token).await;
        let previous = self.session(token);
        if let Some(previous) = &previous {
            discard_partial_segment(previous).await;
        }

        let plan = plan_segments(request.runtime_secs, length);
        let requested = match request.start {
            StartPosition::Time(secs) => start_segment_for(secs, length),
            StartPosition::Segment(index) => index,
        };
        let requested = plan.clamp_index(requested);

        let mut known: BTreeSet<u32> = self.probe.existing_segments(
            &request.output_dir,
            &request.media_ref_id,
            container,
        )?;
        if let Some(previous) = &previous {
            known.extend(previous.transcoded_segments.iter().copied());
        }
        known.retain(|&i| i < plan.segment_count);

        let mut actual = requested;
        while actual < plan.segment_count && known.contains(&actual) {
            actual += 1;
        }

        let mut session = match previous {
            Some(previous) => previous,
            None => TranscodeSession::new(
                token,
                request.media_ref_id.clone(),
                request.media_path.clone(),
                request.output_dir.clone(),
                plan,
                container,
                request.min_buffered_segments,
            ),
        };
        session.transcoded_segments = known;
        session.start_segment = actual;
        session.end_segment = actual;
        session.active_job = None;
        session.touch();

        if actual >= plan.segment_count {
            info!(
                "Session {}: segments {}..{} already on disk, nothing to encode",
                token, requested, plan.segment_count
            );
            self.register(session);
            return Ok(None);
        }

        tokio::fs::create_dir_all(&request.output_dir).await?;

        let start_time_secs = plan.start_time_of(actual);
        let command = EncoderCommand {
            program: self.config.ffmpeg_path.clone(),
            input: request.media_path.clone(),
            output_dir: request.output_dir.clone(),
            name_stem: request.media_ref_id.clone(),
            start_time_secs,
            start_segment: actual,
            segment_length_secs: length,
            container,
        };

        let cancel = CancellationToken::new();
        let events = self.encoder.start(&command, cancel.clone())?;

        let job_id = self.next_job_id.fetch_add(1, Ordering::Relaxed);
        info!(
            "Session {}: job {} encoding from segment {} ({:.3}s, requested {})",
            token, job_id, actual, start_time_secs, requested
        );

        session.encoder_command_description = command.description();
        session.active_job = Some(job_id);
        self.register(session);

        let (tracker, gate) = ProgressTracker::new(
            plan,
            actual,
            start_time_secs,
            request.min_buffered_segments,
        );
        // The watcher may only start once its handle is in `jobs`, or an
        // early exit would leave the handle behind
        let (registered_tx, registered_rx) = oneshot::channel::<()>();
        let orchestrator = Arc::clone(self);
        let job_token = token.to_string();
        let finished = tokio::spawn(async move {
            let _ = registered_rx.await;
            orchestrator.run_job(job_token, job_id, tracker, events).await;
        });

        self.jobs.insert(
            token.to_string(),
            JobHandle {
                id: job_id,
                cancel: cancel.clone(),
                finished,
            },
        );
        let _ = registered_tx.send(());

        // Lost the race against shutdown()
        if self.shutting_down.load(Ordering::SeqCst) {
            cancel.cancel();
        }

        Ok(Some(gate))
    }

    /// Insert or replace a session and publish it
    fn register(&self, session: TranscodeSession) {
        let token = session.token.clone();
        let snapshot = Arc::new(session.clone());
        self.sessions.insert(token.clone(), session);
        self.channels
            .entry(token.clone())
            .or_insert_with(|| broadcast::channel(self.config.progress_channel_capacity).0);
        self.publish(&token, snapshot);
    }

    fn publish(&self, token: &str, snapshot: SessionUpdate) {
        if let Some(tx) = self.channels.get(token) {
            // No subscribers is fine
            let _ = tx.send(snapshot);
        }
    }

    /// Drain the events of one job until its process is gone
    async fn run_job(
        self: Arc<Self>,
        token: String,
        job_id: u64,
        mut tracker: ProgressTracker,
        mut events: mpsc::Receiver<EncoderEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                EncoderEvent::Progress { elapsed_secs } => {
                    if let Some(update) = tracker.on_progress(elapsed_secs) {
                        if self.apply_update(&token, job_id, update) {
                            tracker.release_if_buffered();
                        }
                    }
                }
                EncoderEvent::Finished => {
                    info!("Session {}: job {} finished", token, job_id);
                    if let Some(update) = tracker.on_finished() {
                        self.apply_update(&token, job_id, update);
                    }
                    tracker.release_if_buffered();
                }
                EncoderEvent::Failed { message } => {
                    warn!("Session {}: job {} failed: {}", token, job_id, message);
                    let err = if tracker.gate_pending() {
                        HlsError::EncoderLaunch(message)
                    } else {
                        HlsError::EncoderProcess(message)
                    };
                    tracker.release(Err(err));
                }
                EncoderEvent::Cancelled => {
                    debug!("Session {}: job {} cancelled", token, job_id);
                    tracker.release(Ok(()));
                }
            }
        }

        self.finish_job(&token, job_id);
    }

    /// Apply newly completed segments of a job. Updates from a job that is
    /// no longer current for the token are dropped.
    fn apply_update(&self, token: &str, job_id: u64, update: ProgressUpdate) -> bool {
        let snapshot = {
            let Some(mut session) = self.sessions.get_mut(token) else {
                warn!(
                    "Dropping progress of job {} for removed session {}",
                    job_id, token
                );
                return false;
            };
            if session.active_job != Some(job_id) {
                warn!(
                    "Dropping stale progress of job {} for session {} (current {:?})",
                    job_id, token, session.active_job
                );
                return false;
            }
            session.end_segment = session.end_segment.max(update.end_segment);
            session.transcoded_segments.extend(update.completed);
            Arc::new(session.clone())
        };

        debug!(
            "Session {}: end_segment={} ({} segments written)",
            token,
            snapshot.end_segment,
            snapshot.transcoded_segments.len()
        );
        self.publish(token, snapshot);
        true
    }

    /// Mark the job inactive and let waiters re-evaluate
    fn finish_job(&self, token: &str, job_id: u64) {
        self.jobs.remove_if(token, |_, job| job.id == job_id);

        let snapshot = match self.sessions.get_mut(token) {
            Some(mut session) if session.active_job == Some(job_id) => {
                session.active_job = None;
                Some(Arc::new(session.clone()))
            }
            _ => None,
        };

        if let Some(snapshot) = snapshot {
            self.publish(token, snapshot);
        }
    }
}

/// Remove the file of the segment an interrupted job may have been writing.
///
/// Every finished segment is in `transcoded_segments`, so a file at
/// `end_segment` that is not can only be a partial write.
async fn discard_partial_segment(session: &TranscodeSession) {
    let index = session.end_segment;
    if index >= session.segment_count() || session.has_segment(index) {
        return;
    }
    let path = session
        .output_dir
        .join(segment_file_name(&session.media_ref_id, index, session.container));
    match tokio::fs::remove_file(&path).await {
        Ok(()) => debug!("Removed partial segment {:?}", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove partial segment {:?}: {}", path, e),
    }
}

async fn remove_output_dir(dir: &std::path::Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
