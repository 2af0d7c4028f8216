//! End-to-end integration tests

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, TempDir};
use tower::util::ServiceExt;

use crate::config::ServerConfig;
use crate::error::HlsError;
use crate::http::create_router;
use crate::integration::fixtures::{
    output_dir, start_request, test_config, test_orchestrator, test_state, write_segments,
    FakeEncoder, FakeJob, SEGMENT_BYTES,
};
use crate::integration::validation::{parse_entries, validate_media_playlist};
use crate::transcode::{
    EncoderEvent, SeekCoordinator, SeekOutcome, StartPosition, TranscodeOrchestrator,
    TranscodeSession,
};

const RUNTIME: f64 = 65.0;

async fn within<F: Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out")
}

async fn wait_until_inactive(orchestrator: &TranscodeOrchestrator, token: &str) {
    for _ in 0..500 {
        if orchestrator
            .session(token)
            .map(|s| !s.job_active())
            .unwrap_or(true)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job of {} never went inactive", token);
}

struct Harness {
    _media: TempDir,
    _out: TempDir,
    config: ServerConfig,
    media_path: PathBuf,
    encoder: Arc<FakeEncoder>,
    orchestrator: Arc<TranscodeOrchestrator>,
    seek: SeekCoordinator,
}

impl Harness {
    fn new(encoder: Arc<FakeEncoder>) -> Self {
        Self::with_config(encoder, |_| {})
    }

    fn with_config(encoder: Arc<FakeEncoder>, tweak: impl FnOnce(&mut ServerConfig)) -> Self {
        let media = tempdir().unwrap();
        let out = tempdir().unwrap();
        let media_path = media.path().join("movie.mkv");
        std::fs::write(&media_path, b"source").unwrap();

        let mut config = test_config(media.path(), out.path());
        tweak(&mut config);
        let orchestrator = test_orchestrator(&config, encoder.clone());
        let seek = SeekCoordinator::new(Arc::clone(&orchestrator));

        Self {
            _media: media,
            _out: out,
            config,
            media_path,
            encoder,
            orchestrator,
            seek,
        }
    }

    /// Start `token` at `start`, answer launch `n` with one progress tick
    /// and return once the startup gate opened
    async fn open(
        &self,
        token: &str,
        start: StartPosition,
        n: usize,
        elapsed: f64,
    ) -> (TranscodeSession, FakeJob) {
        let orchestrator = Arc::clone(&self.orchestrator);
        let request = start_request(&self.config, token, &self.media_path, RUNTIME, start);
        let task = tokio::spawn(async move { orchestrator.start_transcode(request).await });

        let job = self.encoder.wait_for_launch(n).await;
        job.progress(elapsed);
        let session = within(task).await.unwrap().unwrap();
        (session, job)
    }
}

#[tokio::test]
async fn test_start_waits_for_buffer_then_is_idempotent() {
    let h = Harness::new(FakeEncoder::new());

    let orchestrator = Arc::clone(&h.orchestrator);
    let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(0.0));
    let task = tokio::spawn(async move { orchestrator.start_transcode(request).await });

    let job = h.encoder.wait_for_launch(0).await;
    assert_eq!(job.command.start_segment, 0);
    assert_eq!(job.command.start_time_secs, 0.0);

    // One segment is not enough lead
    job.progress(7.0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    job.progress(13.0);
    let session = within(task).await.unwrap().unwrap();
    assert_eq!(session.start_segment, 0);
    assert_eq!(session.end_segment, 2);
    assert!(session.job_active());
    assert!(session.encoder_command_description.contains("-start_number 0"));

    // Same token again: no second process
    let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(40.0));
    let again = within(h.orchestrator.start_transcode(request)).await.unwrap();
    assert_eq!(again.start_segment, 0);
    assert_eq!(h.encoder.launch_count(), 1);
}

#[tokio::test]
async fn test_concurrent_start_waits_for_the_same_buffer() {
    let h = Harness::new(FakeEncoder::new());

    let start = |time| {
        let orchestrator = Arc::clone(&h.orchestrator);
        let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(time));
        tokio::spawn(async move { orchestrator.start_transcode(request).await })
    };
    let first = start(0.0);
    let job = h.encoder.wait_for_launch(0).await;
    let second = start(30.0);

    job.progress(7.0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!first.is_finished());
    assert!(!second.is_finished());

    job.progress(13.0);
    let first = within(first).await.unwrap().unwrap();
    let second = within(second).await.unwrap().unwrap();
    assert!(first.startup_buffered());
    assert!(second.startup_buffered());
    assert_eq!(second.start_segment, 0);
    assert_eq!(h.encoder.launch_count(), 1);
}

#[tokio::test]
async fn test_concurrent_start_fails_with_the_job() {
    let h = Harness::new(FakeEncoder::new());

    let start = || {
        let orchestrator = Arc::clone(&h.orchestrator);
        let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(0.0));
        tokio::spawn(async move { orchestrator.start_transcode(request).await })
    };
    let first = start();
    let job = h.encoder.wait_for_launch(0).await;
    let second = start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    job.fail("Conversion failed!");
    assert!(matches!(
        within(first).await.unwrap(),
        Err(HlsError::EncoderLaunch(_))
    ));
    assert!(matches!(
        within(second).await.unwrap(),
        Err(HlsError::EncoderLaunch(_))
    ));
    assert_eq!(h.encoder.launch_count(), 1);
}

#[tokio::test]
async fn test_requested_time_backs_off_one_segment() {
    let h = Harness::new(FakeEncoder::new());
    let (session, job) = h.open("t1", StartPosition::Time(20.0), 0, 13.0).await;

    assert_eq!(job.command.start_segment, 2);
    assert_eq!(job.command.start_time_secs, 12.0);
    assert_eq!(session.start_segment, 2);
    // 12s + 13s = 25s: segments 2 and 3 complete
    assert_eq!(session.end_segment, 4);
    assert!(session.has_segment(2) && session.has_segment(3));
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let h = Harness::new(FakeEncoder::new());
    let (first, job) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;
    let mut updates = h.orchestrator.subscribe("t1").unwrap();

    job.progress(19.0);
    job.progress(25.0);
    job.progress(20.0); // out of order tick
    job.progress(37.0);

    let mut previous = first;
    loop {
        let update = within(updates.recv()).await.unwrap();
        assert!(update.end_segment >= previous.end_segment);
        assert!(update.transcoded_segments.is_superset(&previous.transcoded_segments));
        assert!(update.transcoded_segments.len() > previous.transcoded_segments.len());
        if update.end_segment == 6 {
            break;
        }
        previous = (*update).clone();
    }

    let session = h.orchestrator.session("t1").unwrap();
    assert_eq!(
        session.transcoded_segments.iter().copied().collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4, 5]
    );
}

#[tokio::test]
async fn test_seek_in_range_waits_without_restart() {
    let h = Harness::new(FakeEncoder::new());
    let (session, job) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;
    assert_eq!(session.end_segment, 2);

    let seek = h.seek.clone();
    let task = tokio::spawn(async move { seek.set_segment_target("t1", 3).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    job.progress(19.0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!task.is_finished());

    job.progress(25.0);
    let outcome = within(task).await.unwrap().unwrap();
    assert_eq!(outcome, SeekOutcome::Waited);
    assert_eq!(h.encoder.launch_count(), 1);
    assert!(!job.is_cancelled());
}

#[tokio::test]
async fn test_lagging_waiter_rechecks_session() {
    let h = Harness::with_config(FakeEncoder::new(), |c| {
        c.transcode.progress_channel_capacity = 1
    });
    let (session, job) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;
    assert_eq!(session.end_segment, 2);

    let seek = h.seek.clone();
    let task = tokio::spawn(async move { seek.set_segment_target("t1", 5).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!task.is_finished());

    // More updates than the channel holds before the waiter runs again
    for elapsed in [19.0, 25.0, 31.0, 37.0] {
        job.progress(elapsed);
    }

    let outcome = within(task).await.unwrap().unwrap();
    assert_eq!(outcome, SeekOutcome::Waited);
    assert_eq!(h.encoder.launch_count(), 1);
    assert!(!job.is_cancelled());
}

#[tokio::test]
async fn test_seek_to_written_segment_is_ready() {
    let h = Harness::new(FakeEncoder::new());
    h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;

    let outcome = within(h.seek.set_segment_target("t1", 1)).await.unwrap();
    assert_eq!(outcome, SeekOutcome::Ready);
}

#[tokio::test]
async fn test_seek_out_of_range_restarts_at_segment() {
    let h = Harness::new(FakeEncoder::new());
    let (_, job0) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;

    // end_segment 2, window reaches 2 + 2 * 2 = 6
    let seek = h.seek.clone();
    let task = tokio::spawn(async move { seek.set_segment_target("t1", 8).await });

    let job1 = h.encoder.wait_for_launch(1).await;
    assert!(job0.is_cancelled());
    assert_eq!(job1.command.start_segment, 8);
    assert_eq!(job1.command.start_time_secs, 48.0);

    job1.progress(13.0);
    let outcome = within(task).await.unwrap().unwrap();
    assert_eq!(outcome, SeekOutcome::Restarted);

    let session = h.orchestrator.session("t1").unwrap();
    assert_eq!(session.start_segment, 8);
    // Work of the first job is kept
    assert!(session.has_segment(0) && session.has_segment(1));
    assert!(session.has_segment(8) && session.has_segment(9));
}

#[tokio::test]
async fn test_rewind_restarts_behind_start() {
    let h = Harness::new(FakeEncoder::new());
    let (_, job0) = h.open("t1", StartPosition::Time(40.0), 0, 13.0).await;
    assert_eq!(job0.command.start_segment, 5);

    let seek = h.seek.clone();
    let task = tokio::spawn(async move { seek.set_segment_target("t1", 1).await });

    let job1 = h.encoder.wait_for_launch(1).await;
    assert_eq!(job1.command.start_segment, 1);
    assert_eq!(job1.command.start_time_secs, 6.0);
    job1.progress(13.0);
    assert_eq!(within(task).await.unwrap().unwrap(), SeekOutcome::Restarted);
}

#[tokio::test]
async fn test_restart_waits_for_old_job_to_exit() {
    let h = Harness::new(FakeEncoder::sluggish());
    let (_, job0) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;

    let orchestrator = Arc::clone(&h.orchestrator);
    let task = tokio::spawn(async move { orchestrator.retarget("t1", 8).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(job0.is_cancelled());
    assert_eq!(h.encoder.launch_count(), 1);

    job0.acknowledge_cancel();
    let job1 = h.encoder.wait_for_launch(1).await;
    job1.progress(13.0);
    within(task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_disk_segments_are_reused() {
    let h = Harness::new(FakeEncoder::new());
    write_segments(&output_dir(&h.config, "t1"), 0..5);

    let (session, job) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;
    assert_eq!(job.command.start_segment, 5);
    assert_eq!(job.command.start_time_secs, 30.0);
    assert_eq!(session.start_segment, 5);
    assert!((0..7).all(|i| session.has_segment(i)));
}

#[tokio::test]
async fn test_everything_on_disk_launches_nothing() {
    let h = Harness::new(FakeEncoder::new());
    write_segments(&output_dir(&h.config, "t1"), 0..11);

    let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(0.0));
    let session = within(h.orchestrator.start_transcode(request)).await.unwrap();

    assert_eq!(h.encoder.launch_count(), 0);
    assert!(!session.job_active());
    assert_eq!(session.transcoded_segments.len(), 11);
    assert_eq!(
        within(h.seek.set_segment_target("t1", 10)).await.unwrap(),
        SeekOutcome::Ready
    );
}

#[tokio::test]
async fn test_clean_exit_completes_short_tail() {
    let h = Harness::new(FakeEncoder::new());

    let orchestrator = Arc::clone(&h.orchestrator);
    let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(60.0));
    let task = tokio::spawn(async move { orchestrator.start_transcode(request).await });

    let job = h.encoder.wait_for_launch(0).await;
    assert_eq!(job.command.start_segment, 9);
    job.finish();

    let session = within(task).await.unwrap().unwrap();
    assert!(session.has_segment(9) && session.has_segment(10));
    assert_eq!(session.end_segment, 11);

    wait_until_inactive(&h.orchestrator, "t1").await;
}

#[tokio::test]
async fn test_encoder_dying_at_startup_fails_start() {
    let h = Harness::new(FakeEncoder::new());

    let orchestrator = Arc::clone(&h.orchestrator);
    let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(0.0));
    let task = tokio::spawn(async move { orchestrator.start_transcode(request).await });

    let job = h.encoder.wait_for_launch(0).await;
    job.fail("Invalid data found when processing input");

    match within(task).await.unwrap() {
        Err(HlsError::EncoderLaunch(msg)) => assert!(msg.contains("Invalid data")),
        other => panic!("unexpected result: {:?}", other.map(|s| s.token)),
    }
}

#[tokio::test]
async fn test_spawn_failure_fails_start() {
    let h = Harness::new(FakeEncoder::failing_spawn());
    let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(0.0));
    let result = within(h.orchestrator.start_transcode(request)).await;
    assert!(matches!(result, Err(HlsError::EncoderLaunch(_))));
    assert!(h.orchestrator.session("t1").is_none());
}

#[tokio::test]
async fn test_missing_source_launches_nothing() {
    let h = Harness::new(FakeEncoder::new());
    std::fs::remove_file(&h.media_path).unwrap();

    let request = start_request(&h.config, "t1", &h.media_path, RUNTIME, StartPosition::Time(0.0));
    let result = within(h.orchestrator.start_transcode(request)).await;
    assert!(matches!(result, Err(HlsError::SourceUnavailable(_))));
    assert_eq!(h.encoder.launch_count(), 0);
}

#[tokio::test]
async fn test_mid_run_failure_recovers_by_restart() {
    let h = Harness::new(FakeEncoder::new());
    let (_, job0) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;

    job0.fail("Conversion failed!");
    wait_until_inactive(&h.orchestrator, "t1").await;
    let session = h.orchestrator.session("t1").unwrap();
    assert!(session.has_segment(0) && session.has_segment(1));

    let seek = h.seek.clone();
    let task = tokio::spawn(async move { seek.set_segment_target("t1", 3).await });

    let job1 = h.encoder.wait_for_launch(1).await;
    assert_eq!(job1.command.start_segment, 3);
    job1.progress(13.0);
    assert_eq!(within(task).await.unwrap().unwrap(), SeekOutcome::Restarted);
}

#[tokio::test]
async fn test_seek_errors() {
    let h = Harness::new(FakeEncoder::new());
    h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;

    assert!(matches!(
        h.seek.set_segment_target("t1", 11).await,
        Err(HlsError::SegmentNotFound { sequence: 11, .. })
    ));
    assert!(matches!(
        h.seek.set_segment_target("nope", 0).await,
        Err(HlsError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_stop_session_releases_waiters_and_deletes_output() {
    let h = Harness::new(FakeEncoder::new());
    let (_, job) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;
    let dir = output_dir(&h.config, "t1");
    assert!(dir.join("movie0.ts").exists());

    let seek = h.seek.clone();
    let waiter = tokio::spawn(async move { seek.set_segment_target("t1", 4).await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    within(h.orchestrator.stop_session("t1", true)).await.unwrap();
    assert!(job.is_cancelled());
    assert!(h.orchestrator.session("t1").is_none());
    assert!(!dir.exists());
    assert!(matches!(
        within(waiter).await.unwrap(),
        Err(HlsError::SessionNotFound(_))
    ));

    // Unknown tokens are a no-op
    within(h.orchestrator.stop_session("t1", true)).await.unwrap();
    within(h.orchestrator.stop_session("never", false)).await.unwrap();
}

#[tokio::test]
async fn test_session_limit() {
    let h = Harness::with_config(FakeEncoder::new(), |c| c.max_concurrent_sessions = Some(1));
    h.open("a", StartPosition::Time(0.0), 0, 13.0).await;

    let request = start_request(&h.config, "b", &h.media_path, RUNTIME, StartPosition::Time(0.0));
    assert!(matches!(
        within(h.orchestrator.start_transcode(request)).await,
        Err(HlsError::TooManySessions(1))
    ));

    // Retargeting the running session does not count twice
    let orchestrator = Arc::clone(&h.orchestrator);
    let task = tokio::spawn(async move { orchestrator.retarget("a", 8).await });
    let job = h.encoder.wait_for_launch(1).await;
    job.progress(13.0);
    within(task).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_idle_sessions_are_evicted() {
    let h = Harness::new(FakeEncoder::new());
    let (_, job) = h.open("t1", StartPosition::Time(0.0), 0, 13.0).await;

    assert_eq!(h.orchestrator.evict_idle(60, true).await, 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.orchestrator.evict_idle(0, true).await, 1);
    assert!(job.is_cancelled());
    assert!(h.orchestrator.session("t1").is_none());
    assert!(!output_dir(&h.config, "t1").exists());
}

#[tokio::test]
async fn test_shutdown_cancels_jobs_and_keeps_sessions() {
    let h = Harness::new(FakeEncoder::new());
    let (_, a) = h.open("a", StartPosition::Time(0.0), 0, 13.0).await;
    let (_, b) = h.open("b", StartPosition::Time(30.0), 1, 13.0).await;

    within(h.orchestrator.shutdown()).await;
    assert!(a.is_cancelled() && b.is_cancelled());
    assert_eq!(h.orchestrator.active_job_count(), 0);
    assert_eq!(h.orchestrator.sessions().len(), 2);
    assert!(output_dir(&h.config, "a").join("movie0.ts").exists());

    // Nothing is launched once stopping
    assert!(matches!(
        within(h.orchestrator.retarget("a", 8)).await,
        Err(HlsError::ShuttingDown)
    ));
    assert!(matches!(
        within(h.seek.set_segment_target("b", 9)).await,
        Err(HlsError::ShuttingDown)
    ));
    assert_eq!(h.encoder.launch_count(), 2);
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_http_session_flow() {
    let media = tempdir().unwrap();
    let out = tempdir().unwrap();
    std::fs::write(media.path().join("movie.mkv"), b"source").unwrap();

    let encoder = FakeEncoder::scripted(vec![EncoderEvent::Progress { elapsed_secs: 13.0 }]);
    let (state, encoder) = test_state(media.path(), out.path(), encoder, RUNTIME);
    let app = create_router(state);

    // Open
    let response = within(
        app.clone().oneshot(
            Request::post("/sessions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"media_ref_id": "movie"}"#))
                .unwrap(),
        ),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let opened: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    let token = opened["token"].as_str().unwrap().to_string();
    let playlist_url = opened["playlist_url"].as_str().unwrap().to_string();
    assert_eq!(playlist_url, format!("/hls/movie.m3u8?token={}", token));
    assert_eq!(opened["segment_count"], 11);
    assert_eq!(opened["start_segment"], 0);

    // Playlist
    let response = app
        .clone()
        .oneshot(Request::get(&playlist_url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/vnd.apple.mpegurl"
    );
    let playlist = String::from_utf8(body_bytes(response).await.to_vec()).unwrap();
    let result = validate_media_playlist(&playlist);
    assert!(result.is_valid, "{:?}", result.errors);
    let entries = parse_entries(&playlist);
    assert_eq!(entries.len(), 11);
    assert_eq!(entries[0].uri, format!("movie0.ts?token={}", token));

    // Written segment
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/hls/movie0.ts?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "video/mp2t");
    assert_eq!(&body_bytes(response).await[..], SEGMENT_BYTES);

    // Far seek restarts the encode at the segment
    let response = within(
        app.clone().oneshot(
            Request::get(format!("/hls/movie9.ts?token={}", token))
                .body(Body::empty())
                .unwrap(),
        ),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(encoder.launch_count(), 2);
    assert_eq!(encoder.job(1).command.start_segment, 9);

    // Past the end
    let response = app
        .clone()
        .oneshot(
            Request::get(format!("/hls/movie11.ts?token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Debug listing
    let response = app
        .clone()
        .oneshot(Request::get("/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let list: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(list["count"], 1);
    assert_eq!(list["sessions"][0]["token"], token.as_str());

    // Close and delete
    let response = within(
        app.clone().oneshot(
            Request::delete(format!("/sessions/{}?delete_output=true", token))
                .body(Body::empty())
                .unwrap(),
        ),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!out.path().join(&token).exists());

    let response = app
        .oneshot(Request::get(&playlist_url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_open_errors() {
    let media = tempdir().unwrap();
    let out = tempdir().unwrap();
    let (state, _encoder) = test_state(media.path(), out.path(), FakeEncoder::new(), RUNTIME);
    let app = create_router(state);

    let open = |body: &'static str| {
        Request::post("/sessions")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(open(r#"{"media_ref_id": "../etc/passwd"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(open(r#"{"media_ref_id": "missing"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
