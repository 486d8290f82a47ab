//! Integration tests for the conversion job pipeline.
//!
//! These tests drive the full controller -> runner path with stub resolver
//! and engine implementations: start, confirmation gate, progress
//! normalization, terminal outcomes, and the single-job exclusivity rules.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use mp3grab_core::{
    ConversionEngine, ConversionRequest, ConverterConfig, EngineProgress,
    EngineProgressCallback, Error, JobController, JobEvent, JobState, MetadataResolver, Result,
    Settings, SettingsStore, Theme, TrackInfo,
};
use tempfile::TempDir;

// =============================================================================
// Test Doubles
// =============================================================================

/// Resolver that returns a fixed track, optionally after a delay.
struct StubResolver {
    title: String,
    delay: Duration,
}

impl StubResolver {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn slow(title: &str, delay: Duration) -> Self {
        Self {
            title: title.to_string(),
            delay,
        }
    }
}

impl MetadataResolver for StubResolver {
    fn resolve(&self, _url: &str) -> Result<TrackInfo> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(TrackInfo {
            id: "stub".to_string(),
            title: self.title.clone(),
            duration_secs: Some(180),
            channel: Some("Stub Channel".to_string()),
            thumbnail_url: None,
        })
    }
}

/// Resolver that always fails with a fixed message.
struct FailingResolver(&'static str);

impl MetadataResolver for FailingResolver {
    fn resolve(&self, _url: &str) -> Result<TrackInfo> {
        Err(Error::Resolution(self.0.to_string()))
    }
}

/// Engine that replays scripted progress samples, then succeeds or fails.
struct ScriptedEngine {
    samples: Vec<(u64, u64)>,
    failure: Option<&'static str>,
}

impl ScriptedEngine {
    fn succeeding(samples: Vec<(u64, u64)>) -> Self {
        Self {
            samples,
            failure: None,
        }
    }

    fn failing(samples: Vec<(u64, u64)>, message: &'static str) -> Self {
        Self {
            samples,
            failure: Some(message),
        }
    }
}

impl ConversionEngine for ScriptedEngine {
    fn fetch_and_transcode(
        &self,
        request: &ConversionRequest,
        progress: Option<EngineProgressCallback>,
    ) -> Result<PathBuf> {
        for (downloaded, total) in &self.samples {
            if let Some(callback) = progress.as_ref() {
                callback(EngineProgress {
                    bytes_downloaded: *downloaded,
                    bytes_total: (*total > 0).then_some(*total),
                });
            }
        }
        if let Some(message) = self.failure {
            return Err(Error::Transcode(message.to_string()));
        }
        let path = request.output_path();
        std::fs::write(&path, b"mp3")?;
        Ok(path)
    }
}

/// Engine that holds the `Converting` phase open for a while.
struct SlowEngine {
    delay: Duration,
}

impl ConversionEngine for SlowEngine {
    fn fetch_and_transcode(
        &self,
        request: &ConversionRequest,
        _progress: Option<EngineProgressCallback>,
    ) -> Result<PathBuf> {
        std::thread::sleep(self.delay);
        let path = request.output_path();
        std::fs::write(&path, b"mp3")?;
        Ok(path)
    }
}

/// Engine that must never be reached.
struct UnreachableEngine;

impl ConversionEngine for UnreachableEngine {
    fn fetch_and_transcode(
        &self,
        _request: &ConversionRequest,
        _progress: Option<EngineProgressCallback>,
    ) -> Result<PathBuf> {
        Err(Error::Transcode("engine must not be called".to_string()))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

const URL: &str = "https://valid/video";

fn controller(
    dir: &TempDir,
    resolver: impl MetadataResolver + 'static,
    engine: impl ConversionEngine + 'static,
) -> JobController {
    let config = ConverterConfig {
        download_directory: dir.path().to_path_buf(),
        bitrate_kbps: 192,
        ffmpeg_path: None,
    };
    JobController::new(&config, Arc::new(resolver), Arc::new(engine)).expect("controller")
}

async fn next_event(controller: &JobController) -> JobEvent {
    tokio::time::timeout(Duration::from_secs(5), controller.recv_event())
        .await
        .expect("timed out waiting for job event")
        .expect("event channel closed")
}

/// Drain events until the given state is announced, collecting everything.
async fn events_until_state(
    controller: &JobController,
    target: JobState,
) -> Vec<JobEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(controller).await;
        let reached = matches!(
            &event,
            JobEvent::StateChanged { state, .. } if *state == target
        );
        events.push(event);
        if reached {
            return events;
        }
    }
}

fn observed_states(events: &[JobEvent]) -> Vec<JobState> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::StateChanged { state, .. } => Some(*state),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_full_conversion_flow() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        ScriptedEngine::succeeding(vec![(50, 200), (200, 200)]),
    );

    let job_id = controller.start_job(URL).await.expect("job starts");

    // Resolution publishes the title and parks the job on the gate.
    let events = events_until_state(&controller, JobState::AwaitingConfirmation).await;
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::MetadataResolved { title, .. } if title == "Song A"
    )));

    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.state, JobState::AwaitingConfirmation);
    assert_eq!(snapshot.title.as_deref(), Some("Song A"));

    controller.confirm(job_id, true).await.expect("confirm");

    // Progress arrives normalized, in order, strictly inside Converting.
    let events = events_until_state(&controller, JobState::Completed).await;
    let percents: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![25.0, 100.0]);

    let done = next_event(&controller).await;
    let JobEvent::Completed { output_path, .. } = done else {
        panic!("expected Completed event, got {done:?}");
    };
    assert!(output_path.ends_with("Song A.mp3"));
    assert!(output_path.is_file());

    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(snapshot.progress_percent, 100.0);
    assert_eq!(snapshot.output_path, Some(output_path));
    assert!(snapshot.error_detail.is_none());
}

#[tokio::test]
async fn test_observed_states_form_a_legal_path() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        ScriptedEngine::succeeding(vec![(200, 200)]),
    );

    let job_id = controller.start_job(URL).await.expect("job starts");
    let mut events = events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(job_id, true).await.expect("confirm");
    events.extend(events_until_state(&controller, JobState::Completed).await);

    let states = observed_states(&events);
    assert_eq!(
        states,
        vec![
            JobState::ResolvingMetadata,
            JobState::AwaitingConfirmation,
            JobState::Converting,
            JobState::Completed,
        ]
    );
    for pair in states.windows(2) {
        assert!(
            pair[0].can_transition_to(pair[1]),
            "observed illegal edge {} -> {}",
            pair[0],
            pair[1]
        );
    }
}

#[tokio::test]
async fn test_empty_url_rejected_before_any_state() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(&dir, FailingResolver("unused"), UnreachableEngine);

    let err = controller.start_job("").await.expect_err("must reject");
    assert!(matches!(err, Error::InvalidUrl { .. }));
    assert!(controller.current_job().await.is_none());
    assert!(controller.try_recv_event().await.is_none());
}

#[tokio::test]
async fn test_second_start_returns_busy_and_first_proceeds() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::slow("Song A", Duration::from_millis(100)),
        ScriptedEngine::succeeding(vec![(200, 200)]),
    );

    let first = controller.start_job(URL).await.expect("first starts");
    let err = controller
        .start_job("https://valid/other")
        .await
        .expect_err("second must be busy");
    assert!(matches!(err, Error::Busy));

    // The first job is unaffected and completes normally.
    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(first, true).await.expect("confirm");
    events_until_state(&controller, JobState::Completed).await;
}

#[tokio::test]
async fn test_busy_in_every_non_terminal_state() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        SlowEngine {
            delay: Duration::from_millis(500),
        },
    );

    let job_id = controller.start_job(URL).await.expect("job starts");

    // AwaitingConfirmation holds the gate.
    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    assert!(matches!(
        controller.start_job("https://valid/other").await,
        Err(Error::Busy)
    ));

    // Converting holds the gate too.
    controller.confirm(job_id, true).await.expect("confirm");
    events_until_state(&controller, JobState::Converting).await;
    assert!(matches!(
        controller.start_job("https://valid/other").await,
        Err(Error::Busy)
    ));

    // The active job is unaffected by the rejected starts.
    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.id, job_id);

    events_until_state(&controller, JobState::Completed).await;
}

#[tokio::test]
async fn test_decline_cancels_and_releases_gate() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        UnreachableEngine,
    );

    let job_id = controller.start_job(URL).await.expect("job starts");
    events_until_state(&controller, JobState::AwaitingConfirmation).await;

    controller.confirm(job_id, false).await.expect("decline");
    let events = events_until_state(&controller, JobState::Cancelled).await;
    assert!(observed_states(&events).contains(&JobState::Cancelled));
    let cancelled = next_event(&controller).await;
    assert!(matches!(cancelled, JobEvent::Cancelled { .. }));

    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.state, JobState::Cancelled);
    // No conversion happened, so no progress and no output.
    assert_eq!(snapshot.progress_percent, 0.0);
    assert!(snapshot.output_path.is_none());

    // Terminal state releases the gate.
    let second = controller.start_job(URL).await.expect("gate released");
    assert!(second > job_id);
}

#[tokio::test]
async fn test_resolution_failure_is_terminal_with_message() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        FailingResolver("Video unavailable: private"),
        UnreachableEngine,
    );

    let _job_id = controller.start_job(URL).await.expect("job starts");
    let events = events_until_state(&controller, JobState::Failed).await;
    assert_eq!(
        observed_states(&events),
        vec![JobState::ResolvingMetadata, JobState::Failed]
    );

    let failed = next_event(&controller).await;
    let JobEvent::Failed { error, .. } = failed else {
        panic!("expected Failed event, got {failed:?}");
    };
    assert_eq!(error, "Video unavailable: private");

    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.state, JobState::Failed);
    assert_eq!(
        snapshot.error_detail.as_deref(),
        Some("Video unavailable: private")
    );
}

#[tokio::test]
async fn test_engine_failure_freezes_progress_and_keeps_message() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        ScriptedEngine::failing(vec![(50, 200)], "network error: connection reset"),
    );

    let job_id = controller.start_job(URL).await.expect("job starts");
    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(job_id, true).await.expect("confirm");

    let events = events_until_state(&controller, JobState::Failed).await;
    let percents: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![25.0]);

    let failed = next_event(&controller).await;
    assert!(matches!(
        failed,
        JobEvent::Failed { ref error, .. } if error == "network error: connection reset"
    ));

    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.state, JobState::Failed);
    assert_eq!(
        snapshot.error_detail.as_deref(),
        Some("network error: connection reset")
    );
    // Progress stays frozen at the last published value.
    assert_eq!(snapshot.progress_percent, 25.0);
    assert!(snapshot.output_path.is_none());
}

#[tokio::test]
async fn test_unknown_total_reports_zero_percent() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        ScriptedEngine::succeeding(vec![(4096, 0), (8192, 0)]),
    );

    let job_id = controller.start_job(URL).await.expect("job starts");
    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(job_id, true).await.expect("confirm");

    let events = events_until_state(&controller, JobState::Completed).await;
    for event in &events {
        if let JobEvent::Progress { percent, .. } = event {
            assert_eq!(*percent, 0.0);
        }
    }
}

#[tokio::test]
async fn test_progress_never_regresses_across_stages() {
    let dir = TempDir::new().expect("temp dir");
    // A second transfer stage restarts its byte counter mid-job.
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        ScriptedEngine::succeeding(vec![(150, 200), (10, 200), (200, 200)]),
    );

    let job_id = controller.start_job(URL).await.expect("job starts");
    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(job_id, true).await.expect("confirm");

    let events = events_until_state(&controller, JobState::Completed).await;
    let percents: Vec<f64> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { percent, .. } => Some(*percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![75.0, 75.0, 100.0]);
}

#[tokio::test]
async fn test_confirm_after_terminal_state_is_error() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        ScriptedEngine::succeeding(vec![(200, 200)]),
    );

    let job_id = controller.start_job(URL).await.expect("job starts");
    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(job_id, true).await.expect("confirm");
    events_until_state(&controller, JobState::Completed).await;

    let err = controller
        .confirm(job_id, true)
        .await
        .expect_err("terminal jobs take no decisions");
    assert!(matches!(err, Error::NotAwaitingConfirmation { .. }));

    // The rejected call did not mutate the job.
    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.state, JobState::Completed);
}

#[tokio::test]
async fn test_gate_reopens_after_completion() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::new("Song A"),
        ScriptedEngine::succeeding(vec![(200, 200)]),
    );

    let first = controller.start_job(URL).await.expect("first starts");
    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(first, true).await.expect("confirm");
    events_until_state(&controller, JobState::Completed).await;

    let second = controller
        .start_job("https://valid/another")
        .await
        .expect("second starts after completion");
    assert_ne!(first, second);

    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.id, second);
    assert_eq!(snapshot.source_url, "https://valid/another");
}

#[tokio::test]
async fn test_settings_are_independent_of_job_state() {
    let dir = TempDir::new().expect("temp dir");
    let controller = controller(
        &dir,
        StubResolver::slow("Song A", Duration::from_millis(100)),
        ScriptedEngine::succeeding(vec![(200, 200)]),
    );
    let mut settings = SettingsStore::new();

    let job_id = controller.start_job(URL).await.expect("job starts");

    // Mutating settings while a job is in flight touches nothing job-side.
    settings.update(Settings {
        theme: Theme::Light,
        language: mp3grab_core::Language::It,
    });
    assert_eq!(settings.settings().theme, Theme::Light);

    events_until_state(&controller, JobState::AwaitingConfirmation).await;
    controller.confirm(job_id, true).await.expect("confirm");
    events_until_state(&controller, JobState::Completed).await;

    let snapshot = controller.current_job().await.expect("job exists");
    assert_eq!(snapshot.state, JobState::Completed);
    assert_eq!(settings.settings().theme, Theme::Light);
}
