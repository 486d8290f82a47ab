//! Job runner: drives one conversion job to a terminal state.
//!
//! The runner owns the whole lifecycle of a started job: metadata
//! resolution, the confirmation gate, and the fetch+transcode call. Both
//! engine calls are blocking and run on the blocking pool; everything the
//! caller observes travels back over the event channel as snapshots or
//! events, never as the live job object.
//!
//! Engine progress samples cross from the blocking callback to the async
//! side over their own channel, get normalized and monotone-clamped, and are
//! published strictly while the job is `Converting`, preserving the engine's
//! emission order. Once the job is `Converting` there is no way to abort it;
//! the only cancellation path is declining the confirmation.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::controller::JobSlot;
use crate::engine::{ConversionEngine, ConversionRequest, EngineProgress, EngineProgressCallback};
use crate::error::Error;
use crate::job::{JobEvent, JobId, JobState};
use crate::progress::ProgressGauge;
use crate::resolver::MetadataResolver;

/// Drives conversion jobs owned by the controller's job slot.
pub struct JobRunner {
    resolver: Arc<dyn MetadataResolver>,
    engine: Arc<dyn ConversionEngine>,
    output_dir: PathBuf,
    bitrate_kbps: u32,
}

impl JobRunner {
    /// Create a runner over the given resolver and engine.
    #[must_use]
    pub fn new(
        resolver: Arc<dyn MetadataResolver>,
        engine: Arc<dyn ConversionEngine>,
        output_dir: PathBuf,
        bitrate_kbps: u32,
    ) -> Self {
        Self {
            resolver,
            engine,
            output_dir,
            bitrate_kbps,
        }
    }

    /// Drive the job in `slot` to a terminal state, exactly once.
    ///
    /// Called by the controller, which owns the slot. Expects the job to
    /// already be in `ResolvingMetadata`. `confirm_rx` delivers the user's
    /// decision; a dropped sender counts as a decline.
    pub(crate) async fn run(
        &self,
        job_id: JobId,
        source_url: String,
        slot: Arc<RwLock<JobSlot>>,
        confirm_rx: oneshot::Receiver<bool>,
        events: mpsc::UnboundedSender<JobEvent>,
    ) {
        // Phase 1: resolve metadata on the blocking pool.
        let resolver = Arc::clone(&self.resolver);
        let url = source_url.clone();
        let resolved = match tokio::task::spawn_blocking(move || resolver.resolve(&url)).await {
            Ok(result) => result,
            Err(join_err) => Err(Error::Resolution(format!(
                "Metadata task aborted: {join_err}"
            ))),
        };

        let track = match resolved {
            Ok(track) => track,
            Err(e) => {
                self.fail(&slot, &events, job_id, error_detail(&e)).await;
                return;
            }
        };

        debug!("Job {} resolved to \"{}\"", job_id, track.title);

        // Publish the title together with the AwaitingConfirmation transition.
        {
            let mut guard = slot.write().await;
            let Some(job) = guard.job.as_mut().filter(|j| j.id == job_id) else {
                warn!("Job {} vanished before confirmation", job_id);
                return;
            };
            job.title = Some(track.title.clone());
            if let Err(e) = job.transition(JobState::AwaitingConfirmation) {
                error!("Job {}: {}", job_id, e);
                return;
            }
        }
        let _ = events.send(JobEvent::MetadataResolved {
            job_id,
            title: track.title.clone(),
        });
        let _ = events.send(JobEvent::StateChanged {
            job_id,
            state: JobState::AwaitingConfirmation,
        });

        // Phase 2: wait for the user's decision. No timeout, deliberately -
        // the worker is parked on the channel, not spinning. A dropped
        // sender counts as a decline.
        let accepted = confirm_rx.await.unwrap_or(false);
        if !accepted {
            self.cancel(&slot, &events, job_id).await;
            return;
        }

        // Phase 3: fetch and transcode.
        if !self.set_state(&slot, &events, job_id, JobState::Converting).await {
            return;
        }

        let request = ConversionRequest {
            source_url,
            output_dir: self.output_dir.clone(),
            title: track.title.clone(),
            artist: track.channel.clone(),
            bitrate_kbps: self.bitrate_kbps,
        };

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<EngineProgress>();
        let engine = Arc::clone(&self.engine);
        let mut handle = tokio::task::spawn_blocking(move || {
            let callback: EngineProgressCallback = Box::new(move |sample| {
                let _ = progress_tx.send(sample);
            });
            engine.fetch_and_transcode(&request, Some(callback))
        });

        // Forward progress while the engine runs. The channel closes when
        // the engine call returns and drops its callback.
        let mut gauge = ProgressGauge::new();
        let joined = loop {
            tokio::select! {
                joined = &mut handle => break joined,
                sample = progress_rx.recv() => match sample {
                    Some(sample) => {
                        self.publish_progress(&slot, &events, job_id, &mut gauge, sample)
                            .await;
                    }
                    None => break (&mut handle).await,
                },
            }
        };

        // Samples still queued at completion belong to the Converting phase;
        // flush them before the terminal transition.
        while let Ok(sample) = progress_rx.try_recv() {
            self.publish_progress(&slot, &events, job_id, &mut gauge, sample)
                .await;
        }

        let outcome = match joined {
            Ok(result) => result,
            Err(join_err) => Err(Error::Transcode(format!(
                "Conversion task aborted: {join_err}"
            ))),
        };

        match outcome {
            Ok(output_path) => self.complete(&slot, &events, job_id, output_path).await,
            Err(e) => self.fail(&slot, &events, job_id, error_detail(&e)).await,
        }
    }

    /// Apply a state transition to the slotted job and publish it.
    ///
    /// Returns whether the transition was applied.
    async fn set_state(
        &self,
        slot: &Arc<RwLock<JobSlot>>,
        events: &mpsc::UnboundedSender<JobEvent>,
        job_id: JobId,
        next: JobState,
    ) -> bool {
        let mut guard = slot.write().await;
        let Some(job) = guard.job.as_mut().filter(|j| j.id == job_id) else {
            warn!("Job {} not in slot, dropping {} transition", job_id, next);
            return false;
        };
        match job.transition(next) {
            Ok(()) => {
                drop(guard);
                let _ = events.send(JobEvent::StateChanged {
                    job_id,
                    state: next,
                });
                true
            }
            Err(e) => {
                error!("Job {}: {}", job_id, e);
                false
            }
        }
    }

    /// Normalize one engine sample and publish it while `Converting`.
    async fn publish_progress(
        &self,
        slot: &Arc<RwLock<JobSlot>>,
        events: &mpsc::UnboundedSender<JobEvent>,
        job_id: JobId,
        gauge: &mut ProgressGauge,
        sample: EngineProgress,
    ) {
        let percent = gauge.record(sample.bytes_downloaded, sample.bytes_total.unwrap_or(0));

        let mut guard = slot.write().await;
        if let Some(job) = guard.job.as_mut().filter(|j| j.id == job_id)
            && job.state == JobState::Converting
        {
            job.progress_percent = percent;
            drop(guard);
            let _ = events.send(JobEvent::Progress { job_id, percent });
        }
    }

    /// Terminal success: record the output path and release the gate.
    async fn complete(
        &self,
        slot: &Arc<RwLock<JobSlot>>,
        events: &mpsc::UnboundedSender<JobEvent>,
        job_id: JobId,
        output_path: PathBuf,
    ) {
        let mut guard = slot.write().await;
        let Some(job) = guard.job.as_mut().filter(|j| j.id == job_id) else {
            return;
        };
        if let Err(e) = job.transition(JobState::Completed) {
            error!("Job {}: {}", job_id, e);
            return;
        }
        job.output_path = Some(output_path.clone());
        guard.confirm_tx = None;
        drop(guard);

        info!("Job {} completed: {}", job_id, output_path.display());
        let _ = events.send(JobEvent::StateChanged {
            job_id,
            state: JobState::Completed,
        });
        let _ = events.send(JobEvent::Completed {
            job_id,
            output_path,
        });
    }

    /// Terminal failure: record the engine's message verbatim. The progress
    /// percentage stays frozen at its last value.
    async fn fail(
        &self,
        slot: &Arc<RwLock<JobSlot>>,
        events: &mpsc::UnboundedSender<JobEvent>,
        job_id: JobId,
        detail: String,
    ) {
        let mut guard = slot.write().await;
        let Some(job) = guard.job.as_mut().filter(|j| j.id == job_id) else {
            return;
        };
        if let Err(e) = job.transition(JobState::Failed) {
            error!("Job {}: {}", job_id, e);
            return;
        }
        job.error_detail = Some(detail.clone());
        guard.confirm_tx = None;
        drop(guard);

        error!("Job {} failed: {}", job_id, detail);
        let _ = events.send(JobEvent::StateChanged {
            job_id,
            state: JobState::Failed,
        });
        let _ = events.send(JobEvent::Failed {
            job_id,
            error: detail,
        });
    }

    /// Terminal decline: the user said no before any transfer started.
    async fn cancel(
        &self,
        slot: &Arc<RwLock<JobSlot>>,
        events: &mpsc::UnboundedSender<JobEvent>,
        job_id: JobId,
    ) {
        let mut guard = slot.write().await;
        let Some(job) = guard.job.as_mut().filter(|j| j.id == job_id) else {
            return;
        };
        if let Err(e) = job.transition(JobState::Cancelled) {
            error!("Job {}: {}", job_id, e);
            return;
        }
        guard.confirm_tx = None;
        drop(guard);

        info!("Job {} cancelled before conversion", job_id);
        let _ = events.send(JobEvent::StateChanged {
            job_id,
            state: JobState::Cancelled,
        });
        let _ = events.send(JobEvent::Cancelled { job_id });
    }
}

impl std::fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRunner")
            .field("output_dir", &self.output_dir)
            .field("bitrate_kbps", &self.bitrate_kbps)
            .finish_non_exhaustive()
    }
}

/// The message to store in `error_detail`: the engine's own words where we
/// have them, the full error text otherwise.
fn error_detail(e: &Error) -> String {
    match e {
        Error::Resolution(message) | Error::Transcode(message) => message.clone(),
        other => other.to_string(),
    }
}
