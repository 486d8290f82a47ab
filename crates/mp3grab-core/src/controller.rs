//! Job controller: the single-instance gate in front of the runner.
//!
//! At most one conversion job is alive at a time. The controller owns the
//! job slot, rejects `start_job` with [`Error::Busy`] while a non-terminal
//! job exists, routes the confirmation decision to the runner, and hands out
//! read-only snapshots. Reaching a terminal state releases the gate
//! implicitly: the next `start_job` replaces the finished job.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{RwLock, mpsc, oneshot};
use tracing::{info, warn};

use crate::config::{ConverterConfig, validate_download_directory};
use crate::engine::ConversionEngine;
use crate::error::{Error, Result};
use crate::job::{ConversionJob, JobEvent, JobId, JobState};
use crate::resolver::{MetadataResolver, validate_source_url};
use crate::runner::JobRunner;

/// The single job slot plus the pending confirmation channel.
///
/// Owned by the controller; the runner mutates the job through the lock and
/// everyone else only ever sees clones.
#[derive(Debug, Default)]
pub(crate) struct JobSlot {
    /// The current job, if any. A terminal job stays here until replaced.
    pub(crate) job: Option<ConversionJob>,
    /// Sender for the user's confirm/decline decision.
    pub(crate) confirm_tx: Option<oneshot::Sender<bool>>,
}

/// Accepts conversion requests and owns the one active job.
pub struct JobController {
    /// The single job slot.
    slot: Arc<RwLock<JobSlot>>,
    /// Runner that drives accepted jobs.
    runner: Arc<JobRunner>,
    /// Channel for publishing job events.
    event_tx: mpsc::UnboundedSender<JobEvent>,
    /// Channel for consuming job events.
    event_rx: Arc<RwLock<mpsc::UnboundedReceiver<JobEvent>>>,
    /// Counter for generating unique job IDs.
    next_id: AtomicU64,
}

impl JobController {
    /// Create a controller over the given resolver and engine.
    ///
    /// The output directory is resolved exactly once, here: it is created if
    /// absent and checked for writability.
    ///
    /// # Errors
    ///
    /// Returns an error if the download directory cannot be created or
    /// written to.
    pub fn new(
        config: &ConverterConfig,
        resolver: Arc<dyn MetadataResolver>,
        engine: Arc<dyn ConversionEngine>,
    ) -> Result<Self> {
        validate_download_directory(&config.download_directory)?;
        info!(
            "Job controller ready, output directory: {}",
            config.download_directory.display()
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let runner = Arc::new(JobRunner::new(
            resolver,
            engine,
            config.download_directory.clone(),
            config.bitrate_kbps,
        ));

        Ok(Self {
            slot: Arc::new(RwLock::new(JobSlot::default())),
            runner,
            event_tx,
            event_rx: Arc::new(RwLock::new(event_rx)),
            next_id: AtomicU64::new(0),
        })
    }

    /// Start a conversion job for `url`.
    ///
    /// Validation and the busy check happen before anything is spawned: an
    /// empty or malformed URL creates no job, and a second start while a
    /// non-terminal job exists leaves the active job untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] for bad input and [`Error::Busy`] while
    /// another job is active.
    pub async fn start_job(&self, url: &str) -> Result<JobId> {
        validate_source_url(url)?;

        let mut guard = self.slot.write().await;
        if let Some(job) = guard.job.as_ref()
            && !job.is_terminal()
        {
            warn!(
                "Rejecting start for {}: job {} is {}",
                url, job.id, job.state
            );
            return Err(Error::Busy);
        }

        let job_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut job = ConversionJob::new(job_id, url.trim());
        job.transition(JobState::ResolvingMetadata)?;

        info!("Starting job {}: {}", job_id, job.source_url);

        let (confirm_tx, confirm_rx) = oneshot::channel();
        let source_url = job.source_url.clone();
        guard.job = Some(job);
        guard.confirm_tx = Some(confirm_tx);
        drop(guard);

        let _ = self.event_tx.send(JobEvent::StateChanged {
            job_id,
            state: JobState::ResolvingMetadata,
        });

        let runner = Arc::clone(&self.runner);
        let slot = Arc::clone(&self.slot);
        let events = self.event_tx.clone();
        tokio::spawn(async move {
            runner.run(job_id, source_url, slot, confirm_rx, events).await;
        });

        Ok(job_id)
    }

    /// Deliver the user's confirm/decline decision for the given job.
    ///
    /// Valid only while the job is `AwaitingConfirmation`; in any other
    /// situation nothing is mutated and the call is reported as an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoActiveJob`], [`Error::JobNotFound`], or
    /// [`Error::NotAwaitingConfirmation`] when the decision does not apply.
    pub async fn confirm(&self, job_id: JobId, accept: bool) -> Result<()> {
        let mut guard = self.slot.write().await;

        let Some(job) = guard.job.as_ref() else {
            return Err(Error::NoActiveJob);
        };
        if job.id != job_id {
            return Err(Error::JobNotFound(job_id));
        }
        if job.state != JobState::AwaitingConfirmation {
            return Err(Error::NotAwaitingConfirmation {
                job_id,
                state: job.state,
            });
        }

        let Some(confirm_tx) = guard.confirm_tx.take() else {
            // Decision already submitted; the runner just hasn't moved yet.
            return Err(Error::NotAwaitingConfirmation {
                job_id,
                state: JobState::AwaitingConfirmation,
            });
        };

        info!(
            "Job {} {}",
            job_id,
            if accept { "confirmed" } else { "declined" }
        );
        if confirm_tx.send(accept).is_err() {
            warn!("Job {} runner is gone, decision dropped", job_id);
        }
        Ok(())
    }

    /// Snapshot of the current job, if any.
    ///
    /// Safe to call from any task at any time; the returned clone is
    /// detached from the live job.
    pub async fn current_job(&self) -> Option<ConversionJob> {
        self.slot.read().await.job.clone()
    }

    /// Receive the next job event, waiting if none is queued.
    ///
    /// Returns `None` only if the event channel has closed.
    pub async fn recv_event(&self) -> Option<JobEvent> {
        let mut rx = self.event_rx.write().await;
        rx.recv().await
    }

    /// Try to receive a job event without blocking.
    pub async fn try_recv_event(&self) -> Option<JobEvent> {
        let mut rx = self.event_rx.write().await;
        rx.try_recv().ok()
    }

    /// Get a clone of the event sender for external use.
    #[must_use]
    pub fn event_sender(&self) -> mpsc::UnboundedSender<JobEvent> {
        self.event_tx.clone()
    }
}

impl std::fmt::Debug for JobController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobController").finish_non_exhaustive()
    }
}
