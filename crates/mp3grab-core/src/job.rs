//! Conversion job data model and state machine.
//!
//! A [`ConversionJob`] is the unit of work: one source URL, one output
//! directory, one pass through the job state machine. The legal transitions
//! are:
//!
//! ```text
//! Idle -> ResolvingMetadata
//! ResolvingMetadata -> AwaitingConfirmation | Failed
//! AwaitingConfirmation -> Converting | Cancelled
//! Converting -> Completed | Failed
//! ```
//!
//! `Completed`, `Failed` and `Cancelled` are terminal; a job never restarts
//! and a terminal job never transitions again.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Unique identifier for a conversion job.
pub type JobId = u64;

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job has been created but not started.
    Idle,
    /// Looking up display metadata for the source URL.
    ResolvingMetadata,
    /// Metadata is known; waiting for the user to confirm or decline.
    AwaitingConfirmation,
    /// Fetching and transcoding the audio stream.
    Converting,
    /// Conversion finished successfully.
    Completed,
    /// Conversion failed at some point.
    Failed,
    /// The user declined the conversion.
    Cancelled,
}

impl JobState {
    /// Check whether this state is terminal (no further transitions allowed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check whether the legal transition table permits `self -> next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::ResolvingMetadata)
                | (
                    Self::ResolvingMetadata,
                    Self::AwaitingConfirmation | Self::Failed
                )
                | (
                    Self::AwaitingConfirmation,
                    Self::Converting | Self::Cancelled
                )
                | (Self::Converting, Self::Completed | Self::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::ResolvingMetadata => write!(f, "ResolvingMetadata"),
            Self::AwaitingConfirmation => write!(f, "AwaitingConfirmation"),
            Self::Converting => write!(f, "Converting"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
            Self::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A single URL-to-MP3 conversion job with its tracked progress and outcome.
///
/// The controller hands out clones of this struct as snapshots; the live
/// instance is owned by the controller's job slot and mutated only by the
/// runner driving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionJob {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Source media URL. Non-empty, immutable after creation.
    pub source_url: String,
    /// Resolved track title. `None` until metadata resolution succeeds.
    pub title: Option<String>,
    /// Current lifecycle state.
    pub state: JobState,
    /// Download progress (0.0 - 100.0), only meaningful while `Converting`.
    /// Monotonically non-decreasing within a single `Converting` phase.
    pub progress_percent: f64,
    /// Error message, set if and only if the job failed.
    pub error_detail: Option<String>,
    /// Path of the produced MP3 file, set on successful completion.
    pub output_path: Option<PathBuf>,
    /// Timestamp when the job was created (Unix millis).
    pub created_at: u64,
    /// Timestamp when conversion started (Unix millis).
    pub started_at: Option<u64>,
    /// Timestamp when the job reached a terminal state (Unix millis).
    pub finished_at: Option<u64>,
}

/// Current time as Unix milliseconds.
pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl ConversionJob {
    /// Create a new job in the `Idle` state.
    #[must_use]
    pub fn new(id: JobId, source_url: impl Into<String>) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            title: None,
            state: JobState::Idle,
            progress_percent: 0.0,
            error_detail: None,
            output_path: None,
            created_at: unix_millis(),
            started_at: None,
            finished_at: None,
        }
    }

    /// Check if the job is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Display name for this job: the resolved title, or the URL before
    /// resolution has happened.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.source_url)
    }

    /// Move the job to `next`, enforcing the state machine.
    ///
    /// Entering `Converting` stamps `started_at` and resets the progress to
    /// zero; entering a terminal state stamps `finished_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalTransition`] if the transition is not in the
    /// legal edge set, including any transition out of a terminal state.
    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::IllegalTransition {
                from: self.state,
                to: next,
            });
        }

        self.state = next;
        match next {
            JobState::Converting => {
                self.started_at = Some(unix_millis());
                self.progress_percent = 0.0;
            }
            JobState::Completed | JobState::Failed | JobState::Cancelled => {
                self.finished_at = Some(unix_millis());
            }
            _ => {}
        }
        Ok(())
    }
}

/// Event types published while a job is driven to completion.
///
/// Events travel over a channel from the worker to the controller's
/// subscriber; the live job object itself is never shared across execution
/// contexts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum JobEvent {
    /// The job entered a new lifecycle state.
    StateChanged {
        /// The job ID.
        job_id: JobId,
        /// The state that was entered.
        state: JobState,
    },
    /// Metadata resolution succeeded.
    MetadataResolved {
        /// The job ID.
        job_id: JobId,
        /// The resolved track title.
        title: String,
    },
    /// A normalized progress sample, emitted only while `Converting`.
    Progress {
        /// The job ID.
        job_id: JobId,
        /// Bounded percentage (0.0 - 100.0), never decreasing within a job.
        percent: f64,
    },
    /// The job finished successfully.
    Completed {
        /// The job ID.
        job_id: JobId,
        /// Path of the produced MP3 file.
        output_path: PathBuf,
    },
    /// The job failed.
    Failed {
        /// The job ID.
        job_id: JobId,
        /// The engine's error message, verbatim.
        error: String,
    },
    /// The user declined the conversion.
    Cancelled {
        /// The job ID.
        job_id: JobId,
    },
}
