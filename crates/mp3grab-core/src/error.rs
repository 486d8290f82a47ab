//! Error types for MP3Grab core operations.

use std::path::PathBuf;
use thiserror::Error;

use crate::job::{JobId, JobState};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in MP3Grab core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The source URL is empty or malformed. Rejected before any engine call.
    #[error("Invalid source URL: {reason}")]
    InvalidUrl {
        /// The offending URL as given by the caller.
        url: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// Metadata lookup failed. The engine's message is carried verbatim.
    #[error("Metadata resolution failed: {0}")]
    Resolution(String),

    /// The fetch or transcode step failed. The engine's message is carried
    /// verbatim, including missing transcoder binary and disk errors.
    #[error("Conversion failed: {0}")]
    Transcode(String),

    /// A conversion job is already active.
    #[error("A conversion is already in progress")]
    Busy,

    /// No conversion job exists to act on.
    #[error("No active conversion job")]
    NoActiveJob,

    /// The given job ID does not match the active job.
    #[error("No conversion job with id {0}")]
    JobNotFound(JobId),

    /// Confirmation was submitted while the job was not waiting for it.
    #[error("Job {job_id} is not awaiting confirmation (state: {state})")]
    NotAwaitingConfirmation {
        /// The job the caller tried to confirm.
        job_id: JobId,
        /// The state the job was actually in.
        state: JobState,
    },

    /// A state transition outside the job state machine was attempted.
    #[error("Illegal job state transition: {from} -> {to}")]
    IllegalTransition {
        /// State the job was in.
        from: JobState,
        /// State that was requested.
        to: JobState,
    },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// File system operation failed.
    #[error("File system error at {path}: {message}")]
    FileSystem {
        /// Path where the error occurred.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
