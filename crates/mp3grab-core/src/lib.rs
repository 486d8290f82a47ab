//! MP3Grab Core Library
//!
//! This crate provides the conversion pipeline behind MP3Grab: submit a
//! remote media URL, get a locally stored MP3 file. The pieces:
//! - Source URL validation and read-only metadata resolution
//! - A confirmation gate between resolution and any data transfer
//! - A single-job controller that rejects concurrent starts
//! - An async runner that keeps the blocking fetch+transcode work off the
//!   caller's thread and publishes bounded, monotone progress
//! - Process-wide presentation settings (theme, language)
//!
//! # Error Handling
//!
//! This crate uses a typed error enum with a crate-wide result alias. See
//! the [`error`] module for details. Engine failures carry the engine's own
//! message verbatim; the core never retries.
//!
//! ```rust,ignore
//! use mp3grab_core::{JobController, Result};
//!
//! async fn convert(controller: &JobController, url: &str) -> Result<()> {
//!     let job_id = controller.start_job(url).await?;
//!     // ... await the AwaitingConfirmation event ...
//!     controller.confirm(job_id, true).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod job;
pub mod progress;
pub mod resolver;
pub mod runner;
pub mod settings;

pub use config::{ConverterConfig, DEFAULT_BITRATE_KBPS, default_download_directory};
pub use controller::JobController;
pub use engine::{
    ConversionEngine, ConversionRequest, EngineProgress, EngineProgressCallback, RustyYtdlEngine,
    sanitize_filename,
};
pub use error::{Error, Result};
pub use job::{ConversionJob, JobEvent, JobId, JobState};
pub use progress::{ProgressGauge, normalize_percent};
pub use resolver::{
    MetadataResolver, RustyYtdlResolver, TrackInfo, extract_video_id, validate_source_url,
};
pub use runner::JobRunner;
pub use settings::{Language, Settings, SettingsStore, Theme};
