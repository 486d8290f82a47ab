//! Source URL validation and metadata resolution.
//!
//! Resolution is a read-only lookup against the fetch engine: it returns the
//! track title (and whatever else the engine knows) without transferring any
//! media. Callers rely on this to show a confirmation step before the first
//! byte of audio is downloaded.

use regex::Regex;
use rusty_ytdl::Video;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Display metadata for a single track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackInfo {
    /// Engine-side identifier of the track.
    pub id: String,
    /// Track title.
    pub title: String,
    /// Track duration in seconds.
    pub duration_secs: Option<u64>,
    /// Channel/uploader name.
    pub channel: Option<String>,
    /// Thumbnail URL for the track.
    pub thumbnail_url: Option<String>,
}

/// Validate a source URL before any engine call.
///
/// Only syntactic checks happen here: the URL must be non-empty and carry an
/// http(s) scheme. Whether the target actually exists is the resolver's
/// business and surfaces later as a resolution error.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] for empty or malformed input.
pub fn validate_source_url(url: &str) -> Result<()> {
    let trimmed = url.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl {
            url: url.to_string(),
            reason: "URL cannot be empty".to_string(),
        });
    }

    let lower = trimmed.to_lowercase();
    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        return Err(Error::InvalidUrl {
            url: url.to_string(),
            reason: "URL must start with http:// or https://".to_string(),
        });
    }

    Ok(())
}

/// Extract a video ID from the common YouTube URL shapes.
///
/// Supports `youtube.com/watch?v=...`, `youtu.be/...` and
/// `youtube.com/shorts/...`. Returns `None` for anything else; such URLs are
/// handed to the engine untouched.
#[must_use]
pub fn extract_video_id(url: &str) -> Option<String> {
    let patterns = [
        r"youtube\.com/watch\?(?:[^#]*&)?v=([A-Za-z0-9_-]{11})",
        r"youtu\.be/([A-Za-z0-9_-]{11})",
        r"youtube\.com/shorts/([A-Za-z0-9_-]{11})",
    ];

    for pattern in patterns {
        if let Ok(re) = Regex::new(pattern)
            && let Some(caps) = re.captures(url)
        {
            return caps.get(1).map(|m| m.as_str().to_string());
        }
    }

    None
}

/// Metadata resolver trait for testability.
#[cfg_attr(test, mockall::automock)]
pub trait MetadataResolver: Send + Sync {
    /// Look up display metadata for a source URL without downloading media.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if the source is unreachable, private,
    /// removed, or the engine rejects the URL.
    fn resolve(&self, url: &str) -> Result<TrackInfo>;
}

/// Metadata resolver backed by `rusty_ytdl`.
///
/// Pure Rust; queries the video info endpoint only, never a media stream.
#[derive(Debug, Default)]
pub struct RustyYtdlResolver;

impl RustyYtdlResolver {
    /// Create a new resolver.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Canonical watch URL for a recognized video ID, or the input untouched.
    fn canonical_url(url: &str) -> String {
        extract_video_id(url).map_or_else(
            || url.trim().to_string(),
            |id| format!("https://www.youtube.com/watch?v={id}"),
        )
    }

    /// Async implementation of the metadata lookup.
    async fn resolve_async(url: &str) -> Result<TrackInfo> {
        let video_url = Self::canonical_url(url);

        debug!("Resolving metadata for {}", video_url);

        let video = Video::new(&video_url).map_err(|e| Error::Resolution(e.to_string()))?;

        let info = video
            .get_info()
            .await
            .map_err(|e| Error::Resolution(e.to_string()))?;

        let details = &info.video_details;

        Ok(TrackInfo {
            id: details.video_id.clone(),
            title: details.title.clone(),
            duration_secs: details.length_seconds.parse().ok(),
            channel: details.author.as_ref().map(|a| a.name.clone()),
            thumbnail_url: details.thumbnails.last().map(|t| t.url.clone()),
        })
    }
}

impl MetadataResolver for RustyYtdlResolver {
    fn resolve(&self, url: &str) -> Result<TrackInfo> {
        let url_owned = url.to_string();

        // Reuse the surrounding runtime when called from spawn_blocking,
        // otherwise bring up a throwaway one.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| {
                handle.block_on(async move { Self::resolve_async(&url_owned).await })
            })
        } else {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| Error::Resolution(format!("Failed to create tokio runtime: {e}")))?;
            rt.block_on(async move { Self::resolve_async(&url_owned).await })
        }
    }
}
