//! Fetch and transcode engine boundary.
//!
//! The engine is the one blocking call of the `Converting` phase: it pulls
//! the best available audio stream for a source URL, transcodes it to MP3 at
//! a fixed bitrate, and writes the result into the output directory named
//! after the resolved title. Progress is reported per downloaded chunk
//! through a callback; any failure surfaces with the underlying message
//! intact so the caller can show it verbatim.
//!
//! The default implementation downloads with `rusty_ytdl` (pure Rust) and
//! shells out to `ffmpeg` for the MP3 encode.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use id3::{Tag, TagLike, Version};
use rusty_ytdl::{Video, VideoOptions, VideoQuality, VideoSearchOptions};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// A raw progress sample from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineProgress {
    /// Bytes downloaded so far for the current transfer.
    pub bytes_downloaded: u64,
    /// Total bytes of the transfer, if the engine knows it.
    pub bytes_total: Option<u64>,
}

/// Progress callback invoked on every downloaded chunk.
pub type EngineProgressCallback = Box<dyn Fn(EngineProgress) + Send + Sync>;

/// Everything the engine needs to produce one MP3 file.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Source media URL.
    pub source_url: String,
    /// Directory the MP3 file is written into.
    pub output_dir: PathBuf,
    /// Resolved track title; becomes the output filename and the ID3 title.
    pub title: String,
    /// Uploader/channel name for the ID3 artist frame.
    pub artist: Option<String>,
    /// Target MP3 bitrate in kbps.
    pub bitrate_kbps: u32,
}

impl ConversionRequest {
    /// Path of the MP3 file this request produces.
    ///
    /// Same-titled requests map to the same path and silently overwrite.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.output_dir
            .join(format!("{}.mp3", sanitize_filename(&self.title)))
    }
}

/// Fetch+transcode engine trait for testability.
#[cfg_attr(test, mockall::automock)]
pub trait ConversionEngine: Send + Sync {
    /// Fetch the source's audio stream, transcode it to MP3, and return the
    /// path of the produced file.
    ///
    /// Blocking; run it on a worker. The callback fires once per downloaded
    /// chunk, in emission order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transcode`] on any failure - network, disk, missing
    /// transcoder binary, unsupported source - with the underlying message
    /// preserved.
    fn fetch_and_transcode(
        &self,
        request: &ConversionRequest,
        progress: Option<EngineProgressCallback>,
    ) -> Result<PathBuf>;
}

/// Sanitize a string for use as a filename.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

    let sanitized: String = name
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect();

    // Trim whitespace and dots from ends
    let trimmed = sanitized.trim().trim_matches('.');

    // Limit length (leaving room for extension)
    if trimmed.len() > 200 {
        trimmed[..200].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Engine backed by `rusty_ytdl` for fetching and `ffmpeg` for the encode.
#[derive(Debug, Default)]
pub struct RustyYtdlEngine {
    /// Explicit ffmpeg location. `None` resolves `ffmpeg` from `PATH`.
    ffmpeg_path: Option<PathBuf>,
}

impl RustyYtdlEngine {
    /// Create an engine that resolves `ffmpeg` from `PATH`.
    #[must_use]
    pub const fn new() -> Self {
        Self { ffmpeg_path: None }
    }

    /// Create an engine with an explicit ffmpeg binary location.
    #[must_use]
    pub const fn with_ffmpeg_path(ffmpeg_path: Option<PathBuf>) -> Self {
        Self { ffmpeg_path }
    }

    fn ffmpeg_command(&self) -> Command {
        match &self.ffmpeg_path {
            Some(path) => Command::new(path),
            None => Command::new("ffmpeg"),
        }
    }

    /// Download the best available audio stream to `audio_path`, reporting a
    /// progress sample per chunk.
    async fn fetch_audio(
        source_url: &str,
        audio_path: &Path,
        progress: Option<&EngineProgressCallback>,
    ) -> Result<()> {
        let video_opts = VideoOptions {
            quality: VideoQuality::HighestAudio,
            filter: VideoSearchOptions::Audio,
            ..Default::default()
        };

        let video = Video::new_with_options(source_url, video_opts)
            .map_err(|e| Error::Transcode(e.to_string()))?;

        let stream = video
            .stream()
            .await
            .map_err(|e| Error::Transcode(e.to_string()))?;

        let content_length = stream.content_length() as u64;
        let bytes_total = (content_length > 0).then_some(content_length);
        debug!("Audio stream content length: {} bytes", content_length);

        let mut file = std::fs::File::create(audio_path).map_err(|e| {
            Error::Transcode(format!(
                "Failed to create {}: {e}",
                audio_path.display()
            ))
        })?;

        let mut bytes_downloaded = 0u64;
        while let Some(chunk) = stream
            .chunk()
            .await
            .map_err(|e| Error::Transcode(e.to_string()))?
        {
            bytes_downloaded += chunk.len() as u64;
            file.write_all(&chunk).map_err(|e| {
                Error::Transcode(format!(
                    "Failed to write {}: {e}",
                    audio_path.display()
                ))
            })?;

            if let Some(callback) = progress {
                callback(EngineProgress {
                    bytes_downloaded,
                    bytes_total,
                });
            }
        }

        info!(
            "Downloaded {} bytes to {}",
            bytes_downloaded,
            audio_path.display()
        );
        Ok(())
    }

    /// Transcode the downloaded stream to MP3 at the requested bitrate.
    fn transcode_to_mp3(&self, input: &Path, output: &Path, bitrate_kbps: u32) -> Result<()> {
        let output_result = self
            .ffmpeg_command()
            .args(["-nostdin", "-y"])
            .arg("-i")
            .arg(input)
            .arg("-vn")
            .args(["-c:a", "libmp3lame"])
            .args(["-b:a", &format!("{bitrate_kbps}k")])
            .arg(output)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::Transcode(
                    "ffmpeg binary not found; install ffmpeg or set its path in the configuration"
                        .to_string(),
                ),
                _ => Error::Transcode(format!("Failed to run ffmpeg: {e}")),
            })?;

        if !output_result.status.success() {
            return Err(Error::Transcode(format!(
                "ffmpeg exited with code {:?}: {}",
                output_result.status.code(),
                String::from_utf8_lossy(&output_result.stderr).trim()
            )));
        }

        Ok(())
    }

    /// Write ID3 title/artist frames onto the produced file.
    ///
    /// Tag failures do not fail the conversion; the audio is already there.
    fn tag_output(path: &Path, title: &str, artist: Option<&str>) {
        let mut tag = Tag::new();
        tag.set_title(title);
        if let Some(artist) = artist {
            tag.set_artist(artist);
        }
        if let Err(e) = tag.write_to_path(path, Version::Id3v24) {
            warn!("Failed to write ID3 tag to {}: {}", path.display(), e);
        }
    }

    /// Async implementation of the full fetch+transcode pass.
    async fn fetch_and_transcode_async(
        &self,
        request: &ConversionRequest,
        progress: Option<EngineProgressCallback>,
    ) -> Result<PathBuf> {
        let output_path = request.output_path();
        let audio_path = output_path.with_extension("audio.tmp");

        info!(
            "Converting {} -> {}",
            request.source_url,
            output_path.display()
        );

        let fetched = Self::fetch_audio(
            &request.source_url,
            &audio_path,
            progress.as_ref(),
        )
        .await;

        if let Err(e) = fetched {
            let _ = std::fs::remove_file(&audio_path);
            return Err(e);
        }

        let transcoded = self.transcode_to_mp3(&audio_path, &output_path, request.bitrate_kbps);

        if let Err(e) = std::fs::remove_file(&audio_path) {
            warn!(
                "Failed to remove temporary file {}: {}",
                audio_path.display(),
                e
            );
        }
        transcoded?;

        Self::tag_output(&output_path, &request.title, request.artist.as_deref());

        info!("Conversion finished: {}", output_path.display());
        Ok(output_path)
    }
}

impl ConversionEngine for RustyYtdlEngine {
    fn fetch_and_transcode(
        &self,
        request: &ConversionRequest,
        progress: Option<EngineProgressCallback>,
    ) -> Result<PathBuf> {
        // Reuse the surrounding runtime when called from spawn_blocking,
        // otherwise bring up a throwaway one.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            tokio::task::block_in_place(|| {
                handle.block_on(self.fetch_and_transcode_async(request, progress))
            })
        } else {
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| Error::Transcode(format!("Failed to create tokio runtime: {e}")))?;
            rt.block_on(self.fetch_and_transcode_async(request, progress))
        }
    }
}
