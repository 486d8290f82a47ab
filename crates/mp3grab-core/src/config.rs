//! Converter configuration management.
//!
//! Handles loading, saving, and managing process-wide converter settings:
//! where MP3 files land, the target bitrate, and where the external
//! transcoder binary lives.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Default MP3 bitrate in kbps.
pub const DEFAULT_BITRATE_KBPS: u32 = 192;

/// Converter configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConverterConfig {
    /// Directory where converted MP3 files are written.
    pub download_directory: PathBuf,
    /// Target MP3 bitrate in kbps.
    #[serde(default = "default_bitrate")]
    pub bitrate_kbps: u32,
    /// Explicit path to the ffmpeg binary. `None` resolves `ffmpeg` from
    /// `PATH`.
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
}

const fn default_bitrate() -> u32 {
    DEFAULT_BITRATE_KBPS
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            download_directory: default_download_directory(),
            bitrate_kbps: DEFAULT_BITRATE_KBPS,
            ffmpeg_path: None,
        }
    }
}

impl ConverterConfig {
    /// Load configuration from disk, or create default if not found.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    pub fn load() -> Result<Self> {
        let config_path = config_file_path();

        if !config_path.exists() {
            debug!("Config file not found, using defaults");
            let config = Self::default();
            if let Err(e) = config.save() {
                warn!("Failed to save default config: {}", e);
            }
            return Ok(config);
        }

        let content = fs::read_to_string(&config_path).map_err(|e| Error::FileSystem {
            path: config_path.clone(),
            message: format!("Failed to read config file: {e}"),
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        info!("Loaded config from {}", config_path.display());
        debug!(
            "Download directory: {}",
            config.download_directory.display()
        );

        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save(&self) -> Result<()> {
        let config_path = config_file_path();

        if let Some(parent) = config_path.parent()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| Error::FileSystem {
                path: parent.to_path_buf(),
                message: format!("Failed to create config directory: {e}"),
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, content).map_err(|e| Error::FileSystem {
            path: config_path.clone(),
            message: format!("Failed to write config file: {e}"),
        })?;

        info!("Saved config to {}", config_path.display());
        Ok(())
    }

    /// Update the download directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory is invalid or not writable.
    pub fn set_download_directory(&mut self, path: PathBuf) -> Result<()> {
        validate_download_directory(&path)?;
        self.download_directory = path;
        info!(
            "Updated download directory to: {}",
            self.download_directory.display()
        );
        Ok(())
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

/// Get the default download directory.
#[must_use]
pub fn default_download_directory() -> PathBuf {
    dirs::download_dir()
        .or_else(dirs::audio_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mp3grab")
}

/// Get the path to the config file.
fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("mp3grab")
        .join("config.json")
}

/// Validate that a directory is suitable for storing converted files,
/// creating it if it does not exist yet.
pub(crate) fn validate_download_directory(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Configuration(
            "Download directory must not be empty".to_string(),
        ));
    }

    if path.exists() {
        if !path.is_dir() {
            return Err(Error::Configuration(format!(
                "Path exists but is not a directory: {}",
                path.display()
            )));
        }

        let test_file = path.join(".mp3grab_write_test");
        match fs::write(&test_file, "test") {
            Ok(()) => {
                let _ = fs::remove_file(&test_file);
            }
            Err(e) => {
                return Err(Error::Configuration(format!(
                    "Directory is not writable: {} ({})",
                    path.display(),
                    e
                )));
            }
        }
    } else {
        fs::create_dir_all(path).map_err(|e| {
            Error::Configuration(format!("Cannot create directory {}: {}", path.display(), e))
        })?;
    }

    Ok(())
}
