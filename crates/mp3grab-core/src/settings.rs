//! Process-wide presentation settings.
//!
//! Theme and language live here so the presentation layer has one place to
//! read them from. They are initialized to defaults at process start,
//! mutated only by explicit update calls, and have no interaction with
//! conversion job state: the store is never touched by the worker driving a
//! job.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Theme setting for the application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Dark theme (default).
    #[default]
    Dark,
    /// Light theme.
    Light,
}

impl std::fmt::Display for Theme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dark => write!(f, "Dark"),
            Self::Light => write!(f, "Light"),
        }
    }
}

/// Interface language for the application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English (default).
    #[default]
    En,
    /// Italian.
    It,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::En => write!(f, "en"),
            Self::It => write!(f, "it"),
        }
    }
}

/// Presentation settings snapshot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Settings {
    /// Theme preference.
    #[serde(default)]
    pub theme: Theme,
    /// Interface language.
    #[serde(default)]
    pub language: Language,
}

/// In-memory settings store.
///
/// Not persisted; lives for the duration of the process.
#[derive(Debug, Default)]
pub struct SettingsStore {
    settings: Settings,
}

impl SettingsStore {
    /// Create a store with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current settings.
    #[must_use]
    pub const fn settings(&self) -> Settings {
        self.settings
    }

    /// Replace the settings wholesale.
    pub fn update(&mut self, settings: Settings) {
        self.settings = settings;
        info!(
            "Settings updated: theme={}, language={}",
            settings.theme, settings.language
        );
    }

    /// Set just the theme.
    pub fn set_theme(&mut self, theme: Theme) {
        self.settings.theme = theme;
        info!("Theme set to {}", theme);
    }

    /// Set just the language.
    pub fn set_language(&mut self, language: Language) {
        self.settings.language = language;
        info!("Language set to {}", language);
    }
}
