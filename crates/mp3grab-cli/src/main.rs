//! Command-line front end for MP3Grab.
//!
//! Thin shell around `mp3grab-core`: parses arguments, bootstraps logging,
//! starts a conversion job, relays the confirmation prompt, and renders
//! progress events. All pipeline logic lives in the core crate.

mod logging;

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use mp3grab_core::{
    ConverterConfig, JobController, JobEvent, Language, RustyYtdlEngine, RustyYtdlResolver,
    SettingsStore, Theme,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

/// MP3Grab - convert a remote media URL to a local MP3 file.
#[derive(Parser, Debug)]
#[command(name = "mp3grab")]
#[command(version)]
#[command(about = "Convert a remote media URL to a local MP3 file", long_about = None)]
struct Cli {
    /// Source media URL
    url: String,

    /// Output directory (defaults to the configured download directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Target MP3 bitrate in kbps
    #[arg(short, long)]
    bitrate: Option<u32>,

    /// Path to the ffmpeg binary (defaults to `ffmpeg` on PATH)
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// Convert without asking for confirmation
    #[arg(short = 'y', long)]
    yes: bool,

    /// Interface language
    #[arg(long, value_enum, default_value_t = LanguageArg::En)]
    lang: LanguageArg,

    /// Theme preference, recorded in the presentation settings
    #[arg(long, value_enum, default_value_t = ThemeArg::Dark)]
    theme: ThemeArg,
}

/// Interface language choices.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LanguageArg {
    /// English.
    En,
    /// Italian.
    It,
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::En => Self::En,
            LanguageArg::It => Self::It,
        }
    }
}

/// Theme choices.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeArg {
    /// Dark theme.
    Dark,
    /// Light theme.
    Light,
}

impl From<ThemeArg> for Theme {
    fn from(value: ThemeArg) -> Self {
        match value {
            ThemeArg::Dark => Self::Dark,
            ThemeArg::Light => Self::Light,
        }
    }
}

/// Localized user-facing strings.
struct Messages {
    resolving: &'static str,
    found: &'static str,
    confirm: &'static str,
    converting: &'static str,
    completed: &'static str,
    cancelled: &'static str,
    failed: &'static str,
}

impl Messages {
    const fn for_language(language: Language) -> Self {
        match language {
            Language::En => Self {
                resolving: "Looking up track info...",
                found: "Found",
                confirm: "Convert to MP3?",
                converting: "Converting",
                completed: "Saved",
                cancelled: "Cancelled.",
                failed: "Error",
            },
            Language::It => Self {
                resolving: "Ricerca informazioni sulla traccia...",
                found: "Trovato",
                confirm: "Convertire in MP3?",
                converting: "Conversione",
                completed: "Salvato",
                cancelled: "Annullato.",
                failed: "Errore",
            },
        }
    }
}

/// Ask a yes/no question on stdin. Anything but an explicit yes declines.
async fn ask_confirmation(prompt: &str) -> bool {
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    let mut reader = BufReader::new(tokio::io::stdin());
    match reader.read_line(&mut line).await {
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "si"),
        Err(_) => false,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _log_guard = match logging::init_auto() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: logging unavailable: {e}");
            None
        }
    };

    let mut config = ConverterConfig::load().unwrap_or_else(|e| {
        warn!("Falling back to default config: {}", e);
        ConverterConfig::default()
    });
    if let Some(output_dir) = cli.output_dir {
        config.download_directory = output_dir;
    }
    if let Some(bitrate) = cli.bitrate {
        config.bitrate_kbps = bitrate;
    }
    if let Some(ffmpeg) = cli.ffmpeg {
        config.ffmpeg_path = Some(ffmpeg);
    }

    let mut settings = SettingsStore::new();
    settings.set_language(cli.lang.into());
    settings.set_theme(cli.theme.into());
    let messages = Messages::for_language(settings.settings().language);

    let engine = RustyYtdlEngine::with_ffmpeg_path(config.ffmpeg_path.clone());
    let controller = match JobController::new(
        &config,
        Arc::new(RustyYtdlResolver::new()),
        Arc::new(engine),
    ) {
        Ok(controller) => controller,
        Err(e) => {
            eprintln!("{}: {e}", messages.failed);
            return ExitCode::FAILURE;
        }
    };

    let job_id = match controller.start_job(&cli.url).await {
        Ok(job_id) => job_id,
        Err(e) => {
            eprintln!("{}: {e}", messages.failed);
            return ExitCode::FAILURE;
        }
    };

    println!("{}", messages.resolving);

    while let Some(event) = controller.recv_event().await {
        match event {
            JobEvent::MetadataResolved { title, .. } => {
                println!("{}: {title}", messages.found);
                let accept = cli.yes || ask_confirmation(messages.confirm).await;
                if let Err(e) = controller.confirm(job_id, accept).await {
                    eprintln!("{}: {e}", messages.failed);
                    return ExitCode::FAILURE;
                }
            }
            JobEvent::Progress { percent, .. } => {
                print!("\r{}: {percent:5.1}%", messages.converting);
                let _ = std::io::stdout().flush();
            }
            JobEvent::Completed { output_path, .. } => {
                println!();
                println!("{}: {}", messages.completed, output_path.display());
                return ExitCode::SUCCESS;
            }
            JobEvent::Failed { error, .. } => {
                println!();
                eprintln!("{}: {error}", messages.failed);
                return ExitCode::FAILURE;
            }
            JobEvent::Cancelled { .. } => {
                println!("{}", messages.cancelled);
                return ExitCode::SUCCESS;
            }
            JobEvent::StateChanged { .. } => {}
        }
    }

    ExitCode::FAILURE
}
