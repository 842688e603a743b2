//! QAFlow: screen capture and recording core.
//!
//! Wires together:
//! - Screen capture domain (capture/) and region selection (selector/)
//! - Batch store and PNG/PDF export (store.rs, export.rs)
//! - Recording session state machine over a recorder engine (session/, recorder/)
//! - Save-directory settings and output naming (settings.rs, output.rs)
//! - The interactive command console (console.rs)

pub mod capture;
pub mod console;
pub mod export;
pub mod geometry;
pub mod output;
pub mod recorder;
pub mod screenshot;
pub mod selector;
pub mod session;
pub mod settings;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use capture::Capturer;
use console::Console;
use output::DefaultDirs;
use recorder::{FfmpegRecorder, RecorderEngine, UnavailableRecorder};
use screenshot::ScreenshotService;
use session::{RecordingSession, SessionConfig, SystemClock};
use settings::JsonSettings;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Startup failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Startup options gathered by the binary.
#[derive(Debug, Clone, Default)]
pub struct AppOptions {
    /// Settings file; `SaveDirectory.json` beside the executable if unset.
    pub settings_path: Option<PathBuf>,
    /// Root for the default output tree; `~/QAFlow` if unset.
    pub data_root: Option<PathBuf>,
}

/// Builds every component and runs the console on stdin/stdout until
/// `quit` or end of input.
pub async fn run(options: AppOptions) -> Result<(), AppError> {
    log::info!("QAFlow starting up");

    let dirs = match options.data_root {
        Some(root) => DefaultDirs::under(root),
        None => DefaultDirs::for_user(),
    };
    dirs.ensure()?;

    let settings = Arc::new(match options.settings_path {
        Some(path) => JsonSettings::new(path),
        None => JsonSettings::beside_executable(),
    });
    log::info!("[SETTINGS] Using {}", settings.path().display());

    let engine: Box<dyn RecorderEngine> = match FfmpegRecorder::locate() {
        Ok(engine) => Box::new(engine),
        Err(e) => {
            log::warn!("[RECORDER] {}; recording is disabled", e);
            Box::new(UnavailableRecorder::new(e.to_string()))
        }
    };

    let session = RecordingSession::new(
        engine,
        settings.clone(),
        Arc::new(SystemClock),
        SessionConfig::new(&dirs.videos),
    );
    let shots = ScreenshotService::new(Capturer::system(), settings.clone(), &dirs.screenshots);

    let mut console = Console::new(session, shots, settings);
    console
        .run(tokio::io::BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    log::info!("QAFlow shutting down");
    Ok(())
}
