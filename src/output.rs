//! Output file naming and directory resolution.
//!
//! File names must stay byte-compatible with files already on users'
//! disks: `{Prefix}_{yyyyMMdd_HHmmss}.{ext}` in local time.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

/// Kinds of files the app writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Video,
    Screenshot,
    RegionScreenshot,
    BatchDocument,
}

impl OutputKind {
    pub fn prefix(self) -> &'static str {
        match self {
            OutputKind::Video => "Recorder",
            OutputKind::Screenshot => "Capture",
            OutputKind::RegionScreenshot => "CaptureP",
            OutputKind::BatchDocument => "Screenshots",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputKind::Video => "mp4",
            OutputKind::Screenshot | OutputKind::RegionScreenshot => "png",
            OutputKind::BatchDocument => "pdf",
        }
    }
}

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// `Recorder_20250101_093000.mp4` and friends.
pub fn timestamped_name(kind: OutputKind, at: DateTime<Local>) -> String {
    format!(
        "{}_{}.{}",
        kind.prefix(),
        at.format(TIMESTAMP_FORMAT),
        kind.extension()
    )
}

/// Uses `configured` when it is non-empty and an existing directory,
/// otherwise `fallback`.
pub fn resolve_output_dir(configured: &str, fallback: &Path) -> PathBuf {
    let trimmed = configured.trim();
    if !trimmed.is_empty() {
        let candidate = PathBuf::from(trimmed);
        if candidate.is_dir() {
            return candidate;
        }
        log::warn!(
            "[OUTPUT] Configured directory {:?} does not exist, using {}",
            trimmed,
            fallback.display()
        );
    }
    fallback.to_path_buf()
}

/// Folder names of the default tree. `Screenshoots` is misspelled on
/// existing installs and has to stay that way.
pub const VIDEOS_DIR: &str = "Videos";
pub const SCREENSHOTS_DIR: &str = "Screenshoots";
pub const LOGS_DIR: &str = "Logs";

/// Default directory tree under the user's home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultDirs {
    pub root: PathBuf,
    pub videos: PathBuf,
    pub screenshots: PathBuf,
    pub logs: PathBuf,
}

impl DefaultDirs {
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            videos: root.join(VIDEOS_DIR),
            screenshots: root.join(SCREENSHOTS_DIR),
            logs: root.join(LOGS_DIR),
            root,
        }
    }

    /// `~/QAFlow`, or `./QAFlow` when no home directory is known.
    pub fn for_user() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::under(home.join("QAFlow"))
    }

    /// Creates any missing directory of the tree.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [&self.root, &self.videos, &self.screenshots, &self.logs] {
            if !dir.is_dir() {
                std::fs::create_dir_all(dir)?;
                log::info!("[OUTPUT] Created {}", dir.display());
            }
        }
        Ok(())
    }
}
