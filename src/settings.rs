//! Persisted save-directory settings.
//!
//! The file is a small JSON document grouped under a parent key:
//!
//! ```json
//! { "SaveDirectories": { "VideoDir": "...", "PictureDir": "..." } }
//! ```
//!
//! Capture code only ever sees the two resolved strings through
//! `SettingsProvider`; it never reads the file itself.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const SAVE_DIRECTORIES: &str = "SaveDirectories";
pub const VIDEO_DIR: &str = "VideoDir";
pub const PICTURE_DIR: &str = "PictureDir";
pub const SETTINGS_FILE: &str = "SaveDirectory.json";

/// Profile prefix that older settings files were written with. Replaced
/// with the current user's home on load.
const LEGACY_PROFILE_PREFIX: &str = "C:\\Users\\nicol";

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Settings file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The two directory strings, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveDirectories {
    #[serde(rename = "VideoDir", default)]
    pub video_dir: String,
    #[serde(rename = "PictureDir", default)]
    pub picture_dir: String,
}

/// Read-only view of the configured directories.
pub trait SettingsProvider: Send + Sync {
    fn video_dir(&self) -> String;
    fn picture_dir(&self) -> String;
}

impl SettingsProvider for SaveDirectories {
    fn video_dir(&self) -> String {
        self.video_dir.clone()
    }

    fn picture_dir(&self) -> String {
        self.picture_dir.clone()
    }
}

/// Settings stored in a JSON file on disk.
#[derive(Debug, Clone)]
pub struct JsonSettings {
    path: PathBuf,
    home: Option<PathBuf>,
}

impl JsonSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            home: dirs::home_dir(),
        }
    }

    /// `SaveDirectory.json` next to the running executable.
    pub fn beside_executable() -> Self {
        let dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(dir.join(SETTINGS_FILE))
    }

    /// Overrides the home directory used for legacy path rewriting.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads both directories. A missing file yields empty strings.
    pub fn load(&self) -> Result<SaveDirectories, SettingsError> {
        if !self.path.exists() {
            log::info!("[SETTINGS] No settings file at {}, using defaults", self.path.display());
            return Ok(SaveDirectories::default());
        }

        let root: Value = serde_json::from_str(&std::fs::read_to_string(&self.path)?)?;
        let mut dirs: SaveDirectories = root
            .get(SAVE_DIRECTORIES)
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .unwrap_or_default();

        if let Some(home) = &self.home {
            let home = home.to_string_lossy();
            dirs.video_dir = dirs.video_dir.replace(LEGACY_PROFILE_PREFIX, &home);
            dirs.picture_dir = dirs.picture_dir.replace(LEGACY_PROFILE_PREFIX, &home);
        }

        log::info!(
            "[SETTINGS] Loaded VideoDir: {:?}, PictureDir: {:?}",
            dirs.video_dir,
            dirs.picture_dir
        );
        Ok(dirs)
    }

    /// Like `load`, but logs and falls back to empty directories.
    pub fn load_or_default(&self) -> SaveDirectories {
        self.load().unwrap_or_else(|e| {
            log::error!("[SETTINGS] Error loading settings: {}", e);
            SaveDirectories::default()
        })
    }

    /// Sets `parent.key = value`, creating the file and the parent object
    /// as needed, and writes the document back indented.
    pub fn update_key(&self, parent: &str, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut root = if self.path.exists() {
            match serde_json::from_str::<Value>(&std::fs::read_to_string(&self.path)?)? {
                Value::Object(map) => map,
                _ => Map::new(),
            }
        } else {
            Map::new()
        };

        let group = root
            .entry(parent.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !group.is_object() {
            *group = Value::Object(Map::new());
        }
        if let Value::Object(group) = group {
            group.insert(key.to_string(), Value::String(value.to_string()));
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&Value::Object(root))?)?;

        log::info!("[SETTINGS] Updated {}.{}: {}", parent, key, value);
        Ok(())
    }
}

impl SettingsProvider for JsonSettings {
    fn video_dir(&self) -> String {
        self.load_or_default().video_dir
    }

    fn picture_dir(&self) -> String {
        self.load_or_default().picture_dir
    }
}
