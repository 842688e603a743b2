//! Recorder collaborator interface.
//!
//! The session never encodes video itself. It drives an engine through
//! four commands (create+start, pause, resume, stop) and listens to the
//! engine's asynchronous events, which it only logs and mirrors into an
//! observable status.

pub mod ffmpeg;

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;

pub use ffmpeg::FfmpegRecorder;

/// Encoder settings handed to the engine on start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderOptions {
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    pub framerate: u32,
    pub fixed_framerate: bool,
    /// 0–100, higher is better.
    pub quality: u8,
    pub audio: bool,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            bitrate: 4_000 * 1_000,
            framerate: 30,
            fixed_framerate: false,
            quality: 70,
            audio: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    Idle,
    Recording,
    Paused,
    Finishing,
}

impl std::fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RecorderStatus::Idle => "Idle",
            RecorderStatus::Recording => "Recording",
            RecorderStatus::Paused => "Paused",
            RecorderStatus::Finishing => "Finishing",
        };
        f.write_str(name)
    }
}

/// Asynchronous notifications from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    Complete(PathBuf),
    Failed(String),
    StatusChanged(RecorderStatus),
}

pub type EventSink = mpsc::UnboundedSender<RecorderEvent>;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("Recorder binary not found: {0}")]
    BinaryNotFound(String),

    #[error("Failed to start recorder process: {0}")]
    Spawn(std::io::Error),

    #[error("Recorder I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot {0}: recorder is not running")]
    NotRunning(&'static str),

    #[error("Recorder reported failure: {0}")]
    Failed(String),
}

/// Creates recordings.
pub trait RecorderEngine: Send {
    fn create_and_start(
        &mut self,
        output: &Path,
        options: &EncoderOptions,
        events: EventSink,
    ) -> Result<Box<dyn RecordingHandle>, RecorderError>;
}

/// One in-progress recording.
pub trait RecordingHandle: Send {
    fn pause(&mut self) -> Result<(), RecorderError>;

    fn resume(&mut self) -> Result<(), RecorderError>;

    /// Begins finalization. The finished file is announced later with
    /// `RecorderEvent::Complete` (or `Failed`).
    fn stop(&mut self) -> Result<(), RecorderError>;

    /// Ends the recording without keeping its output. Engines that cannot
    /// throw work away simply stop; the caller removes the file.
    fn discard(&mut self) -> Result<(), RecorderError> {
        self.stop()
    }
}

/// Stand-in when no engine could be set up. Every start fails with the
/// reason it is missing.
#[derive(Debug, Clone)]
pub struct UnavailableRecorder {
    reason: String,
}

impl UnavailableRecorder {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl RecorderEngine for UnavailableRecorder {
    fn create_and_start(
        &mut self,
        _output: &Path,
        _options: &EncoderOptions,
        _events: EventSink,
    ) -> Result<Box<dyn RecordingHandle>, RecorderError> {
        Err(RecorderError::BinaryNotFound(self.reason.clone()))
    }
}
