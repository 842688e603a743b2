//! Line-oriented command console.
//!
//! This is the single control flow: every command runs to completion
//! before the next line is read. Failures are logged and reported on the
//! output, and the loop carries on.

use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::geometry::Rect;
use crate::screenshot::ScreenshotService;
use crate::session::RecordingSession;
use crate::settings::{JsonSettings, PICTURE_DIR, SAVE_DIRECTORIES, VIDEO_DIR};

pub const HELP: &str = "\
Recording:   start | pause | resume | save | cancel | status
Screenshots: shot | shot-region X Y W H
Batch:       add | add-region X Y W H | export | clear | count
Settings:    set-video-dir PATH | set-picture-dir PATH
Other:       help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Pause,
    Resume,
    Save,
    Cancel,
    Status,
    Shot,
    ShotRegion(Rect),
    Add,
    AddRegion(Rect),
    Export,
    Clear,
    Count,
    SetVideoDir(String),
    SetPictureDir(String),
    Help,
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command '{0}' (type 'help')")]
    UnknownCommand(String),

    #[error("'{command}' expects {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("'{0}' is not a valid number")]
    InvalidNumber(String),
}

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, ParseError> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "start" => Command::Start,
        "pause" => Command::Pause,
        "resume" => Command::Resume,
        "save" => Command::Save,
        "cancel" => Command::Cancel,
        "status" => Command::Status,
        "shot" => Command::Shot,
        "shot-region" => Command::ShotRegion(parse_rect("shot-region", words)?),
        "add" => Command::Add,
        "add-region" => Command::AddRegion(parse_rect("add-region", words)?),
        "export" => Command::Export,
        "clear" => Command::Clear,
        "count" => Command::Count,
        "set-video-dir" => Command::SetVideoDir(rest_of_line(line, "set-video-dir")?),
        "set-picture-dir" => Command::SetPictureDir(rest_of_line(line, "set-picture-dir")?),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_rect<'a>(
    command: &'static str,
    words: impl Iterator<Item = &'a str>,
) -> Result<Rect, ParseError> {
    let words: Vec<&str> = words.collect();
    let [x, y, w, h] = words.as_slice() else {
        return Err(ParseError::MissingArgument {
            command,
            expected: "X Y W H",
        });
    };
    let int = |s: &str| s.parse::<i32>().map_err(|_| ParseError::InvalidNumber(s.to_string()));
    let uint = |s: &str| s.parse::<u32>().map_err(|_| ParseError::InvalidNumber(s.to_string()));
    Ok(Rect::new(int(*x)?, int(*y)?, uint(*w)?, uint(*h)?))
}

/// Everything after the command word, so paths may contain spaces.
fn rest_of_line(line: &str, command: &'static str) -> Result<String, ParseError> {
    let rest = line.trim_start();
    let rest = rest[rest.find(char::is_whitespace).unwrap_or(rest.len())..].trim();
    if rest.is_empty() {
        return Err(ParseError::MissingArgument {
            command,
            expected: "a directory path",
        });
    }
    Ok(rest.to_string())
}

pub struct Console {
    session: RecordingSession,
    shots: ScreenshotService,
    settings: Arc<JsonSettings>,
}

impl Console {
    pub fn new(session: RecordingSession, shots: ScreenshotService, settings: Arc<JsonSettings>) -> Self {
        Self {
            session,
            shots,
            settings,
        }
    }

    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    pub fn shots(&self) -> &ScreenshotService {
        &self.shots
    }

    /// Reads commands until `quit` or end of input. A recording still in
    /// progress at that point is saved.
    pub async fn run<R, W>(&mut self, input: R, mut output: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = input.lines();
        write_line(&mut output, "QAFlow ready. Type 'help' for commands.").await?;

        while let Some(line) = lines.next_line().await? {
            let reply = match parse_command(&line) {
                Ok(None) => continue,
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => self.execute(command).await,
                Err(e) => {
                    log::warn!("[CONSOLE] {}", e);
                    e.to_string()
                }
            };
            write_line(&mut output, &reply).await?;
        }

        if self.session.controls().save {
            log::info!("[CONSOLE] Input closed with a recording in progress, saving");
            let reply = match self.session.save().await {
                Ok(Some(path)) => format!("Saved {}", path.display()),
                Ok(None) => "Nothing to save".to_string(),
                Err(e) => failed("save", e),
            };
            write_line(&mut output, &reply).await?;
        }
        Ok(())
    }

    /// Runs one command and returns the text to show.
    pub async fn execute(&mut self, command: Command) -> String {
        match command {
            Command::Start => match self.session.start() {
                Ok(path) => format!("Recording to {}", path.display()),
                Err(e) => failed("start", e),
            },
            Command::Pause => match self.session.pause() {
                Ok(()) => self.status_line(),
                Err(e) => failed("pause", e),
            },
            Command::Resume => match self.session.resume() {
                Ok(()) => self.status_line(),
                Err(e) => failed("resume", e),
            },
            Command::Save => match self.session.save().await {
                Ok(Some(path)) => format!("Saved {}", path.display()),
                Ok(None) => "Nothing to save".to_string(),
                Err(e) => failed("save", e),
            },
            Command::Cancel => match self.session.cancel().await {
                Ok(()) => self.status_line(),
                Err(e) => failed("cancel", e),
            },
            Command::Status => self.status_line(),
            Command::Shot => match self.shots.capture_to_file() {
                Ok(path) => format!("Saved {}", path.display()),
                Err(e) => failed("shot", e),
            },
            Command::ShotRegion(rect) => match self.shots.capture_region_to_file(rect) {
                Ok(path) => format!("Saved {}", path.display()),
                Err(e) => failed("shot-region", e),
            },
            Command::Add => match self.shots.capture_to_batch() {
                Ok(count) => format!("{} image(s) in batch", count),
                Err(e) => failed("add", e),
            },
            Command::AddRegion(rect) => match self.shots.capture_region_to_batch(rect) {
                Ok(count) => format!("{} image(s) in batch", count),
                Err(e) => failed("add-region", e),
            },
            Command::Export => match self.shots.export_batch() {
                Ok(summary) => format!("Exported {} page(s) to {}", summary.pages, summary.path.display()),
                Err(e) => failed("export", e),
            },
            Command::Clear => {
                self.shots.clear_batch();
                "Batch cleared".to_string()
            }
            Command::Count => format!("{} image(s) in batch", self.shots.batch_count()),
            Command::SetVideoDir(dir) => self.set_dir(VIDEO_DIR, &dir),
            Command::SetPictureDir(dir) => self.set_dir(PICTURE_DIR, &dir),
            Command::Help => HELP.to_string(),
            Command::Quit => String::new(),
        }
    }

    fn set_dir(&self, key: &str, dir: &str) -> String {
        match self.settings.update_key(SAVE_DIRECTORIES, key, dir) {
            Ok(()) => format!("{} set to {}", key, dir),
            Err(e) => failed("update settings", e),
        }
    }

    fn status_line(&self) -> String {
        let mut line = format!(
            "{} {} (recorder: {}, batch: {})",
            self.session.state(),
            self.session.published_display(),
            self.session.recorder_status(),
            self.shots.batch_count()
        );
        if let Some(err) = self.session.last_error() {
            line.push_str(&format!(", last error: {}", err));
        }
        line
    }
}

fn failed(op: &str, err: impl std::fmt::Display) -> String {
    log::error!("[CONSOLE] {} failed: {}", op, err);
    format!("Error: {} failed: {}", op, err)
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> std::io::Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
