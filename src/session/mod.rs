//! Recording session state machine.
//!
//! Idle → Recording ⇄ Paused → Idle. The session owns the recorder handle
//! and the elapsed timer; the engine's asynchronous events are only logged
//! and mirrored into `recorder_status()` / `last_error()`, never used to
//! drive transitions.

pub mod clock;
pub mod timer;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Local;
use tokio::sync::{mpsc, watch};

use crate::output::{resolve_output_dir, timestamped_name, OutputKind};
use crate::recorder::{
    EncoderOptions, RecorderEngine, RecorderError, RecorderEvent, RecorderStatus, RecordingHandle,
};
use crate::settings::SettingsProvider;

use clock::Clock;
use timer::{format_elapsed, ElapsedBasis, ElapsedTimer};

pub use clock::{ManualClock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Recording,
    Paused,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Recording => "Recording",
            SessionState::Paused => "Paused",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Cannot {op} while {state}")]
    InvalidStateTransition { op: &'static str, state: SessionState },

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error("File system failure: {0}")]
    FileSystem(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Wait after stop/discard before the output is considered final.
    pub grace: Duration,
    pub tick: Duration,
    pub encoder: EncoderOptions,
    /// Used when the configured video directory is empty or missing.
    pub default_video_dir: PathBuf,
}

impl SessionConfig {
    pub fn new(default_video_dir: impl Into<PathBuf>) -> Self {
        Self {
            grace: Duration::from_secs(2),
            tick: Duration::from_secs(1),
            encoder: EncoderOptions::default(),
            default_video_dir: default_video_dir.into(),
        }
    }
}

/// Which controls a front-end should enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionControls {
    pub start: bool,
    pub pause: bool,
    pub resume: bool,
    pub save: bool,
    pub cancel: bool,
}

impl SessionControls {
    pub fn for_state(state: SessionState) -> Self {
        let active = state != SessionState::Idle;
        Self {
            start: !active,
            pause: state == SessionState::Recording,
            resume: state == SessionState::Paused,
            save: active,
            cancel: active,
        }
    }
}

#[derive(Debug)]
struct EngineReport {
    status: RecorderStatus,
    last_error: Option<String>,
}

struct Active {
    handle: Box<dyn RecordingHandle>,
    output: PathBuf,
    basis: ElapsedBasis,
}

enum Phase {
    Idle,
    Recording(Active),
    Paused { active: Active, since: Instant },
}

impl Phase {
    fn state(&self) -> SessionState {
        match self {
            Phase::Idle => SessionState::Idle,
            Phase::Recording(_) => SessionState::Recording,
            Phase::Paused { .. } => SessionState::Paused,
        }
    }
}

pub struct RecordingSession {
    engine: Box<dyn RecorderEngine>,
    settings: Arc<dyn SettingsProvider>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    phase: Phase,
    timer: ElapsedTimer,
    report: Arc<Mutex<EngineReport>>,
}

impl RecordingSession {
    pub fn new(
        engine: Box<dyn RecorderEngine>,
        settings: Arc<dyn SettingsProvider>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let timer = ElapsedTimer::new(config.tick, Arc::clone(&clock));
        Self {
            engine,
            settings,
            clock,
            config,
            phase: Phase::Idle,
            timer,
            report: Arc::new(Mutex::new(EngineReport {
                status: RecorderStatus::Idle,
                last_error: None,
            })),
        }
    }

    pub fn state(&self) -> SessionState {
        self.phase.state()
    }

    pub fn controls(&self) -> SessionControls {
        SessionControls::for_state(self.state())
    }

    /// Output path of the recording in progress.
    pub fn output(&self) -> Option<&Path> {
        match &self.phase {
            Phase::Idle => None,
            Phase::Recording(active) | Phase::Paused { active, .. } => Some(&active.output),
        }
    }

    /// Recording time excluding pauses, computed from the clock. Frozen
    /// while paused, zero when idle.
    pub fn elapsed(&self) -> Duration {
        match &self.phase {
            Phase::Idle => Duration::ZERO,
            Phase::Recording(active) => active.basis.elapsed_at(self.clock.now()),
            Phase::Paused { active, since } => active.basis.elapsed_at(*since),
        }
    }

    pub fn elapsed_display(&self) -> String {
        format_elapsed(self.elapsed())
    }

    /// Last value the tick task published. Kept while paused, zeroed by
    /// save and cancel.
    pub fn elapsed_published(&self) -> Duration {
        self.timer.current()
    }

    /// `hh:mm:ss` of `elapsed_published`, as a timer label shows it.
    pub fn published_display(&self) -> String {
        format_elapsed(self.elapsed_published())
    }

    /// Value published by the tick task, refreshed once per tick.
    pub fn subscribe_elapsed(&self) -> watch::Receiver<Duration> {
        self.timer.subscribe()
    }

    pub fn is_ticking(&self) -> bool {
        self.timer.is_running()
    }

    /// Last status the engine reported.
    pub fn recorder_status(&self) -> RecorderStatus {
        self.lock_report().status
    }

    /// Last failure the engine reported, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lock_report().last_error.clone()
    }

    fn lock_report(&self) -> std::sync::MutexGuard<'_, EngineReport> {
        self.report.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts a new recording and returns its output path. Must be called
    /// inside a tokio runtime.
    pub fn start(&mut self) -> Result<PathBuf, SessionError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(SessionError::InvalidStateTransition {
                op: "start",
                state: self.state(),
            });
        }

        let dir = resolve_output_dir(&self.settings.video_dir(), &self.config.default_video_dir);
        std::fs::create_dir_all(&dir)?;
        let output = dir.join(timestamped_name(OutputKind::Video, Local::now()));

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut report = self.lock_report();
            report.last_error = None;
        }
        tokio::spawn(listen(rx, Arc::clone(&self.report)));

        let handle = self
            .engine
            .create_and_start(&output, &self.config.encoder, tx)?;

        let basis = ElapsedBasis {
            started_at: self.clock.now(),
            paused: Duration::ZERO,
        };
        self.timer.start(basis);
        self.phase = Phase::Recording(Active {
            handle,
            output: output.clone(),
            basis,
        });

        log::info!("[SESSION] Recording started: {}", output.display());
        Ok(output)
    }

    /// Recording → Paused. Anything else is logged and ignored.
    pub fn pause(&mut self) -> Result<(), SessionError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Recording(mut active) => {
                if let Err(e) = active.handle.pause() {
                    self.phase = Phase::Recording(active);
                    return Err(e.into());
                }
                let since = self.clock.now();
                self.timer.stop();
                log::info!(
                    "[SESSION] Paused at {}",
                    format_elapsed(active.basis.elapsed_at(since))
                );
                self.phase = Phase::Paused { active, since };
                Ok(())
            }
            other => {
                self.phase = other;
                self.ignore("pause");
                Ok(())
            }
        }
    }

    /// Paused → Recording. Anything else is logged and ignored.
    pub fn resume(&mut self) -> Result<(), SessionError> {
        match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Paused { mut active, since } => {
                if let Err(e) = active.handle.resume() {
                    self.phase = Phase::Paused { active, since };
                    return Err(e.into());
                }
                let now = self.clock.now();
                active.basis.paused += now.saturating_duration_since(since);
                self.timer.start(active.basis);
                log::info!(
                    "[SESSION] Resumed, {}s paused in total",
                    active.basis.paused.as_secs()
                );
                self.phase = Phase::Recording(active);
                Ok(())
            }
            other => {
                self.phase = other;
                self.ignore("resume");
                Ok(())
            }
        }
    }

    /// Stops the recording, waits the grace period for finalization, and
    /// returns to Idle. Returns the output path, or `None` when idle.
    pub async fn save(&mut self) -> Result<Option<PathBuf>, SessionError> {
        let mut active = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Recording(active) | Phase::Paused { active, .. } => active,
            Phase::Idle => {
                self.ignore("save");
                return Ok(None);
            }
        };

        self.timer.reset();
        let stopped = active.handle.stop();
        drop(active.handle);
        if let Err(e) = stopped {
            log::error!("[SESSION] Stop failed: {}", e);
            return Err(e.into());
        }

        tokio::time::sleep(self.config.grace).await;
        log::info!("[SESSION] Recording saved: {}", active.output.display());
        Ok(Some(active.output))
    }

    /// Discards the recording in progress and removes its partial output.
    pub async fn cancel(&mut self) -> Result<(), SessionError> {
        self.timer.reset();
        let mut active = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Recording(active) | Phase::Paused { active, .. } => active,
            Phase::Idle => {
                self.ignore("cancel");
                return Ok(());
            }
        };

        if let Err(e) = active.handle.discard() {
            log::error!("[SESSION] Discard failed: {}", e);
        }
        drop(active.handle);

        tokio::time::sleep(self.config.grace).await;
        if active.output.exists() {
            std::fs::remove_file(&active.output)?;
            log::info!("[SESSION] Removed partial output {}", active.output.display());
        }
        log::info!("[SESSION] Recording cancelled");
        Ok(())
    }

    fn ignore(&self, op: &'static str) {
        let err = SessionError::InvalidStateTransition {
            op,
            state: self.state(),
        };
        log::warn!("[SESSION] {}", err);
    }
}

async fn listen(mut rx: mpsc::UnboundedReceiver<RecorderEvent>, report: Arc<Mutex<EngineReport>>) {
    while let Some(event) = rx.recv().await {
        match event {
            RecorderEvent::Complete(path) => match std::fs::metadata(&path) {
                Ok(meta) => log::info!(
                    "[RECORDER] Recording complete: {} ({} bytes)",
                    path.display(),
                    meta.len()
                ),
                Err(_) => log::warn!(
                    "[RECORDER] Recording reported complete but {} was not found",
                    path.display()
                ),
            },
            RecorderEvent::Failed(reason) => {
                log::error!("[RECORDER] Recording failed: {}", reason);
                let mut report = report.lock().unwrap_or_else(|e| e.into_inner());
                report.last_error = Some(reason);
            }
            RecorderEvent::StatusChanged(status) => {
                log::debug!("[RECORDER] Status: {}", status);
                report.lock().unwrap_or_else(|e| e.into_inner()).status = status;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::EventSink;
    use crate::settings::SaveDirectories;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Calls {
        pause: AtomicUsize,
        resume: AtomicUsize,
        stop: AtomicUsize,
        discard: AtomicUsize,
    }

    struct FakeEngine {
        calls: Arc<Calls>,
        fail_pause: bool,
    }

    struct FakeHandle {
        calls: Arc<Calls>,
        events: EventSink,
        output: PathBuf,
        fail_pause: bool,
    }

    impl RecorderEngine for FakeEngine {
        fn create_and_start(
            &mut self,
            output: &Path,
            _options: &EncoderOptions,
            events: EventSink,
        ) -> Result<Box<dyn RecordingHandle>, RecorderError> {
            std::fs::write(output, b"partial").unwrap();
            let _ = events.send(RecorderEvent::StatusChanged(RecorderStatus::Recording));
            Ok(Box::new(FakeHandle {
                calls: self.calls.clone(),
                events,
                output: output.to_path_buf(),
                fail_pause: self.fail_pause,
            }))
        }
    }

    impl RecordingHandle for FakeHandle {
        fn pause(&mut self) -> Result<(), RecorderError> {
            if self.fail_pause {
                return Err(RecorderError::Failed("pause rejected".into()));
            }
            self.calls.pause.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn resume(&mut self) -> Result<(), RecorderError> {
            self.calls.resume.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&mut self) -> Result<(), RecorderError> {
            self.calls.stop.fetch_add(1, Ordering::SeqCst);
            let _ = self.events.send(RecorderEvent::Complete(self.output.clone()));
            let _ = self.events.send(RecorderEvent::StatusChanged(RecorderStatus::Idle));
            Ok(())
        }

        fn discard(&mut self) -> Result<(), RecorderError> {
            self.calls.discard.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn session(dir: &Path, fail_pause: bool) -> (RecordingSession, Arc<Calls>, Arc<ManualClock>) {
        let calls = Arc::new(Calls::default());
        let clock = Arc::new(ManualClock::new());
        let mut config = SessionConfig::new(dir);
        config.grace = Duration::ZERO;
        let session = RecordingSession::new(
            Box::new(FakeEngine {
                calls: calls.clone(),
                fail_pause,
            }),
            Arc::new(SaveDirectories::default()),
            clock.clone(),
            config,
        );
        (session, calls, clock)
    }

    #[test]
    fn controls_follow_state() {
        let idle = SessionControls::for_state(SessionState::Idle);
        assert!(idle.start && !idle.pause && !idle.resume && !idle.save && !idle.cancel);
        let rec = SessionControls::for_state(SessionState::Recording);
        assert!(!rec.start && rec.pause && !rec.resume && rec.save && rec.cancel);
        let paused = SessionControls::for_state(SessionState::Paused);
        assert!(!paused.start && !paused.pause && paused.resume && paused.save && paused.cancel);
    }

    #[tokio::test]
    async fn start_names_file_in_default_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _, _) = session(dir.path(), false);

        let output = session.start().unwrap();

        assert_eq!(output.parent().unwrap(), dir.path());
        let name = output.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("Recorder_") && name.ends_with(".mp4"), "{}", name);
        assert_eq!(session.state(), SessionState::Recording);
        assert!(session.is_ticking());
    }

    #[tokio::test]
    async fn second_start_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _, _) = session(dir.path(), false);
        session.start().unwrap();
        assert!(matches!(
            session.start(),
            Err(SessionError::InvalidStateTransition { op: "start", .. })
        ));
    }

    #[tokio::test]
    async fn failed_pause_keeps_recording() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _, _) = session(dir.path(), true);
        session.start().unwrap();

        assert!(matches!(session.pause(), Err(SessionError::Recorder(_))));
        assert_eq!(session.state(), SessionState::Recording);
        assert!(session.is_ticking());
    }

    #[tokio::test]
    async fn elapsed_freezes_while_paused() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, calls, clock) = session(dir.path(), false);
        session.start().unwrap();

        clock.advance(Duration::from_secs(7));
        session.pause().unwrap();
        assert!(!session.is_ticking());
        clock.advance(Duration::from_secs(100));
        assert_eq!(session.elapsed_display(), "00:00:07");

        session.resume().unwrap();
        clock.advance(Duration::from_secs(3));
        assert_eq!(session.elapsed_display(), "00:00:10");
        assert_eq!(calls.pause.load(Ordering::SeqCst), 1);
        assert_eq!(calls.resume.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_discards_and_removes_output() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, calls, _) = session(dir.path(), false);
        let output = session.start().unwrap();
        assert!(output.exists());

        session.cancel().await.unwrap();

        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(calls.discard.load(Ordering::SeqCst), 1);
        assert_eq!(calls.stop.load(Ordering::SeqCst), 0);
        assert!(!output.exists());
        assert_eq!(session.elapsed_display(), "00:00:00");
    }

    #[tokio::test]
    async fn save_and_cancel_from_idle_are_noops() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, calls, _) = session(dir.path(), false);
        assert_eq!(session.save().await.unwrap(), None);
        session.cancel().await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(calls.stop.load(Ordering::SeqCst), 0);
        assert_eq!(calls.discard.load(Ordering::SeqCst), 0);
    }

    async fn wait_for_status(session: &RecordingSession, status: RecorderStatus) {
        for _ in 0..100 {
            if session.recorder_status() == status {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("recorder status never became {}", status);
    }

    #[tokio::test]
    async fn engine_events_are_mirrored() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, _, _) = session(dir.path(), false);

        session.start().unwrap();
        wait_for_status(&session, RecorderStatus::Recording).await;

        session.save().await.unwrap();
        wait_for_status(&session, RecorderStatus::Idle).await;
        assert_eq!(session.last_error(), None);
    }
}
