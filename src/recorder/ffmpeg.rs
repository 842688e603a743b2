//! Recorder engine backed by an `ffmpeg` child process.
//!
//! ffmpeg has no pause, so every Recording stretch becomes its own segment
//! file. Pause ends the current segment, resume starts the next one, and
//! stop joins the segments into the final output on a background thread,
//! then reports `Complete` or `Failed` through the event sink.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use super::{
    EncoderOptions, EventSink, RecorderEngine, RecorderError, RecorderEvent, RecorderStatus,
    RecordingHandle,
};

/// Platform screen-grab input for ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrabInput {
    pub format: String,
    pub source: String,
}

impl GrabInput {
    /// gdigrab on Windows, avfoundation on macOS, x11grab elsewhere.
    pub fn for_platform() -> Self {
        if cfg!(target_os = "windows") {
            Self {
                format: "gdigrab".into(),
                source: "desktop".into(),
            }
        } else if cfg!(target_os = "macos") {
            Self {
                format: "avfoundation".into(),
                source: "1:none".into(),
            }
        } else {
            Self {
                format: "x11grab".into(),
                source: std::env::var("DISPLAY").unwrap_or_else(|_| ":0.0".into()),
            }
        }
    }
}

/// Maps 0–100 quality onto x264 CRF 51–18.
pub fn quality_to_crf(quality: u8) -> u8 {
    let quality = quality.min(100) as u32;
    (51 - (quality * 33) / 100) as u8
}

/// Arguments for one capture segment written to `output`.
pub fn build_ffmpeg_args(input: &GrabInput, options: &EncoderOptions, output: &Path) -> Vec<String> {
    let bitrate = options.bitrate.to_string();
    let bufsize = (options.bitrate as u64 * 2).to_string();

    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        input.format.clone(),
        "-framerate".into(),
        options.framerate.to_string(),
        "-i".into(),
        input.source.clone(),
        "-c:v".into(),
        "libx264".into(),
        "-preset".into(),
        "veryfast".into(),
        "-crf".into(),
        quality_to_crf(options.quality).to_string(),
        "-maxrate".into(),
        bitrate,
        "-bufsize".into(),
        bufsize,
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-vsync".into(),
        if options.fixed_framerate { "cfr" } else { "vfr" }.into(),
    ];
    if !options.audio {
        args.push("-an".into());
    }
    args.push("-y".into());
    args.push(output.to_string_lossy().into_owned());
    args
}

/// Arguments that stream-copy the listed segments into `output`.
pub fn build_concat_args(list_file: &Path, output: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list_file.to_string_lossy().into_owned(),
        "-c".into(),
        "copy".into(),
        "-y".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// `Recorder_x.mp4` → `Recorder_x.seg3.mp4`.
pub fn segment_path(output: &Path, index: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".into());
    output.with_file_name(format!("{}.seg{}.mp4", stem, index))
}

#[derive(Debug, Clone)]
pub struct FfmpegRecorder {
    binary: PathBuf,
    input: GrabInput,
}

impl FfmpegRecorder {
    pub fn new(binary: impl Into<PathBuf>, input: GrabInput) -> Self {
        Self {
            binary: binary.into(),
            input,
        }
    }

    /// Finds `ffmpeg` on `PATH`.
    pub fn locate() -> Result<Self, RecorderError> {
        let binary =
            which::which("ffmpeg").map_err(|e| RecorderError::BinaryNotFound(e.to_string()))?;
        log::info!("[RECORDER] Using ffmpeg at {}", binary.display());
        Ok(Self::new(binary, GrabInput::for_platform()))
    }
}

impl RecorderEngine for FfmpegRecorder {
    fn create_and_start(
        &mut self,
        output: &Path,
        options: &EncoderOptions,
        events: EventSink,
    ) -> Result<Box<dyn RecordingHandle>, RecorderError> {
        let mut recording = FfmpegRecording {
            binary: self.binary.clone(),
            input: self.input.clone(),
            options: options.clone(),
            output: output.to_path_buf(),
            segments: Vec::new(),
            child: None,
            events,
        };
        recording.start_segment()?;
        recording.notify(RecorderEvent::StatusChanged(RecorderStatus::Recording));
        log::info!("[RECORDER] Recording to {}", output.display());
        Ok(Box::new(recording))
    }
}

struct FfmpegRecording {
    binary: PathBuf,
    input: GrabInput,
    options: EncoderOptions,
    output: PathBuf,
    segments: Vec<PathBuf>,
    child: Option<Child>,
    events: EventSink,
}

impl FfmpegRecording {
    fn notify(&self, event: RecorderEvent) {
        // The session may already have dropped its listener.
        let _ = self.events.send(event);
    }

    fn start_segment(&mut self) -> Result<(), RecorderError> {
        let path = segment_path(&self.output, self.segments.len());
        let child = Command::new(&self.binary)
            .args(build_ffmpeg_args(&self.input, &self.options, &path))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(RecorderError::Spawn)?;
        log::debug!("[RECORDER] Segment {} started (pid {})", path.display(), child.id());
        self.segments.push(path);
        self.child = Some(child);
        Ok(())
    }

    /// Asks ffmpeg to finish the current segment and waits for it.
    fn finish_segment(&mut self) -> Result<(), RecorderError> {
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        finish_child(child)
    }
}

fn finish_child(mut child: Child) -> Result<(), RecorderError> {
    if let Some(mut stdin) = child.stdin.take() {
        // `q` makes ffmpeg flush and write the moov atom.
        let _ = stdin.write_all(b"q");
    }
    let status = child.wait()?;
    if status.success() {
        Ok(())
    } else {
        Err(RecorderError::Failed(format!("ffmpeg exited with {}", status)))
    }
}

fn join_segments(binary: &Path, segments: &[PathBuf], output: &Path) -> Result<(), RecorderError> {
    let existing: Vec<&PathBuf> = segments.iter().filter(|s| s.exists()).collect();
    match existing.as_slice() {
        [] => Err(RecorderError::Failed("no segments were written".into())),
        [only] => {
            std::fs::rename(only, output)?;
            Ok(())
        }
        many => {
            let list = output.with_extension("segments.txt");
            let body: String = many
                .iter()
                .map(|s| format!("file '{}'\n", s.to_string_lossy().replace('\'', "'\\''")))
                .collect();
            std::fs::write(&list, body)?;

            let status = Command::new(binary)
                .args(build_concat_args(&list, output))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map_err(RecorderError::Spawn);

            let _ = std::fs::remove_file(&list);
            let status = status?;
            if !status.success() {
                return Err(RecorderError::Failed(format!("concat exited with {}", status)));
            }
            for segment in many {
                let _ = std::fs::remove_file(segment);
            }
            Ok(())
        }
    }
}

impl RecordingHandle for FfmpegRecording {
    fn pause(&mut self) -> Result<(), RecorderError> {
        if self.child.is_none() {
            return Err(RecorderError::NotRunning("pause"));
        }
        self.finish_segment()?;
        self.notify(RecorderEvent::StatusChanged(RecorderStatus::Paused));
        Ok(())
    }

    fn resume(&mut self) -> Result<(), RecorderError> {
        if self.child.is_some() {
            return Err(RecorderError::NotRunning("resume"));
        }
        self.start_segment()?;
        self.notify(RecorderEvent::StatusChanged(RecorderStatus::Recording));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RecorderError> {
        self.notify(RecorderEvent::StatusChanged(RecorderStatus::Finishing));

        let child = self.child.take();
        let binary = self.binary.clone();
        let segments = std::mem::take(&mut self.segments);
        let output = self.output.clone();
        let events = self.events.clone();

        std::thread::spawn(move || {
            let result = child
                .map(finish_child)
                .unwrap_or(Ok(()))
                .and_then(|_| join_segments(&binary, &segments, &output));
            let event = match result {
                Ok(()) => RecorderEvent::Complete(output),
                Err(e) => RecorderEvent::Failed(e.to_string()),
            };
            let _ = events.send(event);
            let _ = events.send(RecorderEvent::StatusChanged(RecorderStatus::Idle));
        });
        Ok(())
    }

    fn discard(&mut self) -> Result<(), RecorderError> {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        for segment in self.segments.drain(..) {
            let _ = std::fs::remove_file(segment);
        }
        self.notify(RecorderEvent::StatusChanged(RecorderStatus::Idle));
        log::info!("[RECORDER] Discarded recording {}", self.output.display());
        Ok(())
    }
}

impl Drop for FfmpegRecording {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x11() -> GrabInput {
        GrabInput {
            format: "x11grab".into(),
            source: ":0.0".into(),
        }
    }

    #[test]
    fn args_carry_encoder_options() {
        let args = build_ffmpeg_args(&x11(), &EncoderOptions::default(), Path::new("/tmp/o.mp4"));

        let value = |flag: &str| {
            let pos = args.iter().position(|a| a == flag).unwrap();
            args[pos + 1].clone()
        };
        assert_eq!(value("-f"), "x11grab");
        assert_eq!(value("-framerate"), "30");
        assert_eq!(value("-maxrate"), "4000000");
        assert_eq!(value("-bufsize"), "8000000");
        assert_eq!(value("-vsync"), "vfr");
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/o.mp4");
    }

    #[test]
    fn audio_and_fixed_framerate_flags() {
        let options = EncoderOptions {
            audio: true,
            fixed_framerate: true,
            ..EncoderOptions::default()
        };
        let args = build_ffmpeg_args(&x11(), &options, Path::new("o.mp4"));
        assert!(!args.contains(&"-an".to_string()));
        let pos = args.iter().position(|a| a == "-vsync").unwrap();
        assert_eq!(args[pos + 1], "cfr");
    }

    #[test]
    fn quality_maps_onto_crf_range() {
        assert_eq!(quality_to_crf(0), 51);
        assert_eq!(quality_to_crf(100), 18);
        assert_eq!(quality_to_crf(70), 28);
        assert_eq!(quality_to_crf(255), 18);
    }

    #[test]
    fn segment_paths_are_siblings() {
        let out = Path::new("/v/Recorder_20250101_000000.mp4");
        assert_eq!(
            segment_path(out, 2),
            PathBuf::from("/v/Recorder_20250101_000000.seg2.mp4")
        );
    }

    #[test]
    fn concat_args_use_stream_copy() {
        let args = build_concat_args(Path::new("/v/list.txt"), Path::new("/v/out.mp4"));
        let pos = args.iter().position(|a| a == "-c").unwrap();
        assert_eq!(args[pos + 1], "copy");
        assert_eq!(args.last().unwrap(), "/v/out.mp4");
    }

    #[test]
    fn single_segment_is_renamed_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Recorder_1.mp4");
        let segment = segment_path(&output, 0);
        std::fs::write(&segment, b"data").unwrap();

        join_segments(Path::new("ffmpeg"), &[segment.clone()], &output).unwrap();

        assert!(output.exists());
        assert!(!segment.exists());
    }

    #[test]
    fn missing_segments_fail() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("Recorder_1.mp4");
        let result = join_segments(Path::new("ffmpeg"), &[segment_path(&output, 0)], &output);
        assert!(matches!(result, Err(RecorderError::Failed(_))));
    }
}
