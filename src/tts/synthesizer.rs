//! Text-to-speech synthesis through the Piper command-line engine.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::AppConfig;
use crate::process::{ChildExit, feed_stdin, supervise};

/// Failure to produce audio for one chunk.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error during synthesis: {0}")]
    Io(#[from] io::Error),

    #[error("{program} exited with {status}: {stderr}")]
    Failed { program: String, status: ExitStatus, stderr: String },

    #[error("synthesis cancelled")]
    Cancelled,

    #[error("synthesis task panicked: {0}")]
    Panicked(String),
}

/// Converts text into an audio file.
///
/// Implementations block until the file at `output` is complete and should stop early
/// once `cancel` fires.
pub trait SpeechSynthesizer: Send + Sync {
    fn synthesize(&self, text: &str, output: &Path, cancel: &CancellationToken) -> Result<(), SynthesisError>;
}

/// Synthesizer backed by the `piper-tts` executable.
pub struct PiperSynthesizer {
    program: String,   // Executable name or path
    model: PathBuf,    // Voice model (.onnx)
    length_scale: f32, // Lower is faster speech
}

impl PiperSynthesizer {
    /// Create a synthesizer for a resolved voice model.
    ///
    /// # Arguments
    /// * `config` - Application configuration (engine command and speed)
    /// * `model` - Path to the voice model file
    pub fn new(config: &AppConfig, model: PathBuf) -> Self {
        Self::with_program(&config.synth_command, model, config.speed)
    }

    pub fn with_program(program: &str, model: PathBuf, length_scale: f32) -> Self {
        Self { program: program.to_string(), model, length_scale }
    }
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn synthesize(&self, text: &str, output: &Path, cancel: &CancellationToken) -> Result<(), SynthesisError> {
        debug!("Synthesizing \"{}\" -> {}", text, output.display());

        let mut child = Command::new(&self.program)
            .arg("--model")
            .arg(&self.model)
            .arg("--length_scale")
            .arg(format!("{:.2}", self.length_scale))
            .arg("--output_file")
            .arg(output)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| SynthesisError::Spawn { program: self.program.clone(), source })?;

        // Input of any length is written while the engine is supervised
        let writer = child.stdin.take().map(|stdin| feed_stdin(stdin, text.as_bytes().to_vec()));

        match supervise(child, || cancel.is_cancelled())? {
            ChildExit::Exited { status, .. } if status.success() => match writer.map(|handle| handle.join()) {
                Some(Ok(Err(e))) => Err(e.into()),
                Some(Err(_)) => Err(SynthesisError::Panicked("stdin writer".to_string())),
                _ => Ok(()),
            },
            ChildExit::Exited { status, stderr } => Err(SynthesisError::Failed { program: self.program.clone(), status, stderr }),
            // An engine that stopped reading keeps the writer blocked, so it is left detached
            ChildExit::Killed => Err(SynthesisError::Cancelled),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    /// Write an executable shell script standing in for the engine.
    fn fake_engine(dir: &Path, body: &str) -> String {
        let path = dir.join("fake-piper");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn test_text_is_streamed_to_engine_stdin() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(
            dir.path(),
            r#"while [ $# -gt 0 ]; do
  case "$1" in
    --output_file) out="$2"; shift ;;
    --length_scale) scale="$2"; shift ;;
  esac
  shift
done
printf '%s' "$scale" > "$out.scale"
cat > "$out""#,
        );
        let synth = PiperSynthesizer::with_program(&engine, PathBuf::from("voice.onnx"), 0.7);
        let output = dir.path().join("out.wav");

        synth.synthesize("Hello there.", &output, &CancellationToken::new()).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), "Hello there.");
        assert_eq!(std::fs::read_to_string(dir.path().join("out.wav.scale")).unwrap(), "0.70");
    }

    #[test]
    fn test_engine_failure_carries_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "cat > /dev/null\necho 'model is corrupt' >&2\nexit 4");
        let synth = PiperSynthesizer::with_program(&engine, PathBuf::from("voice.onnx"), 0.7);

        let err = synth.synthesize("Hello.", &dir.path().join("out.wav"), &CancellationToken::new()).unwrap_err();
        match err {
            SynthesisError::Failed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(4));
                assert_eq!(stderr, "model is corrupt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cancellation_kills_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = fake_engine(dir.path(), "cat > /dev/null\nsleep 10");
        let synth = PiperSynthesizer::with_program(&engine, PathBuf::from("voice.onnx"), 0.7);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = synth.synthesize("Hello.", &dir.path().join("out.wav"), &cancel).unwrap_err();
        assert!(matches!(err, SynthesisError::Cancelled), "unexpected error: {err}");
    }

    #[test]
    fn test_input_larger_than_pipe_buffer_with_chatty_engine() {
        let dir = tempfile::tempdir().unwrap();
        // Fills its stderr pipe before it starts reading stdin
        let engine = fake_engine(
            dir.path(),
            r#"while [ $# -gt 0 ]; do
  [ "$1" = "--output_file" ] && out="$2"
  shift
done
yes 'loading voice' | head -c 200000 >&2
cat > "$out""#,
        );
        let synth = PiperSynthesizer::with_program(&engine, PathBuf::from("voice.onnx"), 0.7);
        let output = dir.path().join("out.wav");
        let text = "A run-on sentence without an end ".repeat(5_000);

        synth.synthesize(&text, &output, &CancellationToken::new()).unwrap();

        assert_eq!(std::fs::read_to_string(&output).unwrap(), text);
    }

    #[test]
    fn test_cancellation_interrupts_blocked_input() {
        let dir = tempfile::tempdir().unwrap();
        // Never reads stdin, so the input cannot be fully written
        let engine = fake_engine(dir.path(), "exec sleep 10");
        let synth = PiperSynthesizer::with_program(&engine, PathBuf::from("voice.onnx"), 0.7);
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(100));
                cancel.cancel();
            })
        };

        let started = std::time::Instant::now();
        let err = synth.synthesize(&"x".repeat(1 << 20), &dir.path().join("out.wav"), &cancel).unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, SynthesisError::Cancelled), "unexpected error: {err}");
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn test_missing_engine_is_a_spawn_error() {
        let synth = PiperSynthesizer::with_program("piper-speak-no-such-engine", PathBuf::from("voice.onnx"), 0.7);
        let dir = tempfile::tempdir().unwrap();

        let err = synth.synthesize("Hello.", &dir.path().join("out.wav"), &CancellationToken::new()).unwrap_err();
        assert!(matches!(err, SynthesisError::Spawn { .. }), "unexpected error: {err}");
    }
}
