//! Audio playback through an external player command (`pw-play` by default).
//!
//! Plays one audio file at a time with interrupt support. An interrupt kills the exact
//! child process that is playing, by handle.

use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::debug;

use crate::process::{ChildExit, supervise};

/// How a playback call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    /// The whole file was played.
    Finished,
    /// Playback was stopped by [`AudioPlayer::interrupt`].
    Interrupted,
}

/// Failure to play one audio file.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error during playback: {0}")]
    Io(#[from] io::Error),

    #[error("{program} exited with {status}: {stderr}")]
    Failed { program: String, status: ExitStatus, stderr: String },

    #[error("playback task panicked: {0}")]
    Panicked(String),
}

/// Plays audio files, blocking for the duration of playback.
pub trait AudioPlayer: Send + Sync {
    /// Play the file at `path` and block until it ends or is interrupted.
    fn play(&self, path: &Path) -> Result<PlaybackStatus, PlaybackError>;

    /// Request termination of the current playback.
    ///
    /// The request stays in effect until [`AudioPlayer::reset`], so one that arrives
    /// before playback starts is not lost.
    fn interrupt(&self);

    /// Clear a previous interrupt request.
    fn reset(&self);
}

/// Player that runs an external command with the audio file as its only argument.
pub struct CommandPlayer {
    program: String,
    /// Set to stop the current playback
    interrupt: AtomicBool,
}

impl CommandPlayer {
    /// Create a new player.
    ///
    /// # Arguments
    /// * `program` - Player executable, invoked as `<program> <file>`
    pub fn new(program: &str) -> Self {
        Self { program: program.to_string(), interrupt: AtomicBool::new(false) }
    }
}

impl AudioPlayer for CommandPlayer {
    fn play(&self, path: &Path) -> Result<PlaybackStatus, PlaybackError> {
        if self.interrupt.load(Ordering::SeqCst) {
            debug!("Playback of {} skipped, interrupt pending", path.display());
            return Ok(PlaybackStatus::Interrupted);
        }

        let child = Command::new(&self.program)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| PlaybackError::Spawn { program: self.program.clone(), source })?;

        debug!("Playing {} (pid {})", path.display(), child.id());

        match supervise(child, || self.interrupt.load(Ordering::Relaxed))? {
            ChildExit::Exited { status, .. } if status.success() => {
                debug!("Playback completed");
                Ok(PlaybackStatus::Finished)
            }
            ChildExit::Exited { status, stderr } => Err(PlaybackError::Failed { program: self.program.clone(), status, stderr }),
            ChildExit::Killed => {
                debug!("Playback interrupted");
                Ok(PlaybackStatus::Interrupted)
            }
        }
    }

    fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.interrupt.store(false, Ordering::SeqCst);
    }
}
