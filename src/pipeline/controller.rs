//! Pipeline controller: overlaps synthesis of the next chunk with playback of the current one.
//!
//! Synthesis and playback both run on tokio's blocking pool. The control task awaits each
//! chunk's own join handle, so results are matched to chunks explicitly and playback stays
//! in index order whatever order synthesis finishes in. Every wait races the cancellation
//! token, and the artifact ledger removes every audio file the run created on all exit paths.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::artifacts::{ArtifactLedger, RunScope, remove_artifact};
use crate::audio::{AudioPlayer, PlaybackError, PlaybackStatus};
use crate::tts::{Chunk, SpeechSynthesizer, SynthesisError};

/// Synthesis tasks allowed in flight: the awaited chunk plus one look-ahead.
const MAX_IN_FLIGHT: usize = 2;

/// Synthesized audio for one chunk, handed from a synthesis task to the control task.
#[derive(Debug)]
pub struct AudioArtifact {
    pub chunk_index: usize,
    pub path: PathBuf,
    pub outcome: Result<(), SynthesisError>,
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunOutcome {
    /// Every chunk was played or skipped.
    #[default]
    Completed,
    /// Cancellation was observed. No further chunks were processed.
    Cancelled,
}

/// Summary of a run, by chunk index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub played: Vec<usize>,
    pub skipped: Vec<usize>,
    pub playback_failures: Vec<usize>,
}

impl RunReport {
    fn cancelled(mut self) -> Self {
        self.outcome = RunOutcome::Cancelled;
        self
    }
}

/// A synthesis task that has been started but not yet collected.
struct InFlight {
    index: usize,
    path: PathBuf,
    handle: JoinHandle<AudioArtifact>,
}

/// Drives chunks through synthesis and playback with one chunk of look-ahead.
pub struct Pipeline {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn AudioPlayer>,
    scope: RunScope,
}

impl Pipeline {
    /// Create a pipeline.
    ///
    /// # Arguments
    /// * `synthesizer` - Converts chunk text into audio files
    /// * `player` - Plays audio files
    /// * `scope` - Run identity used to name every artifact
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, player: Arc<dyn AudioPlayer>, scope: RunScope) -> Self {
        Self { synthesizer, player, scope }
    }

    /// Speak `chunks` in order until done or until `cancel` fires.
    ///
    /// Per-chunk failures are logged and recorded in the report. They never stop the run.
    /// On cancellation during playback the player is interrupted once. In-flight synthesis
    /// is not awaited, and its output is removed by the synthesis task itself. Dropping the
    /// returned future stops in-flight synthesis the same way, without cancelling `cancel`.
    pub async fn run(&self, chunks: &[Chunk], cancel: &CancellationToken) -> RunReport {
        let report = RunReport::default();
        let total = chunks.len();

        if cancel.is_cancelled() {
            return report.cancelled();
        }

        let Some(first) = chunks.first() else {
            debug!("No chunks to speak");
            return report;
        };

        info!("Speaking {} chunk(s) (run {})", total, self.scope.id());
        self.player.reset();

        // Cancelled by the ledger on every exit, including when this future is dropped
        let run_cancel = cancel.child_token();
        let mut ledger = ArtifactLedger::new(run_cancel.clone());
        let mut pending: VecDeque<InFlight> = VecDeque::with_capacity(MAX_IN_FLIGHT);
        pending.push_back(self.spawn_synthesis(first, &mut ledger, &run_cancel));

        self.drive(chunks, &mut pending, &mut ledger, &run_cancel, report).await
    }

    async fn drive(
        &self,
        chunks: &[Chunk],
        pending: &mut VecDeque<InFlight>,
        ledger: &mut ArtifactLedger,
        cancel: &CancellationToken,
        mut report: RunReport,
    ) -> RunReport {
        let total = chunks.len();

        for (position, chunk) in chunks.iter().enumerate() {
            let n = position + 1;

            if cancel.is_cancelled() {
                info!("⏹️  Cancelled before chunk {}/{}", n, total);
                return report.cancelled();
            }

            // Look-ahead: the next chunk synthesizes while this one is awaited and played
            if let Some(next) = chunks.get(position + 1) {
                pending.push_back(self.spawn_synthesis(next, ledger, cancel));
            }
            debug_assert!(pending.len() <= MAX_IN_FLIGHT);

            let Some(InFlight { index, path, handle }) = pending.pop_front() else {
                break;
            };
            debug_assert_eq!(index, chunk.index);

            let artifact = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("⏹️  Cancelled while waiting for chunk {}/{}", n, total);
                    return report.cancelled();
                }
                joined = handle => joined.unwrap_or_else(|e| AudioArtifact {
                    chunk_index: index,
                    path,
                    outcome: Err(SynthesisError::Panicked(e.to_string())),
                }),
            };

            if let Err(e) = &artifact.outcome {
                warn!("❌ Synthesis failed for chunk {}/{}: {}", n, total, e);
                ledger.release(&artifact.path);
                report.skipped.push(artifact.chunk_index);
                continue;
            }

            info!("🔊 Playing chunk {}/{} ({} chars)", n, total, chunk.text.chars().count());

            let player = Arc::clone(&self.player);
            let playback_path = artifact.path.clone();
            let playback = tokio::task::spawn_blocking(move || player.play(&playback_path));

            let played = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("⏹️  Cancelled during chunk {}/{}", n, total);
                    self.player.interrupt();
                    return report.cancelled();
                }
                joined = playback => joined.unwrap_or_else(|e| Err(PlaybackError::Panicked(e.to_string()))),
            };

            match played {
                Ok(PlaybackStatus::Finished) => report.played.push(artifact.chunk_index),
                Ok(PlaybackStatus::Interrupted) => {
                    warn!("Playback of chunk {}/{} was interrupted", n, total);
                    report.playback_failures.push(artifact.chunk_index);
                }
                Err(e) => {
                    warn!("❌ Playback failed for chunk {}/{}: {}", n, total, e);
                    report.playback_failures.push(artifact.chunk_index);
                }
            }

            ledger.release(&artifact.path);
        }

        info!("✅ Finished speaking ({} played, {} skipped)", report.played.len(), report.skipped.len());
        report
    }

    /// Start synthesizing `chunk` on the blocking pool.
    ///
    /// The artifact location is tracked before the task starts, so it is swept even if the
    /// result is never collected.
    fn spawn_synthesis(&self, chunk: &Chunk, ledger: &mut ArtifactLedger, cancel: &CancellationToken) -> InFlight {
        let index = chunk.index;
        let path = self.scope.artifact_path(index);
        ledger.track(path.clone());

        debug!("Synthesizing chunk {} -> {}", index + 1, path.display());

        let synthesizer = Arc::clone(&self.synthesizer);
        let text = chunk.text.clone();
        let output = path.clone();
        let cancel = cancel.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let outcome = synthesizer.synthesize(&text, &output, &cancel);
            if cancel.is_cancelled() {
                // Nobody collects results after cancellation
                remove_artifact(&output);
            }
            AudioArtifact { chunk_index: index, path: output, outcome }
        });

        InFlight { index, path, handle }
    }
}
