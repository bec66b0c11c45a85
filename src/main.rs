//! piper-speak - speak text aloud with Piper.
//!
//! Text is split into paragraph or sentence chunks. Synthesis of the next chunk overlaps
//! playback of the current one, so speech starts after the first chunk is ready and
//! continues without gaps. Ctrl+C stops playback and removes every temporary audio file.

mod audio;
mod config;
mod pipeline;
mod process;
mod tts;

use std::process::{Command, Stdio};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::LocalTime;

use audio::CommandPlayer;
use config::AppConfig;
use pipeline::{Pipeline, RunOutcome, RunScope};
use tts::PiperSynthesizer;

/// Wait for a shutdown signal (Ctrl+C or SIGTERM) and cancel the run.
async fn wait_for_shutdown(cancel: CancellationToken) {
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("🛑 Received Ctrl+C, stopping...");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut sigterm) => {
                        sigterm.recv().await;
                    }
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                std::future::pending::<()>().await;
            }
        } => {
            info!("🛑 Received SIGTERM, stopping...");
        }
    }

    cancel.cancel();
}

/// Detach a command from the terminal: no stdio, and its own process group on unix so
/// terminal signals aimed at the shell's job do not reach it.
fn detach(command: &mut Command) -> &mut Command {
    command.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    command
}

/// Relaunch this program detached with the same settings, without waiting for it.
fn spawn_background(config: &AppConfig, text: &str) -> Result<()> {
    let exe = std::env::current_exe().context("Failed to locate the current executable")?;

    let child = detach(Command::new(&exe).args(config.background_args(text)))
        .spawn()
        .with_context(|| format!("Failed to relaunch {} in the background", exe.display()))?;

    info!("🚀 Speaking in background (pid {})", child.id());
    Ok(())
}

/// Print chunks as JSON lines on stdout.
fn print_chunks(chunks: &[tts::Chunk]) -> Result<()> {
    for chunk in chunks {
        println!("{}", serde_json::to_string(chunk)?);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_args();

    // Respect RUST_LOG, fall back to the verbose flag. Logs go to stderr so stdout stays clean.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(if config.verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_timer(LocalTime::new(time::macros::format_description!("[hour]:[minute]:[second]")))
        .init();

    if let Err(e) = config.validate() {
        error!("❌ Configuration error: {}", e);
        std::process::exit(1);
    }

    let text = match config.read_text() {
        Ok(text) => text,
        Err(e) => {
            error!("❌ {:#}", e);
            std::process::exit(1);
        }
    };

    let chunks = tts::segment(&text, config.chunk_size);
    if config.print_chunks {
        return print_chunks(&chunks);
    }

    let voice_path = match config.resolve_voice() {
        Ok(path) => path,
        Err(e) => {
            error!("❌ {}", e);
            error!("Run 'piper-speak-install {}' to download it", config.voice);
            std::process::exit(1);
        }
    };

    if config.background {
        if let Err(e) = spawn_background(&config, &text) {
            error!("❌ {:#}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    debug!("🗣️  piper-speak v{}", env!("CARGO_PKG_VERSION"));
    config.log_config(&voice_path);

    let synthesizer = Arc::new(PiperSynthesizer::new(&config, voice_path));
    let player = Arc::new(CommandPlayer::new(&config.player_command));
    let pipeline = Pipeline::new(synthesizer, player, RunScope::new(config.artifact_dir()));

    let cancel = CancellationToken::new();
    let shutdown_handle = tokio::spawn(wait_for_shutdown(cancel.clone()));

    let report = pipeline.run(&chunks, &cancel).await;
    shutdown_handle.abort();

    if !report.skipped.is_empty() || !report.playback_failures.is_empty() {
        warn!("{} chunk(s) failed to synthesize, {} failed to play", report.skipped.len(), report.playback_failures.len());
    }

    match report.outcome {
        RunOutcome::Completed => debug!("Done"),
        RunOutcome::Cancelled => info!("✅ Stopped"),
    }

    Ok(())
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_detached_child_has_no_terminal_stdio() {
        let mut child = detach(Command::new("sleep").arg("10")).spawn().unwrap();
        let pid = child.id();

        for fd in 0..=2 {
            let target = std::fs::read_link(format!("/proc/{pid}/fd/{fd}")).unwrap();
            assert_eq!(target, PathBuf::from("/dev/null"), "fd {fd}");
        }

        // Fields after the command name: state, ppid, pgrp
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap();
        let pgrp: u32 = stat.rsplit(')').next().unwrap().split_whitespace().nth(2).unwrap().parse().unwrap();
        assert_eq!(pgrp, pid);

        child.kill().unwrap();
        child.wait().unwrap();
    }
}
