//! Application configuration and CLI argument parsing.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use super::voices;

/// Default voice model name.
pub const DEFAULT_VOICE: &str = "en_US-lessac-medium";

/// Default length scale (lower = faster).
pub const DEFAULT_SPEED: f32 = 0.7;

/// Default maximum characters per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// piper-speak configuration.
#[derive(Parser, Debug, Clone)]
#[command(name = "piper-speak")]
#[command(author, version, about = "Speak text aloud with Piper", long_about = None)]
#[command(after_help = "Text is read from stdin when no TEXT is given.\n\
    Voice models are loaded from the user voice directory first, then /usr/share/piper-speak/voices.")]
pub struct AppConfig {
    /// Text to speak
    pub text: Vec<String>,

    /// Length scale (lower = faster)
    #[arg(long, default_value_t = DEFAULT_SPEED, value_parser = parse_speed)]
    pub speed: f32,

    /// Run in background
    #[arg(long = "bg")]
    pub background: bool,

    /// Voice model name
    #[arg(long, env = "PIPER_VOICE", default_value = DEFAULT_VOICE)]
    pub voice: String,

    /// User voice directory, searched before the system directory
    #[arg(long, env = "PIPER_VOICE_DIR", default_value_os_t = voices::default_user_voice_dir())]
    pub voice_dir: PathBuf,

    /// Max characters per chunk
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, value_parser = parse_chunk_size)]
    pub chunk_size: usize,

    /// Speech synthesizer executable
    #[arg(long, env = "PIPER_TTS", default_value = "piper-tts")]
    pub synth_command: String,

    /// Audio player executable, invoked with the audio file as its only argument
    #[arg(long, env = "PIPER_PLAYER", default_value = "pw-play")]
    pub player_command: String,

    /// Directory for temporary audio files (defaults to the system temp directory)
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    /// Print the chunks as JSON lines instead of speaking them
    #[arg(long)]
    pub print_chunks: bool,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

impl AppConfig {
    /// Parse configuration from command line arguments.
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Text to speak: the positional arguments joined by spaces, or all of stdin.
    ///
    /// # Errors
    /// Returns an error if stdin cannot be read or the trimmed text is empty.
    pub fn read_text(&self) -> Result<String> {
        self.read_text_from(std::io::stdin().lock())
    }

    fn read_text_from(&self, mut input: impl Read) -> Result<String> {
        let text = if self.text.is_empty() {
            let mut buf = String::new();
            input.read_to_string(&mut buf).context("Failed to read text from stdin")?;
            buf
        } else {
            self.text.join(" ")
        };

        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("No text provided");
        }
        Ok(text.to_string())
    }

    /// Resolve the configured voice name to a model file.
    pub fn resolve_voice(&self) -> Result<PathBuf> {
        voices::find_voice(&self.voice, &self.voice_dir)
    }

    /// Directory where audio artifacts are written.
    pub fn artifact_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Arguments for an equivalent foreground invocation speaking `text`.
    pub fn background_args(&self, text: &str) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--speed".into(),
            self.speed.to_string().into(),
            "--voice".into(),
            self.voice.clone().into(),
            "--voice-dir".into(),
            self.voice_dir.clone().into(),
            "--chunk-size".into(),
            self.chunk_size.to_string().into(),
            "--synth-command".into(),
            self.synth_command.clone().into(),
            "--player-command".into(),
            self.player_command.clone().into(),
        ];

        if let Some(ref dir) = self.temp_dir {
            args.push("--temp-dir".into());
            args.push(dir.clone().into());
        }
        if self.verbose {
            args.push("--verbose".into());
        }

        // Text may itself start with a dash
        args.push("--".into());
        args.push(text.into());
        args
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.voice.trim().is_empty() {
            anyhow::bail!("Voice name must not be empty");
        }

        if !(self.speed.is_finite() && self.speed > 0.0) {
            anyhow::bail!("Speed must be a positive number");
        }

        if self.chunk_size == 0 {
            anyhow::bail!("Chunk size must be positive");
        }

        if let Some(ref dir) = self.temp_dir
            && !dir.is_dir()
        {
            anyhow::bail!("Temporary directory does not exist: {}", dir.display());
        }

        Ok(())
    }

    /// Log the current configuration.
    pub fn log_config(&self, voice_path: &Path) {
        info!("Configuration:");
        info!("  Voice: {} ({})", self.voice, voice_path.display());
        info!("  Speed (length scale): {}", self.speed);
        info!("  Chunk size: {} chars", self.chunk_size);
        info!("  Synthesizer: {}", self.synth_command);
        info!("  Player: {}", self.player_command);
        info!("  Temp dir: {}", self.artifact_dir().display());
    }
}

/// Parse and validate the length scale (> 0).
fn parse_speed(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("speed must be greater than 0, got {}", value))
    }
}

/// Parse and validate the chunk size (> 0).
fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let value: usize = s.parse().map_err(|_| format!("'{}' is not a valid size", s))?;
    if value > 0 { Ok(value) } else { Err("chunk size must be at least 1".to_string()) }
}
