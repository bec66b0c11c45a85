//! Audio output module.
//!
//! Plays synthesized audio files through an external player with interrupt support.

mod playback;

pub use playback::{AudioPlayer, CommandPlayer, PlaybackError, PlaybackStatus};
