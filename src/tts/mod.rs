//! Text-to-speech module.
//!
//! Splits input text into chunks and synthesizes each chunk with Piper.

mod segmenter;
mod synthesizer;

pub use segmenter::{Chunk, segment};
pub use synthesizer::{PiperSynthesizer, SpeechSynthesizer, SynthesisError};
