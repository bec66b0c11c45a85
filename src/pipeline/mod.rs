//! Speech pipeline.
//!
//! Runs synthesis one chunk ahead of playback, with cancellation and guaranteed cleanup
//! of every audio file a run creates.

mod artifacts;
mod controller;

pub use artifacts::RunScope;
pub use controller::{Pipeline, RunOutcome, RunReport};
