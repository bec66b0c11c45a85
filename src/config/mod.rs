//! Configuration module for piper-speak.
//!
//! Provides CLI argument parsing and voice model discovery.

#[allow(clippy::module_inception)]
mod config;
mod voices;

pub use config::AppConfig;
