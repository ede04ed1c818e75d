//! # hark-cli
//!
//! Command-line host: resolves settings and flags, loads the model once, and
//! transcribes each WAV file in turn.

#![deny(unsafe_code)]

pub mod args;
pub mod logging;
pub mod report;

pub use args::{Cli, model_path};
pub use report::{FileReport, transcribe_files};
