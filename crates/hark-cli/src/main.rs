//! # hark
//!
//! Transcribe WAV files with an on-device ONNX model.

#![deny(unsafe_code)]

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use hark_cli::{Cli, logging, model_path, transcribe_files};
use hark_transcription::{ModelBlob, TranscriptionService};
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(0) => ExitCode::SUCCESS,
        Ok(failures) => {
            info!(failures, "finished with failures");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<usize> {
    let cli = Cli::parse();

    // Settings first; the log level comes from them.
    let settings = cli.resolve_settings()?;
    logging::init_subscriber(settings.logging.level.as_filter_str());

    let model = model_path(&settings)?;
    let blob = ModelBlob::from_path(&model)
        .with_context(|| format!("Failed to read model {}", model.display()))?;
    let service = TranscriptionService::from_settings(&settings, blob)
        .await
        .context("Failed to load model")?;

    let failures = transcribe_files(
        &service,
        &cli.audio,
        cli.json,
        &mut std::io::stdout(),
        &mut std::io::stderr(),
    )
    .await
    .context("Failed to write output")?;

    service.release().await.context("Failed to release model")?;
    Ok(failures)
}
