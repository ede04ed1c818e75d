//! Per-file transcription and output formatting.

use std::io::Write;
use std::path::{Path, PathBuf};

use hark_transcription::{Transcript, TranscriptionService, read_audio_file};
use serde::Serialize;
use tracing::{error, info};

/// One transcribed file, as printed under `--json`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    /// Path as given on the command line.
    pub file: String,
    /// Decoded text.
    pub text: String,
    /// Audio duration in seconds.
    pub duration_seconds: f64,
    /// Output cells the model declared.
    pub token_count: usize,
}

impl FileReport {
    /// Report for `path`.
    pub fn new(path: &Path, transcript: Transcript) -> Self {
        Self {
            file: path.display().to_string(),
            text: transcript.text,
            duration_seconds: transcript.duration_seconds,
            token_count: transcript.token_count,
        }
    }

    /// The output line, without trailing newline.
    pub fn render(&self, json: bool) -> String {
        if json {
            serde_json::to_string(self).unwrap_or_else(|_| self.text.clone())
        } else {
            self.text.clone()
        }
    }
}

/// Transcribe `files` in order with the already-loaded `service`.
///
/// Each success prints one line to `out`. Each failure prints
/// `<file>: <error>` to `err` and the loop moves on. Returns the number of
/// files that failed.
pub async fn transcribe_files<O: Write, E: Write>(
    service: &TranscriptionService,
    files: &[PathBuf],
    json: bool,
    out: &mut O,
    err: &mut E,
) -> std::io::Result<usize> {
    let mut failures = 0;
    for path in files {
        let result = match read_audio_file(path) {
            Ok(bytes) => service.transcribe(bytes).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(transcript) => {
                let report = FileReport::new(path, transcript);
                info!(file = %report.file, tokens = report.token_count, "transcribed file");
                writeln!(out, "{}", report.render(json))?;
            }
            Err(e) => {
                failures += 1;
                error!(file = %path.display(), retryable = e.is_retryable(), "transcription failed: {e}");
                writeln!(err, "{}: {e}", path.display())?;
            }
        }
    }
    out.flush()?;
    Ok(failures)
}
