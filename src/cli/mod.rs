//! Shared helpers for the strata-tokengen binary.

use std::io::{Read, Write};
use std::path::Path;

use tracing::warn;

use crate::engine::StopHandle;
use crate::error::InferenceError;

/// Initialize tracing/logging to stderr.
///
/// If `disable` is true, no output is produced.
/// Otherwise respects `RUST_LOG` env var, defaulting to WARN.
pub fn init_logging(disable: bool) {
    use tracing_subscriber::EnvFilter;

    if disable {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (tests, embedding callers) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Read the prompt from one of: prompt string, file path, or stdin.
pub fn read_input(
    prompt: Option<&str>,
    file: Option<&Path>,
    use_stdin: bool,
) -> Result<String, InferenceError> {
    if let Some(text) = prompt {
        return Ok(text.to_string());
    }

    if let Some(path) = file {
        return std::fs::read_to_string(path).map_err(|e| {
            InferenceError::InvalidArgument(format!(
                "Failed to read file '{}': {}",
                path.display(),
                e
            ))
        });
    }

    if use_stdin {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }

    Err(InferenceError::InvalidArgument(
        "No input provided. Use --prompt, --file, --token-ids or --stdin".to_string(),
    ))
}

/// Parse a comma-separated list of token IDs, e.g. `"1, 15043,3186"`.
pub fn parse_token_ids(s: &str) -> Result<Vec<u32>, InferenceError> {
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u32>().map_err(|_| {
                InferenceError::InvalidArgument(format!("Invalid token ID: '{}'", part))
            })
        })
        .collect()
}

/// Streams generated text to a writer, flushing after every piece.
///
/// The first write error stops generation through `stop` and silences the
/// stream, so a closed pipe costs one failed write instead of one per token.
pub struct TokenStream<W: Write> {
    writer: W,
    stop: StopHandle,
    open: bool,
}

impl<W: Write> TokenStream<W> {
    pub fn new(writer: W, stop: StopHandle) -> Self {
        Self {
            writer,
            stop,
            open: true,
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn write_piece(&mut self, piece: &str) {
        if !self.open {
            return;
        }
        let result = self
            .writer
            .write_all(piece.as_bytes())
            .and_then(|()| self.writer.flush());
        if let Err(e) = result {
            warn!(error = %e, "Output closed, stopping generation");
            self.open = false;
            self.stop.stop();
        }
    }
}
