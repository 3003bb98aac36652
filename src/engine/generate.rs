//! Token generation loop: decode, select, stream, stop.
//!
//! [`TokenGenerator`] takes the prompt plus the token produced by prefill and
//! keeps stepping the [`Decoder`] until the position cursor reaches
//! `seq_len`, the end-of-sequence token is produced, or a [`StopHandle`] is
//! triggered. Every produced token is decoded to text through a
//! [`TextCodec`] and streamed to the caller before the stop checks run.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::InferenceError;
use crate::tensor::TokenTensor;
use crate::tokenizer::TextCodec;

use super::decoder::Decoder;
use super::stats::StatsSink;

/// How the token buffer is carried between decode steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// The decoder keeps per-step state; each step sees only the newest token.
    Incremental,
    /// The decoder is stateless; each step sees the whole history.
    FullHistory,
}

impl CacheMode {
    pub fn from_use_kv_cache(use_kv_cache: bool) -> Self {
        if use_kv_cache {
            CacheMode::Incremental
        } else {
            CacheMode::FullHistory
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Produced the end-of-sequence token.
    Eos,
    /// The stop flag was set.
    Cancelled,
    /// The position cursor reached `seq_len`.
    SeqLen,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Eos => write!(f, "eos"),
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::SeqLen => write!(f, "seq_len"),
        }
    }
}

/// Result of one [`TokenGenerator::generate_full`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationOutcome {
    /// Tokens produced by this call (final position minus start position).
    pub generated: usize,
    pub stop_reason: StopReason,
}

/// Shared cancellation flag.
///
/// Cloning yields another handle to the same flag, so a handle taken before
/// `generate` starts can stop it from another thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop to stop after the token it is currently producing.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Autoregressive decode loop over borrowed collaborators.
///
/// One instance serves one generation; the stop flag is created with the
/// instance and never cleared by the loop, so a stopped generator stays
/// stopped.
pub struct TokenGenerator<'a> {
    codec: &'a dyn TextCodec,
    decoder: &'a mut dyn Decoder,
    stats: &'a mut dyn StatsSink,
    eos_id: u32,
    mode: CacheMode,
    should_stop: StopHandle,
}

impl<'a> TokenGenerator<'a> {
    pub fn new(
        codec: &'a dyn TextCodec,
        decoder: &'a mut dyn Decoder,
        use_kv_cache: bool,
        eos_id: u32,
        stats: &'a mut dyn StatsSink,
    ) -> Self {
        Self {
            codec,
            decoder,
            stats,
            eos_id,
            mode: CacheMode::from_use_kv_cache(use_kv_cache),
            should_stop: StopHandle::new(),
        }
    }

    /// Replace the generator's stop flag with one owned elsewhere.
    pub fn with_stop_handle(mut self, handle: StopHandle) -> Self {
        self.should_stop = handle;
        self
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn eos_id(&self) -> u32 {
        self.eos_id
    }

    /// Stop the generation loop. Idempotent.
    pub fn stop(&self) {
        self.should_stop.stop();
    }

    /// A handle that can stop this generator from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.should_stop.clone()
    }

    /// Run the generation loop.
    ///
    /// * `tokens` - prompt tokens followed by the token produced by prefill
    /// * `start_pos` - sequence index of the last entry in `tokens`
    /// * `seq_len` - the position cursor never reaches past this bound
    /// * `on_token` - receives the decoded text of each new token, in order
    ///
    /// Returns how many tokens were generated.
    ///
    /// # Errors
    /// `InvalidArgument` for an empty `tokens`, `DecodeStep` if the decoder
    /// fails, `Tokenizer` if a token cannot be decoded to text.
    pub fn generate<F>(
        &mut self,
        tokens: &[u32],
        start_pos: usize,
        seq_len: usize,
        on_token: F,
    ) -> Result<usize, InferenceError>
    where
        F: FnMut(&str),
    {
        self.generate_full(tokens, start_pos, seq_len, on_token)
            .map(|outcome| outcome.generated)
    }

    /// Same as [`generate`](Self::generate), also reporting why the loop ended.
    pub fn generate_full<F>(
        &mut self,
        tokens: &[u32],
        start_pos: usize,
        seq_len: usize,
        mut on_token: F,
    ) -> Result<GenerationOutcome, InferenceError>
    where
        F: FnMut(&str),
    {
        let Some(&last_token) = tokens.last() else {
            return Err(InferenceError::InvalidArgument(
                "token generation loop requires a non-empty token sequence".to_string(),
            ));
        };

        let mut pos = start_pos;
        let mut cur_token = last_token;
        let mut buffer = match self.mode {
            CacheMode::Incremental => TokenTensor::single(cur_token),
            CacheMode::FullHistory => TokenTensor::from_ids(tokens),
        };

        debug!(
            mode = ?self.mode,
            start_pos,
            seq_len,
            input_tokens = tokens.len(),
            "Starting token generation"
        );

        while pos < seq_len {
            let logits = self
                .decoder
                .step(&buffer, pos)
                .map_err(|e| e.into_decode_step(pos))?;

            let prev_token = cur_token;

            self.stats.on_sampling_begin();
            cur_token = self.decoder.select_token(&logits);
            self.stats.on_sampling_end();

            pos += 1;

            match self.mode {
                CacheMode::Incremental => buffer.set_last(cur_token),
                CacheMode::FullHistory => buffer.push(cur_token),
            }

            let piece = self
                .codec
                .decode_piece(prev_token, cur_token)
                .map_err(|e| e.into_tokenizer(cur_token))?;
            on_token(&piece);

            if self.should_stop.is_stopped() {
                debug!(pos, generated = pos - start_pos, "Generation cancelled");
                return Ok(GenerationOutcome {
                    generated: pos - start_pos,
                    stop_reason: StopReason::Cancelled,
                });
            }

            if cur_token == self.eos_id {
                info!(pos, generated = pos - start_pos, "Reached the end of generation");
                return Ok(GenerationOutcome {
                    generated: pos - start_pos,
                    stop_reason: StopReason::Eos,
                });
            }
        }

        debug!(pos, seq_len, "Sequence length reached");
        Ok(GenerationOutcome {
            generated: pos - start_pos,
            stop_reason: StopReason::SeqLen,
        })
    }
}
