//! Text-level runner: prompt in, streamed text out.
//!
//! [`TextRunner`] owns a tokenizer and a decoder. It encodes the prompt,
//! runs prefill to get the first token, then hands the rest of the
//! generation to a [`TokenGenerator`].

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::InferenceError;
use crate::tensor::TokenTensor;
use crate::tokenizer::{TextCodec, Tokenizer, TokenizerCodec};

use super::decoder::Decoder;
use super::generate::{StopHandle, StopReason, TokenGenerator};
use super::sampler::SamplingConfig;
use super::stats::{Stats, StatsSink};

/// Configuration for one generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Total sequence budget: prompt tokens plus generated tokens.
    pub seq_len: usize,
    /// Drive the decoder incrementally (single-token steps after prefill).
    pub use_kv_cache: bool,
    /// End-of-sequence id; falls back to the tokenizer's EOS when unset.
    pub eos_id: Option<u32>,
    /// Prepend BOS when encoding the prompt.
    pub add_bos: bool,
    pub sampling: SamplingConfig,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            seq_len: 128,
            use_kv_cache: true,
            eos_id: None,
            add_bos: true,
            sampling: SamplingConfig::default(),
        }
    }
}

impl GenerationConfig {
    /// Load a config from JSON; missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Output from a runner generation, including metadata.
#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Concatenation of every streamed fragment.
    pub text: String,
    pub prompt_tokens: usize,
    /// Tokens produced, counting the one selected from prefill.
    pub generated_tokens: usize,
    pub stop_reason: StopReason,
    pub stats: Stats,
}

pub struct TextRunner {
    tokenizer: Box<dyn Tokenizer>,
    decoder: Box<dyn Decoder + Send>,
    config: GenerationConfig,
    stop: StopHandle,
}

impl TextRunner {
    pub fn new(
        tokenizer: Box<dyn Tokenizer>,
        decoder: Box<dyn Decoder + Send>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            tokenizer,
            decoder,
            config,
            stop: StopHandle::new(),
        }
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    /// Stop the in-flight generation after its current token.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// A handle that can stop generation from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// The configured EOS id, or the tokenizer's.
    pub fn eos_id(&self) -> Result<u32, InferenceError> {
        self.config
            .eos_id
            .or_else(|| self.tokenizer.eos_token_id())
            .ok_or_else(|| {
                InferenceError::InvalidArgument("no end-of-sequence token id configured".to_string())
            })
    }

    /// Encode `prompt` and generate from it, streaming text to `on_token`.
    pub fn generate<F>(&mut self, prompt: &str, on_token: F) -> Result<GenerationOutput, InferenceError>
    where
        F: FnMut(&str),
    {
        let prompt_ids = self.tokenizer.encode(prompt, self.config.add_bos);
        self.generate_from_token_ids(&prompt_ids, on_token)
    }

    /// Generate from pre-tokenized input, bypassing the tokenizer's encoder.
    ///
    /// `seq_len` is capped at the decoder's [`Decoder::max_seq_len`].
    ///
    /// Steps:
    /// 1. Validate prompt length against `seq_len`
    /// 2. Prefill: run all prompt tokens through the decoder at position 0
    /// 3. Select and stream the first token
    /// 4. Decode loop via [`TokenGenerator`] starting at `prompt_ids.len()`
    pub fn generate_from_token_ids<F>(
        &mut self,
        prompt_ids: &[u32],
        mut on_token: F,
    ) -> Result<GenerationOutput, InferenceError>
    where
        F: FnMut(&str),
    {
        let Some(&last_prompt_token) = prompt_ids.last() else {
            return Err(InferenceError::InvalidArgument(
                "prompt tokenized to empty sequence".to_string(),
            ));
        };
        let seq_len = match self.decoder.max_seq_len() {
            Some(capacity) if capacity < self.config.seq_len => {
                debug!(
                    requested = self.config.seq_len,
                    capacity, "Clamping seq_len to decoder capacity"
                );
                capacity
            }
            _ => self.config.seq_len,
        };
        if prompt_ids.len() >= seq_len {
            return Err(InferenceError::InvalidArgument(format!(
                "prompt length ({}) must be less than seq_len ({})",
                prompt_ids.len(),
                seq_len
            )));
        }
        let eos_id = self.eos_id()?;

        // The flag is per run: clear any stop left over from a previous call.
        self.stop.reset();
        self.decoder.reset();

        let mut stats = Stats::new();
        stats.num_prompt_tokens = prompt_ids.len();
        stats.on_inference_start();

        let codec = TokenizerCodec::new(self.tokenizer.as_ref());
        let mut text = String::new();

        let logits = self
            .decoder
            .step(&TokenTensor::from_ids(prompt_ids), 0)
            .map_err(|e| e.into_decode_step(0))?;
        stats.on_prompt_eval_end();

        stats.on_sampling_begin();
        let first_token = self.decoder.select_token(&logits);
        stats.on_sampling_end();
        stats.on_first_token();

        let piece = codec
            .decode_piece(last_prompt_token, first_token)
            .map_err(|e| e.into_tokenizer(first_token))?;
        text.push_str(&piece);
        on_token(&piece);

        debug!(
            first_token,
            prompt_tokens = prompt_ids.len(),
            "Prefill complete, starting decode"
        );

        let (decoded, stop_reason) = if self.stop.is_stopped() {
            (0, StopReason::Cancelled)
        } else if first_token == eos_id {
            info!("Reached the end of generation at prefill");
            (0, StopReason::Eos)
        } else {
            let mut tokens = Vec::with_capacity(seq_len);
            tokens.extend_from_slice(prompt_ids);
            tokens.push(first_token);

            let mut generator = TokenGenerator::new(
                &codec,
                self.decoder.as_mut(),
                self.config.use_kv_cache,
                eos_id,
                &mut stats,
            )
            .with_stop_handle(self.stop.clone());

            let outcome = generator.generate_full(&tokens, prompt_ids.len(), seq_len, |piece| {
                text.push_str(piece);
                on_token(piece);
            })?;
            (outcome.generated, outcome.stop_reason)
        };

        // A byte token cut off by the stop leaves a partial character behind.
        let tail = codec.flush();
        if !tail.is_empty() {
            text.push_str(&tail);
            on_token(&tail);
        }

        stats.num_generated_tokens = 1 + decoded;
        stats.on_inference_end();

        Ok(GenerationOutput {
            text,
            prompt_tokens: prompt_ids.len(),
            generated_tokens: 1 + decoded,
            stop_reason,
            stats,
        })
    }
}
