//! Bigram language model: the next-token logits depend only on the current token.
//!
//! It implements [`Decoder`] in both modes. With a [`TokenCache`] it runs
//! incrementally and accepts a single new token per step; without one it is
//! stateless and reads the last token of the full history it is given.

use tracing::debug;

use crate::engine::decoder::Decoder;
use crate::engine::sampler::{Sampler, SamplingConfig};
use crate::error::InferenceError;
use crate::tensor::{Tensor, TokenTensor};

use super::cache::TokenCache;
use super::config::ModelFile;

pub struct BigramModel {
    vocab_size: usize,
    /// Row-major `[vocab_size, vocab_size]` transition logits.
    logits: Vec<f32>,
    max_seq_len: usize,
    cache: Option<TokenCache>,
    sampler: Sampler,
}

impl BigramModel {
    /// Build a model from a [`ModelFile`].
    ///
    /// # Errors
    /// Whatever [`ModelFile::validate`] rejects: ragged or short logits
    /// rows, out-of-range special ids, a zero `max_seq_len`.
    pub fn new(
        file: &ModelFile,
        sampling: SamplingConfig,
        use_kv_cache: bool,
    ) -> Result<Self, InferenceError> {
        file.validate()?;
        let vocab_size = file.vocab_size();
        let logits: Vec<f32> = file.logits.iter().flatten().copied().collect();
        let cache = use_kv_cache.then(|| TokenCache::new(file.max_seq_len));

        debug!(vocab_size, use_kv_cache, max_seq_len = file.max_seq_len, "Bigram model built");

        Ok(Self {
            vocab_size,
            logits,
            max_seq_len: file.max_seq_len,
            cache,
            sampler: Sampler::new(sampling),
        })
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn uses_kv_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Positions currently held by the cache, if any.
    pub fn cached_len(&self) -> Option<usize> {
        self.cache.as_ref().map(TokenCache::len)
    }

    fn row(&self, token: u32) -> Result<&[f32], InferenceError> {
        let t = token as usize;
        if t >= self.vocab_size {
            return Err(InferenceError::Model(format!(
                "token id {} out of range (vocab_size={})",
                token, self.vocab_size
            )));
        }
        Ok(&self.logits[t * self.vocab_size..(t + 1) * self.vocab_size])
    }
}

impl Decoder for BigramModel {
    fn step(&mut self, tokens: &TokenTensor, pos: usize) -> Result<Tensor, InferenceError> {
        let Some(last) = tokens.last() else {
            return Err(InferenceError::ShapeMismatch {
                expected: vec![1, 1],
                actual: tokens.shape().to_vec(),
            });
        };
        // Reject bad ids before they reach the cache.
        for &id in tokens.ids() {
            self.row(id)?;
        }

        match self.cache.as_mut() {
            Some(cache) => cache.append(pos, tokens.ids())?,
            None => {
                if tokens.len() > self.max_seq_len {
                    return Err(InferenceError::Model(format!(
                        "sequence of {} tokens exceeds max_seq_len={}",
                        tokens.len(),
                        self.max_seq_len
                    )));
                }
            }
        }

        Ok(Tensor::new(vec![1, self.vocab_size], self.row(last)?.to_vec()))
    }

    fn select_token(&mut self, logits: &Tensor) -> u32 {
        self.sampler.sample(logits.last_row())
    }

    fn max_seq_len(&self) -> Option<usize> {
        Some(self.max_seq_len)
    }

    fn reset(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            cache.clear();
        }
    }
}
