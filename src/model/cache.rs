// Per-sequence decode state for incremental decoding.
//
// Records every token the model has consumed so far, pre-allocated for
// `max_seq_len` positions. A step must start exactly where the previous one
// ended; anything else means the caller lost track of the position cursor.

use crate::error::InferenceError;

pub struct TokenCache {
    /// Consumed tokens, indexed by sequence position.
    tokens: Vec<u32>,
    /// Maximum sequence length this cache supports.
    max_seq_len: usize,
}

impl TokenCache {
    pub fn new(max_seq_len: usize) -> Self {
        Self {
            tokens: Vec::with_capacity(max_seq_len),
            max_seq_len,
        }
    }

    /// Record `ids` as occupying positions `pos..pos + ids.len()`.
    pub fn append(&mut self, pos: usize, ids: &[u32]) -> Result<(), InferenceError> {
        if pos != self.tokens.len() {
            return Err(InferenceError::Model(format!(
                "cache position mismatch: step at pos={} but cache holds {} positions",
                pos,
                self.tokens.len()
            )));
        }
        if pos + ids.len() > self.max_seq_len {
            return Err(InferenceError::Model(format!(
                "cache overflow: pos={} + n_tokens={} > max_seq_len={}",
                pos,
                ids.len(),
                self.max_seq_len
            )));
        }
        self.tokens.extend_from_slice(ids);
        Ok(())
    }

    /// Number of positions filled so far.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn last(&self) -> Option<u32> {
        self.tokens.last().copied()
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    /// Reset to empty without releasing the allocation.
    pub fn clear(&mut self) {
        self.tokens.clear();
    }
}
