//! Decode-step boundary between the generation loop and a model.

use crate::error::InferenceError;
use crate::tensor::{Tensor, TokenTensor};

/// Executes model decode steps and turns their logits into token ids.
///
/// Both calls are blocking. A decoder that keeps per-step state (a KV
/// cache) is driven with a `[1, 1]` buffer after prefill; a stateless one
/// is handed the full `[1, N]` history each step.
pub trait Decoder {
    /// Run one decode step over `tokens` at sequence position `pos`: 0 for
    /// prefill, then the index of the newest token in the buffer.
    ///
    /// # Errors
    /// Any model execution failure. The loop treats it as fatal.
    fn step(&mut self, tokens: &TokenTensor, pos: usize) -> Result<Tensor, InferenceError>;

    /// Map a step's logits to the next token id.
    fn select_token(&mut self, logits: &Tensor) -> u32;

    /// Most positions one sequence may occupy, if the decoder is bounded.
    fn max_seq_len(&self) -> Option<usize> {
        None
    }

    /// Drop any per-sequence state before a new prompt.
    fn reset(&mut self) {}
}
