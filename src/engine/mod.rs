//! Token generation.
//!
//! - [`TokenGenerator`]: the autoregressive decode loop over a [`Decoder`]
//! - [`TextRunner`]: prompt text in, streamed text out (prefill + loop)
//! - [`Sampler`]: greedy / temperature / top-k / top-p token selection
//! - [`Stats`]: timing and token counters

pub mod decoder;
pub mod generate;
pub mod runner;
pub mod sampler;
pub mod stats;

pub use decoder::Decoder;
pub use generate::{CacheMode, GenerationOutcome, StopHandle, StopReason, TokenGenerator};
pub use runner::{GenerationConfig, GenerationOutput, TextRunner};
pub use sampler::{Sampler, SamplingConfig};
pub use stats::{Stats, StatsReport, StatsSink};
