//! Generation timing and token counters.
//!
//! [`StatsSink`] is the hook the generation loop calls around token
//! selection. [`Stats`] is the recorder used by the runner: it adds up
//! sampling time and timestamps the prefill/decode phases, then renders a
//! serialisable [`StatsReport`].

use std::time::{Duration, Instant};

use serde::Serialize;

/// Receives sampling boundaries from the generation loop.
pub trait StatsSink {
    fn on_sampling_begin(&mut self);
    fn on_sampling_end(&mut self);
}

/// Discards all notifications.
impl StatsSink for () {
    fn on_sampling_begin(&mut self) {}
    fn on_sampling_end(&mut self) {}
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub num_prompt_tokens: usize,
    pub num_generated_tokens: usize,
    inference_start: Option<Instant>,
    prompt_eval_end: Option<Instant>,
    first_token: Option<Instant>,
    inference_end: Option<Instant>,
    sampling_started: Option<Instant>,
    sampling_time: Duration,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_inference_start(&mut self) {
        self.inference_start = Some(Instant::now());
    }

    pub fn on_prompt_eval_end(&mut self) {
        self.prompt_eval_end = Some(Instant::now());
    }

    pub fn on_first_token(&mut self) {
        self.first_token = Some(Instant::now());
    }

    pub fn on_inference_end(&mut self) {
        self.inference_end = Some(Instant::now());
    }

    /// Total time spent between matched sampling begin/end pairs.
    pub fn sampling_time(&self) -> Duration {
        self.sampling_time
    }

    pub fn report(&self) -> StatsReport {
        let prompt_eval = span(self.inference_start, self.prompt_eval_end);
        let generation = span(self.prompt_eval_end, self.inference_end);

        StatsReport {
            prompt_tokens: self.num_prompt_tokens,
            generated_tokens: self.num_generated_tokens,
            prompt_eval_ms: to_ms(prompt_eval),
            time_to_first_token_ms: to_ms(span(self.inference_start, self.first_token)),
            generation_ms: to_ms(generation),
            total_ms: to_ms(span(self.inference_start, self.inference_end)),
            sampling_ms: to_ms(self.sampling_time),
            prompt_tok_per_sec: rate(self.num_prompt_tokens, prompt_eval),
            generation_tok_per_sec: rate(self.num_generated_tokens, generation),
        }
    }
}

impl StatsSink for Stats {
    fn on_sampling_begin(&mut self) {
        self.sampling_started = Some(Instant::now());
    }

    fn on_sampling_end(&mut self) {
        // An end without a begin is ignored.
        if let Some(start) = self.sampling_started.take() {
            self.sampling_time += start.elapsed();
        }
    }
}

/// Timing summary, in milliseconds and tokens per second.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    pub prompt_eval_ms: f64,
    pub time_to_first_token_ms: f64,
    pub generation_ms: f64,
    pub total_ms: f64,
    pub sampling_ms: f64,
    pub prompt_tok_per_sec: f64,
    pub generation_tok_per_sec: f64,
}

fn span(start: Option<Instant>, end: Option<Instant>) -> Duration {
    match (start, end) {
        (Some(s), Some(e)) => e.saturating_duration_since(s),
        _ => Duration::ZERO,
    }
}

fn to_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn rate(tokens: usize, d: Duration) -> f64 {
    let secs = d.as_secs_f64();
    if secs > 0.0 {
        tokens as f64 / secs
    } else {
        0.0
    }
}
