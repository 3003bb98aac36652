// Token selection for the reference decoder.
//
// Greedy (argmax) and stochastic sampling with temperature, top-k and top-p
// filtering over one logits row. The generation loop never calls this
// directly; it goes through `Decoder::select_token`.

use serde::{Deserialize, Serialize};

/// Sampling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Temperature for logit scaling. 0.0 = greedy (argmax).
    pub temperature: f32,
    /// Top-K: keep only the top-k highest logits. 0 = disabled.
    pub top_k: usize,
    /// Top-P (nucleus): cumulative probability cutoff. 1.0 = disabled.
    pub top_p: f32,
    /// Random seed for reproducibility.
    pub seed: Option<u64>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            top_k: 0,
            top_p: 1.0,
            seed: None,
        }
    }
}

impl SamplingConfig {
    pub fn is_greedy(&self) -> bool {
        self.temperature <= 0.0
    }
}

/// XorShift64 RNG.
#[derive(Debug, Clone)]
pub struct XorShiftRng {
    state: u64,
}

impl XorShiftRng {
    /// Create a new RNG from a seed. Seed of 0 is adjusted to 1.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Random f32 in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u64() >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Seed used when the config does not name one.
const DEFAULT_SEED: u64 = 42;

/// A sampling config bundled with its RNG state.
#[derive(Debug, Clone)]
pub struct Sampler {
    config: SamplingConfig,
    rng: XorShiftRng,
}

impl Sampler {
    pub fn new(config: SamplingConfig) -> Self {
        let rng = XorShiftRng::new(config.seed.unwrap_or(DEFAULT_SEED));
        Self { config, rng }
    }

    pub fn config(&self) -> &SamplingConfig {
        &self.config
    }

    /// Pick one token index from a logits row. Empty rows yield 0.
    pub fn sample(&mut self, logits: &[f32]) -> u32 {
        if logits.is_empty() {
            return 0;
        }
        if self.config.is_greedy() {
            return argmax(logits);
        }

        let mut candidates = scale_by_temperature(logits, self.config.temperature);
        if self.config.top_k > 0 && self.config.top_k < candidates.len() {
            sort_descending(&mut candidates);
            candidates.truncate(self.config.top_k);
        }

        let mut probs = softmax(candidates);
        if self.config.top_p < 1.0 {
            nucleus_filter(&mut probs, self.config.top_p);
        }

        let r = self.rng.next_f32();
        let mut cumulative = 0.0f32;
        for &(idx, p) in &probs {
            cumulative += p;
            if r < cumulative {
                return idx;
            }
        }
        // Rounding can leave `cumulative` just under 1.0.
        probs.last().map_or(0, |c| c.0)
    }
}

/// Index of the largest logit. NaN entries are never selected.
pub fn argmax(logits: &[f32]) -> u32 {
    let mut best_idx = 0u32;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &v) in logits.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i as u32;
        }
    }
    best_idx
}

fn scale_by_temperature(logits: &[f32], temperature: f32) -> Vec<(u32, f32)> {
    logits
        .iter()
        .enumerate()
        .map(|(i, &l)| (i as u32, l / temperature))
        .collect()
}

fn sort_descending(entries: &mut [(u32, f32)]) {
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
}

fn softmax(candidates: Vec<(u32, f32)>) -> Vec<(u32, f32)> {
    let max_logit = candidates
        .iter()
        .map(|c| c.1)
        .fold(f32::NEG_INFINITY, f32::max);
    let mut probs: Vec<(u32, f32)> = candidates
        .into_iter()
        .map(|(idx, logit)| (idx, (logit - max_logit).exp()))
        .collect();
    let sum: f32 = probs.iter().map(|c| c.1).sum();
    for c in &mut probs {
        c.1 /= sum;
    }
    probs
}

/// Keep the smallest prefix (by descending probability) whose mass reaches
/// `top_p`, then renormalize.
fn nucleus_filter(probs: &mut Vec<(u32, f32)>, top_p: f32) {
    sort_descending(probs);
    let mut cumulative = 0.0f32;
    let mut cutoff = probs.len();
    for (i, &(_, p)) in probs.iter().enumerate() {
        cumulative += p;
        if cumulative >= top_p {
            cutoff = i + 1;
            break;
        }
    }
    probs.truncate(cutoff);

    let sum: f32 = probs.iter().map(|c| c.1).sum();
    for c in probs.iter_mut() {
        c.1 /= sum;
    }
}
