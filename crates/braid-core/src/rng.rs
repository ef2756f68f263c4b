use std::sync::atomic::{AtomicU64, Ordering};

/// Deterministic SplitMix64 generator.
///
/// Two generators built from the same seed produce identical sequences for
/// every method below, which is what makes graph runs replayable.
#[derive(Debug, Clone, PartialEq)]
pub struct SeededRng {
    state: u64,
    seed: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed, seed }
    }

    /// The seed this generator was created from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform float in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        let mantissa = self.next_u64() >> 11;
        mantissa as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in `[min, max]` (both inclusive). Bounds may be given in either order.
    pub fn int(&mut self, min: i64, max: i64) -> i64 {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        let span = (hi as i128 - lo as i128 + 1) as u128;
        let offset = (self.next_u64() as u128) % span;
        (lo as i128 + offset as i128) as i64
    }

    /// Uniform float in `[min, max)`.
    pub fn float(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next()
    }

    /// `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next() < p
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let idx = self.int(0, items.len() as i64 - 1) as usize;
        items.get(idx)
    }

    /// In-place Fisher–Yates shuffle.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.int(0, i as i64) as usize;
            items.swap(i, j);
        }
    }
}

/// Monotonically advancing seed source.
///
/// Contexts and construction scripts draw their seeds from one sequence in
/// creation order, so replaying the same base seed reproduces a whole run.
#[derive(Debug)]
pub struct SeedSequence {
    base: u64,
    counter: AtomicU64,
}

impl SeedSequence {
    pub fn new(base: u64) -> Self {
        Self {
            base,
            counter: AtomicU64::new(0),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    /// Number of seeds handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn next_seed(&self) -> u64 {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        SeededRng::new(self.base ^ n.wrapping_mul(0xD1B5_4A32_4F3A_9E55)).next_u64()
    }

    pub fn next_rng(&self) -> SeededRng {
        SeededRng::new(self.next_seed())
    }
}

impl Default for SeedSequence {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_SEED)
    }
}
