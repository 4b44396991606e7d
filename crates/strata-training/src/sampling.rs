use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fixed-capacity uniform sample over a stream of unknown length.
#[derive(Debug, Clone)]
pub struct ReservoirSampler<T> {
    capacity: usize,
    seen: u64,
    sample: Vec<T>,
    rng: StdRng,
}

impl<T> ReservoirSampler<T> {
    pub fn new(capacity: usize, seed: u64) -> Self {
        Self {
            capacity,
            seen: 0,
            sample: Vec::with_capacity(capacity.min(4096)),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn offer(&mut self, item: T) {
        self.seen += 1;
        if self.sample.len() < self.capacity {
            self.sample.push(item);
            return;
        }
        let slot = self.rng.gen_range(0..self.seen);
        if let Some(existing) = usize::try_from(slot).ok().and_then(|i| self.sample.get_mut(i)) {
            *existing = item;
        }
    }

    /// Items offered so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    pub fn len(&self) -> usize {
        self.sample.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }

    /// Take the current sample and start over with the same seed.
    pub fn drain(&mut self, seed: u64) -> Vec<T> {
        self.seen = 0;
        self.rng = StdRng::seed_from_u64(seed);
        std::mem::take(&mut self.sample)
    }
}
