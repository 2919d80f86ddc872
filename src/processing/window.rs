use std::collections::VecDeque;

// ENERGY WINDOW ---------------------------------------------------------------

/// Bounded FIFO of the most recent energy samples. The oldest sample is
/// evicted first, and the length never exceeds the capacity.
#[derive(Debug, Clone)]
pub struct EnergyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl EnergyWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, sample: f64) {
        self.samples.push_back(sample);
        self.evict_overflow();
    }

    /// Change the capacity. Shrinking drops the oldest samples immediately.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.evict_overflow();
    }

    fn evict_overflow(&mut self) {
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Mean of the `count` most recent samples, or of all samples if fewer.
    pub fn recent_mean(&self, count: usize) -> Option<f64> {
        let take = count.min(self.samples.len());
        if take == 0 {
            return None;
        }
        let sum: f64 = self.samples.iter().rev().take(take).sum();
        Some(sum / take as f64)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    pub fn iter(&self) -> impl Iterator<Item = &f64> {
        self.samples.iter()
    }
}
