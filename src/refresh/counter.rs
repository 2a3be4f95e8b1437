use std::sync::atomic::{AtomicUsize, Ordering};

/// Articles found new since the start of the current sync cycle.
#[derive(Debug, Default)]
pub struct NewArticleCounter(AtomicUsize);

impl NewArticleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `n` and returns the new total.
    pub fn add(&self, n: usize) -> usize {
        self.0.fetch_add(n, Ordering::AcqRel) + n
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::Release);
    }
}
