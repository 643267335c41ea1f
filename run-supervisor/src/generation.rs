//! Run generation counter.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Monotonic identifier of the current run.
///
/// The counter is only reachable through operations that hold its lock, so a
/// caller that checks the generation and then writes output cannot be
/// interleaved with a reset for the next generation.
#[derive(Debug, Default)]
pub struct Generation {
    current: Mutex<u64>,
}

impl Generation {
    /// Create a counter at generation zero. The first run is generation one.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new generation and return its id.
    pub fn advance(&self) -> u64 {
        let mut current = self.lock();
        *current += 1;
        *current
    }

    /// The live generation.
    pub fn current(&self) -> u64 {
        *self.lock()
    }

    /// Whether `id` is still the live generation.
    pub fn is_current(&self, id: u64) -> bool {
        *self.lock() == id
    }

    /// Run `f` under the lock if `id` is still live.
    pub fn if_current<R>(&self, id: u64, f: impl FnOnce() -> R) -> Option<R> {
        let current = self.lock();
        (*current == id).then(f)
    }

    /// Run `f` under the lock regardless of which generation is live.
    pub fn serialized<R>(&self, f: impl FnOnce() -> R) -> R {
        let _current = self.lock();
        f()
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_generations_strictly_increase() {
        let generation = Generation::new();
        assert_eq!(generation.current(), 0);
        assert_eq!(generation.advance(), 1);
        assert_eq!(generation.advance(), 2);
        assert_eq!(generation.current(), 2);
    }

    #[test]
    fn test_stale_generation_writes_are_skipped() {
        let generation = Generation::new();
        let first = generation.advance();
        assert_eq!(generation.if_current(first, || "written"), Some("written"));

        let second = generation.advance();
        assert!(!generation.is_current(first));
        assert_eq!(generation.if_current(first, || "written"), None);
        assert_eq!(generation.if_current(second, || "written"), Some("written"));
    }
}
