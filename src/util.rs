use tokio::time::Instant;

/// Whole-second monotonic clock.
///
/// Backed by `tokio::time::Instant`, so a paused test runtime controls it
/// together with every timeout the crate waits on.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now(&self) -> u64 {
        Instant::now().duration_since(self.start).as_secs()
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
