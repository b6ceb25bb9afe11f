//! Checkpoint timing for the check algorithms.

use std::time::Instant;

use tracing::info;

/// A named timer that logs elapsed milliseconds at each checkpoint and a
/// total on finish.
pub struct Timer {
    name: String,
    started: Instant,
    last: Instant,
}

impl Timer {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            name: name.into(),
            started: now,
            last: now,
        }
    }

    /// Log the time since the previous checkpoint (or start).
    pub fn checkpoint(&mut self, message: &str) {
        let elapsed_ms = self.last.elapsed().as_millis() as u64;
        self.last = Instant::now();
        info!(timer = %self.name, elapsed_ms, "{message}");
    }

    /// Log the total elapsed time and consume the timer.
    pub fn finish(self) {
        let total_ms = self.started.elapsed().as_millis() as u64;
        info!(timer = %self.name, total_ms, "finished");
    }
}
