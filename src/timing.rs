//! Build phase timing.

use std::time::{Duration, Instant};

/// Measures how long one phase of an image build took.
pub struct Timer {
    phase: String,
    start: Instant,
}

impl Timer {
    /// Start timing `phase`.
    pub fn start(phase: &str) -> Self {
        Self {
            phase: phase.to_string(),
            start: Instant::now(),
        }
    }

    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and print the phase duration.
    pub fn finish(self) {
        let secs = self.elapsed().as_secs_f64();
        tracing::debug!(phase = %self.phase, secs, "phase finished");
        if secs >= 1.0 {
            println!("  [{:.1}s] {}", secs, self.phase);
        } else {
            println!("  [{:.0}ms] {}", secs * 1000.0, self.phase);
        }
    }
}
