//! Throughput estimation and progress-report pacing.

mod average;

use std::time::{Duration, Instant};

pub use average::{eta_ms, MovingAverage, RateSampler};

/// Lets a report through at most once per `interval`.
#[derive(Debug, Clone)]
pub struct ReportThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ReportThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True (and the clock restarts) when a report is due.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }
}
