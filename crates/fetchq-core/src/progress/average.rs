use std::collections::VecDeque;
use std::time::Instant;

/// Weighted moving average over the last `window` samples. The newest sample
/// carries weight `n`, the oldest weight 1.
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window: usize,
    samples: VecDeque<f64>,
}

impl Default for MovingAverage {
    fn default() -> Self {
        Self::new(5)
    }
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn push(&mut self, sample: f64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 0.0 until the first sample arrives.
    pub fn average(&self) -> f64 {
        let mut weighted = 0.0;
        let mut weights = 0.0;
        for (i, s) in self.samples.iter().enumerate() {
            let w = (i + 1) as f64;
            weighted += s * w;
            weights += w;
        }
        if weights == 0.0 {
            0.0
        } else {
            weighted / weights
        }
    }
}

/// Turns cumulative byte counts into a smoothed bytes-per-second rate.
#[derive(Debug, Clone)]
pub struct RateSampler {
    average: MovingAverage,
    last_bytes: u64,
    last_at: Instant,
}

impl RateSampler {
    pub fn new(initial_bytes: u64, now: Instant) -> Self {
        Self {
            average: MovingAverage::default(),
            last_bytes: initial_bytes,
            last_at: now,
        }
    }

    /// Record the cumulative count at `now` and return the smoothed rate.
    /// Samples closer together than 1 ms are ignored.
    pub fn sample(&mut self, bytes: u64, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_at).as_secs_f64();
        if elapsed >= 0.001 {
            let delta = bytes.saturating_sub(self.last_bytes) as f64;
            self.average.push(delta / elapsed);
            self.last_bytes = bytes;
            self.last_at = now;
        }
        self.average.average()
    }

    pub fn bytes_per_second(&self) -> f64 {
        self.average.average()
    }
}

/// Estimated milliseconds left, or -1 while the total or the rate is unknown.
/// Whole seconds, rounded up.
pub fn eta_ms(total: i64, downloaded: u64, bytes_per_second: f64) -> i64 {
    if total < 0 || bytes_per_second <= 0.0 {
        return -1;
    }
    let remaining = (total as u64).saturating_sub(downloaded) as f64;
    let secs = (remaining / bytes_per_second).ceil() as i64;
    secs.saturating_mul(1000)
}
