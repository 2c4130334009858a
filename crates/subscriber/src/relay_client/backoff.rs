//! Reconnect delays: exponential growth, capped, with jitter.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Give up after this many consecutive failed attempts. `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            multiplier: 2.0,
            max_retries: None,
        }
    }
}

/// Delay generator for one subscription. Call [`Backoff::reset`] after a
/// successful connect.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    attempt: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Un-jittered delay for the current attempt.
    pub fn ceiling(&self) -> Duration {
        let multiplier = self.config.multiplier.max(1.0);
        let exp = i32::try_from(self.attempt).unwrap_or(i32::MAX);
        let secs = self.config.initial.as_secs_f64() * multiplier.powi(exp);
        let max = self.config.max.max(self.config.initial);
        if secs.is_finite() && secs < max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            max
        }
    }

    /// Next delay, drawn uniformly from `[ceiling / 2, ceiling]`, or `None`
    /// once `max_retries` is exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.config.max_retries {
            if self.attempt >= max {
                return None;
            }
        }
        let ceiling = self.ceiling().as_millis() as u64;
        self.attempt = self.attempt.saturating_add(1);
        let half = ceiling / 2;
        let jittered = rand::thread_rng().gen_range(half..=ceiling);
        Some(Duration::from_millis(jittered))
    }
}
