use std::time::Duration;

pub const BASE_DELAY_MS: u64 = 3000;
pub const MULTIPLIER: f64 = 1.5;
pub const MAX_ATTEMPTS: u32 = 5;

/// Reconnect schedule: 3 s, then ×1.5 per attempt, at most five attempts.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    multiplier: f64,
    max_attempts: u32,
    attempts: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(BASE_DELAY_MS), MULTIPLIER, MAX_ATTEMPTS)
    }
}

impl ReconnectBackoff {
    pub fn new(base: Duration, multiplier: f64, max_attempts: u32) -> Self {
        Self {
            base,
            multiplier,
            max_attempts,
            attempts: 0,
        }
    }

    /// Delay before the next attempt, or `None` once attempts are exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let factor = self.multiplier.powi(self.attempts as i32);
        self.attempts += 1;
        let millis = (self.base.as_millis() as f64 * factor).floor() as u64;
        Some(Duration::from_millis(millis))
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Called after a successful connection.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
