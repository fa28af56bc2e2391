use std::time::Duration;

/// Configuration for reconnection behavior
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay unit; attempt `n` waits `base_delay * multiplier^n`
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
    /// Maximum number of reconnection attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before reconnection attempt `attempt` (1-based)
    ///
    /// With the defaults this yields 2s, 4s, 8s, 16s, 32s for attempts 1..=5.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(30) as i32;
        let secs = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        std::cmp::min(Duration::from_secs_f64(secs), self.max_delay)
    }

    /// Whether another attempt may be made after `attempts` have been used
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
