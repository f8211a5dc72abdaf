use std::time::Duration;

/// Exponential backoff between command attempts: `min(cap, base^(attempt-1))` seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base_secs: u64,
    cap: Duration,
}

impl RetryPolicy {
    pub const DEFAULT_BASE_SECS: u64 = 2;
    pub const DEFAULT_CAP_SECS: u64 = 60;

    pub fn new(base_secs: u64, cap_secs: u64) -> Self {
        Self {
            base_secs,
            cap: Duration::from_secs(cap_secs),
        }
    }

    /// Retries happen back to back.
    pub fn immediate() -> Self {
        Self {
            base_secs: 0,
            cap: Duration::ZERO,
        }
    }

    pub fn base_secs(&self) -> u64 {
        self.base_secs
    }

    pub fn cap(&self) -> Duration {
        self.cap
    }

    /// Delay to wait after the given 1-based attempt failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let secs = self
            .base_secs
            .checked_pow(exponent)
            .unwrap_or(u64::MAX);
        Duration::from_secs(secs).min(self.cap)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_SECS, Self::DEFAULT_CAP_SECS)
    }
}
