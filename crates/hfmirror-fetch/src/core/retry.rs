use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_STEP: Duration = Duration::from_secs(1);

/// Attempt ceiling and backoff schedule.
///
/// Pure: it only maps an attempt index to a delay and answers whether
/// another attempt is allowed. The async driver lives in the effects layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Constant part of every delay.
    pub base_delay: Duration,
    /// Multiplied by the squared attempt index.
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            step: DEFAULT_STEP,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, step: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            step,
        }
    }

    /// A policy that retries immediately, mostly useful in tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Delay to wait after the failed attempt `attempt` (0-indexed).
    ///
    /// The schedule is quadratic: `step * attempt² + base_delay`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use hfmirror_fetch::core::RetryPolicy;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay(0), Duration::from_secs(3));
    /// assert_eq!(policy.delay(1), Duration::from_secs(4));
    /// assert_eq!(policy.delay(2), Duration::from_secs(7));
    /// ```
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = attempt.saturating_mul(attempt);
        self.step
            .saturating_mul(factor)
            .saturating_add(self.base_delay)
    }

    /// Whether another attempt may follow the failed attempt `attempt`.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts
    }
}
