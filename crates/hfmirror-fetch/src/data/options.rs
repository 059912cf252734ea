use std::time::Duration;

use crate::core::RetryPolicy;

pub const DEFAULT_CONCURRENCY: usize = 8;
pub const DEFAULT_API_RATE: f64 = 10.0;
pub const DEFAULT_MAX_TREE_DEPTH: usize = 64;

/// Engine configuration for one mirror run.
///
/// # Examples
///
/// ```
/// use hfmirror_fetch::FetchOptions;
/// use std::time::Duration;
///
/// let options = FetchOptions::default()
///     .concurrency(4)
///     .max_attempts(3)
///     .retry_base_delay(Duration::from_secs(1));
/// assert_eq!(options.concurrency, 4);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    /// Maximum number of files transferred at once.
    ///
    /// Default: 8
    pub concurrency: usize,

    /// Attempt ceiling and backoff schedule for each file.
    pub retry: RetryPolicy,

    /// Listing requests granted per second.
    ///
    /// Default: 10
    pub api_rate: f64,

    /// Listing requests that may be issued back to back.
    ///
    /// Default: 1
    pub api_burst: u32,

    /// Deepest directory level the tree walk will descend into.
    ///
    /// Default: 64
    pub max_tree_depth: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
            api_rate: DEFAULT_API_RATE,
            api_burst: 1,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }
}

impl FetchOptions {
    pub fn concurrency(mut self, workers: usize) -> Self {
        self.concurrency = workers.max(1);
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.retry.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    pub fn retry_step(mut self, step: Duration) -> Self {
        self.retry.step = step;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn api_rate(mut self, per_second: f64) -> Self {
        self.api_rate = per_second;
        self
    }

    pub fn api_burst(mut self, burst: u32) -> Self {
        self.api_burst = burst.max(1);
        self
    }

    pub fn max_tree_depth(mut self, depth: usize) -> Self {
        self.max_tree_depth = depth;
        self
    }
}
