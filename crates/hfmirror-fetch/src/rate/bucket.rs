use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The wait for a token was interrupted by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait cancelled")]
pub struct Cancelled;

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket gating request frequency.
///
/// Grants are serialized: waiters queue on an async mutex and the holder
/// sleeps until a whole token is available, so concurrent callers never
/// receive more than `capacity` grants in a burst.
pub struct TokenBucket {
    state: Mutex<BucketState>,
    capacity: f64,
    refill_rate: f64,
}

impl TokenBucket {
    /// Create a bucket holding up to `capacity` tokens, refilled at
    /// `refill_rate` tokens per second. A non-positive or non-finite rate
    /// disables limiting.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
            capacity,
            refill_rate,
        }
    }

    /// `rate` requests per second with a burst of one.
    pub fn per_second(rate: f64) -> Self { Self::new(1, rate) }

    fn unlimited(&self) -> bool { !(self.refill_rate.is_finite() && self.refill_rate > 0.0) }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_rate).min(self.capacity);
        state.last_refill = now;
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        if self.unlimited() {
            return true;
        }
        let Ok(mut state) = self.state.try_lock() else {
            return false;
        };
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Wait for a token, aborting as soon as `cancel` fires.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }
        if self.unlimited() {
            return Ok(());
        }

        let mut state = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            state = self.state.lock() => state,
        };

        loop {
            self.refill(&mut state);
            if state.tokens >= 1.0 {
                state.tokens -= 1.0;
                return Ok(());
            }

            let wait = Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate);
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Cancelled),
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_burst_then_empty() {
        let bucket = TokenBucket::new(2, 1.0);

        assert!(bucket.try_acquire());
        assert!(bucket.try_acquire());
        assert!(!bucket.try_acquire());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_refill() {
        let bucket = TokenBucket::per_second(20.0);
        let cancel = CancellationToken::new();

        let start = std::time::Instant::now();
        for _ in 0..3 {
            bucket.acquire(&cancel).await.unwrap();
        }

        // First token is free, the other two need ~50ms each
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_acquire_is_cancellable_mid_wait() {
        let bucket = Arc::new(TokenBucket::per_second(0.01));
        let cancel = CancellationToken::new();
        bucket.acquire(&cancel).await.unwrap();

        let waiter = {
            let bucket = Arc::clone(&bucket);
            let cancel = cancel.clone();
            tokio::spawn(async move { bucket.acquire(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should stop promptly")
            .unwrap();
        assert_eq!(result, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_unlimited_rate_never_blocks() {
        let bucket = TokenBucket::per_second(0.0);
        let cancel = CancellationToken::new();

        for _ in 0..100 {
            bucket.acquire(&cancel).await.unwrap();
        }
        assert!(bucket.try_acquire());
    }

    #[tokio::test]
    async fn test_concurrent_grants_are_serialized() {
        let bucket = Arc::new(TokenBucket::per_second(50.0));
        let cancel = CancellationToken::new();

        let start = std::time::Instant::now();
        let mut handles = vec![];
        for _ in 0..4 {
            let bucket = Arc::clone(&bucket);
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move { bucket.acquire(&cancel).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        // 1 immediate + 3 refills at 20ms
        assert!(start.elapsed() >= Duration::from_millis(55));
    }
}
