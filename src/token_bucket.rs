use tokio::time::Instant;

use crate::RateLimit;

/// Accrues fractional request permits over time, up to the configured
/// capacity. One token buys one dispatched request.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    capacity: f64,
    /// Tokens accrued per second.
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Start with a full bucket.
    pub fn new(rate_limit: RateLimit) -> Self {
        let capacity = f64::from(rate_limit.request_count);
        Self {
            capacity,
            refill_rate: capacity / f64::from(rate_limit.window_seconds),
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Credit the tokens accrued since the last refill, capped at capacity.
    /// A zero elapsed time is a no-op; `now` must not move backwards.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
            self.last_refill = now;
        }
    }

    /// Take one whole token if one is available.
    pub fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn available(&self) -> f64 {
        self.tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::advance;

    const EPSILON: f64 = 1e-9;

    fn bucket(request_count: u32, window_seconds: u32) -> TokenBucket {
        TokenBucket::new(RateLimit {
            request_count,
            window_seconds,
        })
    }

    fn assert_in_bounds(bucket: &TokenBucket) {
        assert!(
            bucket.available() >= 0.0 && bucket.available() <= bucket.capacity,
            "tokens {} outside [0, {}]",
            bucket.available(),
            bucket.capacity
        );
    }

    /// A fresh bucket holds exactly its capacity.
    #[tokio::test(start_paused = true)]
    async fn starts_full() {
        let bucket = bucket(10, 60);
        assert!((bucket.available() - 10.0).abs() < EPSILON);
    }

    /// Tokens accrue at request_count / window_seconds per second.
    #[tokio::test(start_paused = true)]
    async fn refills_fractionally() {
        let mut bucket = bucket(10, 60);
        for _ in 0..10 {
            assert!(bucket.try_consume());
        }
        assert!(bucket.available() < EPSILON);

        // 6 seconds at 10 tokens per minute is one token.
        advance(Duration::from_secs(6)).await;
        bucket.refill(Instant::now());
        assert!((bucket.available() - 1.0).abs() < EPSILON);
        assert!(bucket.try_consume());
        assert!(!bucket.try_consume());
    }

    /// Refilling never pushes the balance past capacity.
    #[tokio::test(start_paused = true)]
    async fn clamps_at_capacity() {
        let mut bucket = bucket(5, 1);
        advance(Duration::from_secs(60)).await;
        bucket.refill(Instant::now());
        assert!((bucket.available() - 5.0).abs() < EPSILON);
        assert_in_bounds(&bucket);
    }

    /// Zero elapsed time leaves the balance untouched.
    #[tokio::test(start_paused = true)]
    async fn zero_elapsed_is_a_noop() {
        let mut bucket = bucket(5, 1);
        assert!(bucket.try_consume());
        let before = bucket.available();
        bucket.refill(Instant::now());
        assert!((bucket.available() - before).abs() < EPSILON);
    }

    /// The balance stays within [0, capacity] through an arbitrary mix of
    /// refills and consumptions.
    #[tokio::test(start_paused = true)]
    async fn balance_stays_bounded() {
        let mut bucket = bucket(3, 2);
        assert_in_bounds(&bucket);
        for step in 0..50u64 {
            if step % 3 == 0 {
                advance(Duration::from_millis(100 * (step % 7 + 1))).await;
                bucket.refill(Instant::now());
            } else {
                bucket.try_consume();
            }
            assert_in_bounds(&bucket);
        }
    }
}
