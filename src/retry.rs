use std::time::Duration;

use async_trait::async_trait;

/// Bounded retry schedule with a linearly growing delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub step: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, step: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            step,
        }
    }

    /// Total requests issued before giving up.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// `attempt` is the 1-based number of the attempt that just failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay + self.step * attempt
    }

    /// Whether another request may follow the failed `attempt`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1), Duration::from_secs(1))
    }
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_millis(500), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(750));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1250));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy::new(2, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), 3);
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        let no_retry = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        assert!(!no_retry.should_retry(1));
    }

    #[test]
    fn huge_retry_counts_saturate() {
        let policy = RetryPolicy::new(u32::MAX, Duration::ZERO, Duration::ZERO);
        assert_eq!(policy.max_attempts(), u32::MAX);
        assert!(policy.should_retry(1));
    }
}
