use std::time::Duration;

/// How persistently a subscription reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// `None` retries forever.
    pub max_retry_count: Option<u32>,
    pub max_retry_interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retry_count: None,
            max_retry_interval: Duration::from_millis(30_000),
        }
    }
}

const FREE_RETRIES: u32 = 5;
const FLOOR: Duration = Duration::from_millis(10);

/// Consecutive-failure state of one subscription.
///
/// The first five retries happen immediately; after that the delay starts at
/// 10ms and doubles on every failure up to the policy maximum.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: RetryPolicy,
    count: u32,
    delay: Duration,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            count: 0,
            delay: Duration::ZERO,
        }
    }

    /// Delay before the next attempt, or `None` once the retry budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.policy.max_retry_count.is_some_and(|max| self.count > max) {
            return None;
        }
        if self.count >= FREE_RETRIES && self.delay.is_zero() {
            self.delay = FLOOR;
        } else if !self.delay.is_zero() {
            self.delay = self.delay.saturating_mul(2);
        }
        self.delay = self.delay.min(self.policy.max_retry_interval);
        self.count += 1;
        Some(self.delay)
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.delay = Duration::ZERO;
    }

    pub fn retries(&self) -> u32 {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn delays_start_free_then_double() {
        let mut backoff = Backoff::new(RetryPolicy::default());
        let delays = (0..9).map(|_| backoff.next_delay().unwrap()).collect::<Vec<_>>();
        assert_eq!(delays, ms(&[0, 0, 0, 0, 0, 10, 20, 40, 80]));
    }

    #[test]
    fn delay_is_capped() {
        let mut backoff = Backoff::new(RetryPolicy {
            max_retry_count: None,
            max_retry_interval: Duration::from_millis(50),
        });
        let delays = (0..9).map(|_| backoff.next_delay().unwrap()).collect::<Vec<_>>();
        assert_eq!(delays, ms(&[0, 0, 0, 0, 0, 10, 20, 40, 50]));
    }

    #[test]
    fn budget_runs_out_after_max_count() {
        let mut backoff = Backoff::new(RetryPolicy {
            max_retry_count: Some(2),
            ..RetryPolicy::default()
        });
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert!(backoff.next_delay().is_some());
        assert_eq!(backoff.next_delay(), None);
        assert_eq!(backoff.retries(), 3);
    }

    #[test]
    fn reset_restarts_the_sequence() {
        let mut backoff = Backoff::new(RetryPolicy::default());
        for _ in 0..7 {
            backoff.next_delay();
        }
        backoff.reset();
        assert_eq!(backoff.retries(), 0);
        assert_eq!(backoff.next_delay(), Some(Duration::ZERO));
    }
}
