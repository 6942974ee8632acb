//! Small shared utilities.
//!
//! Currently hosts the bounded retry helper used when polling external
//! services that need time to produce a result (e.g. post-call analysis).

use std::future::Future;
use std::time::Duration;

/// Bounded retry policy with a fixed delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts before giving up.
    pub max_attempts: u32,
    /// Delay between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }
}

/// Outcome of a single polling attempt.
pub enum Attempt<T> {
    /// The awaited result is available.
    Ready(T),
    /// Not available yet, try again after the policy delay.
    Pending,
    /// A non-recoverable failure; stop retrying immediately.
    Abort,
}

/// Final outcome of [`poll_until`].
#[derive(Debug, PartialEq, Eq)]
pub enum RetryOutcome<T> {
    /// An attempt produced a result within the budget.
    Completed(T),
    /// The retry budget was exhausted (or an attempt aborted) without a result.
    Exhausted,
}

impl<T> RetryOutcome<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            RetryOutcome::Completed(value) => Some(value),
            RetryOutcome::Exhausted => None,
        }
    }
}

/// Run `attempt` up to `policy.max_attempts` times, sleeping `policy.delay`
/// between attempts. The attempt closure receives the 1-based attempt number.
///
/// No logging happens here; callers decide what an exhausted budget means.
pub async fn poll_until<T, F, Fut>(policy: RetryPolicy, mut attempt: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T>>,
{
    for n in 1..=policy.max_attempts {
        match attempt(n).await {
            Attempt::Ready(value) => return RetryOutcome::Completed(value),
            Attempt::Abort => return RetryOutcome::Exhausted,
            Attempt::Pending => {
                if n < policy.max_attempts {
                    tokio::time::sleep(policy.delay).await;
                }
            }
        }
    }
    RetryOutcome::Exhausted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn completes_on_first_ready() {
        let outcome = poll_until(quick_policy(3), |_| async { Attempt::Ready(42) }).await;
        assert_eq!(outcome, RetryOutcome::Completed(42));
    }

    #[tokio::test]
    async fn retries_until_ready() {
        let calls = AtomicU32::new(0);
        let outcome = poll_until(quick_policy(5), |n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n >= 3 {
                    Attempt::Ready("done")
                } else {
                    Attempt::Pending
                }
            }
        })
        .await;
        assert_eq!(outcome, RetryOutcome::Completed("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_budget() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = poll_until(quick_policy(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Pending }
        })
        .await;
        assert_eq!(outcome, RetryOutcome::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn abort_stops_immediately() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = poll_until(quick_policy(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Attempt::Abort }
        })
        .await;
        assert_eq!(outcome, RetryOutcome::Exhausted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
