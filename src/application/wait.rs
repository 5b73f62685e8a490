//! Bounded, cancellable polling for long-running remote operations

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often to re-query and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(2), Duration::from_secs(600))
    }
}

/// Result of [`poll_until`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// `done` accepted this value.
    Done(T),
    /// Deadline reached; carries the last observed value.
    TimedOut(T),
    /// The token was cancelled.
    Cancelled,
}

/// Call `probe` until `done` accepts its value, the timeout elapses, or
/// `cancel` fires. Probe errors end polling immediately; there is no retry.
pub async fn poll_until<T, E, F, Fut, D>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
    done: D,
) -> Result<PollOutcome<T>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: Fn(&T) -> bool,
{
    // a deadline past the clock's range never fires
    let deadline = Instant::now().checked_add(policy.timeout);
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            return Ok(PollOutcome::Cancelled);
        }
        attempt += 1;
        let value = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            result = probe() => result?,
        };
        if done(&value) {
            debug!("poll finished after {} attempt(s)", attempt);
            return Ok(PollOutcome::Done(value));
        }
        let next = Instant::now().checked_add(policy.interval);
        let expired = match (next, deadline) {
            (_, None) => false,
            (Some(next), Some(deadline)) => next > deadline,
            (None, Some(_)) => true,
        };
        if expired {
            debug!("poll timed out after {} attempt(s)", attempt);
            return Ok(PollOutcome::TimedOut(value));
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PollOutcome::Cancelled),
            _ = sleep(policy.interval) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn fast(timeout_ms: u64) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), Duration::from_millis(timeout_ms))
    }

    #[tokio::test]
    async fn given_value_ready_on_third_probe_when_polling_then_done() {
        let calls = Cell::new(0);
        let token = CancellationToken::new();

        let outcome = poll_until(
            fast(5_000),
            &token,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Ok::<_, ()>(n) }
            },
            |n| *n >= 3,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Done(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn given_never_done_when_timeout_elapses_then_timed_out_with_last_value() {
        let token = CancellationToken::new();

        let outcome = poll_until(fast(20), &token, || async { Ok::<_, ()>("running") }, |_| false)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut("running"));
    }

    #[tokio::test]
    async fn given_cancelled_token_when_polling_then_stops_without_probing() {
        let token = CancellationToken::new();
        token.cancel();
        let calls = Cell::new(0);

        let outcome = poll_until(
            fast(5_000),
            &token,
            || {
                calls.set(calls.get() + 1);
                async { Ok::<_, ()>(()) }
            },
            |_| false,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        assert_eq!(calls.get(), 0);
    }

    #[tokio::test]
    async fn given_timeout_beyond_clock_range_when_polling_then_no_overflow() {
        let token = CancellationToken::new();
        let calls = Cell::new(0);
        let policy = PollPolicy::new(Duration::from_millis(1), Duration::from_secs(u64::MAX));

        let outcome = poll_until(
            policy,
            &token,
            || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Ok::<_, ()>(n) }
            },
            |n| *n >= 2,
        )
        .await
        .unwrap();

        assert_eq!(outcome, PollOutcome::Done(2));
    }

    #[tokio::test]
    async fn given_interval_beyond_clock_range_when_polling_then_times_out() {
        let token = CancellationToken::new();
        let policy = PollPolicy::new(Duration::from_secs(u64::MAX), Duration::from_secs(5));

        let outcome = poll_until(policy, &token, || async { Ok::<_, ()>(7) }, |_| false)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut(7));
    }

    #[tokio::test]
    async fn given_probe_error_when_polling_then_returns_error_immediately() {
        let token = CancellationToken::new();

        let result = poll_until(
            fast(5_000),
            &token,
            || async { Err::<u8, _>("gone") },
            |_| true,
        )
        .await;

        assert_eq!(result, Err("gone"));
    }
}
