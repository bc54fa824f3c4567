use std::future::Future;
use std::time::Duration;

/// Bounded-attempt exponential-backoff wrapper around any operation returning
/// a classified (retryable, error) pair (C2 / §4.1).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// A failed attempt, carrying whether the scheduler should retry it.
pub struct Attempt<E> {
    pub error: E,
    pub retryable: bool,
}

impl<E> Attempt<E> {
    pub fn retryable(error: E) -> Self {
        Self {
            error,
            retryable: true,
        }
    }

    pub fn terminal(error: E) -> Self {
        Self {
            error,
            retryable: false,
        }
    }
}

/// Invokes `operation` up to `policy.attempts` times. `operation` receives the
/// zero-based attempt index so it can make its own rate-limit sleep decisions
/// (§4.2) before signalling retryable back to this scheduler.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, Attempt<E>>>,
{
    let mut last_error = None;
    for i in 0..policy.attempts {
        match operation(i).await {
            Ok(value) => return Ok(value),
            Err(attempt) => {
                let is_last = i + 1 == policy.attempts;
                if !attempt.retryable || is_last {
                    return Err(attempt.error);
                }
                last_error = Some(attempt.error);
                tokio::time::sleep(policy.base_delay * 2u32.pow(i)).await;
            }
        }
    }
    Err(last_error.expect("attempts is always >= 1"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = retry(RetryPolicy::new(3, Duration::from_millis(1)), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("ok") }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> =
            retry(RetryPolicy::new(5, Duration::from_millis(1)), |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(Attempt::retryable("transient"))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn terminal_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = retry(RetryPolicy::new(5, Duration::from_millis(1)), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Attempt::terminal("bad request")) }
        })
        .await;
        assert_eq!(result, Err("bad request"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_persistent_retryable_error() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, &str> = retry(RetryPolicy::new(3, Duration::from_millis(1)), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Attempt::retryable("still failing")) }
        })
        .await;
        assert_eq!(result, Err("still failing"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
