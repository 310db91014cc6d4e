//! Retry loop: resend a request until it classifies, is aborted, or runs out of resends.

use std::future::Future;
use std::time::Duration;

use super::error::AttemptError;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::AbortToken;
use crate::transport::TransportError;

/// How a retry loop ended without a classified response.
#[derive(Debug)]
pub enum RetryExit {
    /// The abort token fired (pause, cancel, or session failure).
    Aborted,
    /// Resend budget used up; carries the last attempt's error.
    Exhausted { resends: u32, last: AttemptError },
}

/// How long an attempt gets to wind down after its abort token fired. Curl
/// polls the token from its progress callback, at least once a second.
pub const ABORT_GRACE: Duration = Duration::from_secs(2);

/// Runs `attempt` until it returns `Ok`, the abort token fires, or the policy
/// gives up. When the token fires mid-attempt, the attempt is awaited for up
/// to [`ABORT_GRACE`] so the transport can release its connection before the
/// caller's concurrency slot frees up.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    abort: &AbortToken,
    mut attempt: F,
) -> Result<T, RetryExit>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut resends = 0u32;
    loop {
        if abort.is_aborted() {
            return Err(RetryExit::Aborted);
        }
        let pending = attempt();
        tokio::pin!(pending);
        let result = tokio::select! {
            biased;
            _ = abort.aborted() => {
                if tokio::time::timeout(ABORT_GRACE, &mut pending).await.is_err() {
                    tracing::warn!(
                        "request still running {:?} after abort, dropping it",
                        ABORT_GRACE
                    );
                }
                return Err(RetryExit::Aborted);
            }
            r = &mut pending => r,
        };
        match result {
            Ok(v) => return Ok(v),
            Err(AttemptError::Transport(TransportError::Aborted)) => {
                return Err(RetryExit::Aborted)
            }
            Err(e) => match policy.decide(resends) {
                RetryDecision::GiveUp => return Err(RetryExit::Exhausted { resends, last: e }),
                RetryDecision::Resend => {
                    resends += 1;
                    tracing::warn!(resends, "resending request after: {}", e);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn resends_until_classified() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let token = AbortToken::new();
        let result = run_with_retry(&RetryPolicy::new(3), &token, move || async move {
            let calls = counter;
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AttemptError::Unclassified(502))
            } else {
                Ok(201u16)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 201);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_retry_count_resends() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let token = AbortToken::new();
        let policy = RetryPolicy::new(2);
        let result: Result<(), _> = run_with_retry(&policy, &token, move || async move {
            let calls = counter;
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AttemptError::Transport(TransportError::Other("reset".into())))
        })
        .await;
        match result {
            Err(RetryExit::Exhausted { resends, .. }) => assert_eq!(resends, 2),
            other => panic!("expected exhaustion, got {:?}", other),
        }
        // First attempt plus two resends.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn transport_abort_is_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let token = AbortToken::new();
        let policy = RetryPolicy::new(5);
        let result: Result<(), _> = run_with_retry(&policy, &token, move || async move {
            let calls = counter;
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AttemptError::Transport(TransportError::Aborted))
        })
        .await;
        assert!(matches!(result, Err(RetryExit::Aborted)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn abort_waits_for_attempt_to_wind_down() {
        let token = Arc::new(AbortToken::new());
        let finished = AtomicU32::new(0);
        let aborter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.abort();
            })
        };
        let (seen, done) = (&*token, &finished);
        let policy = RetryPolicy::new(1);
        let result: Result<(), _> = run_with_retry(&policy, &token, move || async move {
            seen.aborted().await;
            // Transport cleanup after noticing the token.
            tokio::time::sleep(Duration::from_millis(30)).await;
            done.fetch_add(1, Ordering::SeqCst);
            Err(AttemptError::Transport(TransportError::Aborted))
        })
        .await;
        aborter.await.unwrap();
        assert!(matches!(result, Err(RetryExit::Aborted)));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_gives_up_on_unresponsive_attempt() {
        let token = Arc::new(AbortToken::new());
        let aborter = {
            let token = Arc::clone(&token);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                token.abort();
            })
        };
        let result: Result<(), _> = run_with_retry(&RetryPolicy::new(1), &token, || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        aborter.await.unwrap();
        assert!(matches!(result, Err(RetryExit::Aborted)));
    }
}
