use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::error::CatalogError;

/// Run an external platform call with a per-attempt timeout and bounded
/// exponential-backoff retries. A `RateLimited` retry-after hint overrides
/// the computed backoff delay.
pub(crate) async fn with_retries<T, F, Fut>(
    max_retries: usize,
    per_call: Duration,
    op: F,
) -> Result<T, CatalogError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CatalogError>>,
{
    let attempt = || async {
        match tokio::time::timeout(per_call, op()).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::Timeout(per_call)),
        }
    };

    attempt
        .retry(ExponentialBuilder::default().with_max_times(max_retries))
        .when(CatalogError::is_retryable)
        .adjust(|err, backoff| err.retry_after().or(backoff))
        .notify(|err, delay| log::warn!("retrying in {:?} after error: {}", delay, err))
        .await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_retries_rate_limited_then_succeeds() {
        let calls = AtomicUsize::new(0);
        let result = with_retries(2, Duration::from_secs(1), || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CatalogError::RateLimited {
                    retry_after: Some(Duration::from_millis(1)),
                })
            } else {
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_does_not_retry_fatal_errors() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retries(2, Duration::from_secs(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CatalogError::AuthExpired)
        })
        .await;
        assert!(matches!(result, Err(CatalogError::AuthExpired)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_bounded_attempts() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retries(2, Duration::from_secs(1), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CatalogError::RateLimited {
                retry_after: Some(Duration::from_millis(1)),
            })
        })
        .await;
        assert!(matches!(result, Err(CatalogError::RateLimited { .. })));
        // initial attempt plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
