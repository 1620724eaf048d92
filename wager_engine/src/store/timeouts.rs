//! Storage timeout helpers
//!
//! Bounds lock acquisition and transaction start so contended rows surface as
//! [`StoreError::Timeout`] instead of hanging a request handler.

use super::errors::{StoreError, StoreResult};
use std::time::Duration;
use tokio::time::timeout;

/// Default timeout for single queries (5 seconds)
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for acquiring a transaction or row lock (10 seconds)
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Execute a storage future with a timeout
///
/// # Example
///
/// ```no_run
/// use wager_engine::store::timeouts::{with_timeout, DEFAULT_QUERY_TIMEOUT};
/// # use sqlx::PgPool;
/// # async fn example(pool: &PgPool) -> Result<(), Box<dyn std::error::Error>> {
///
/// let row = with_timeout(
///     DEFAULT_QUERY_TIMEOUT,
///     sqlx::query("SELECT 1").fetch_one(pool),
/// )
/// .await?;
///
/// # Ok(())
/// # }
/// ```
pub async fn with_timeout<F, T, E>(duration: Duration, future: F) -> StoreResult<T>
where
    F: std::future::Future<Output = Result<T, E>>,
    StoreError: From<E>,
{
    match timeout(duration, future).await {
        Ok(result) => result.map_err(StoreError::from),
        Err(_) => Err(StoreError::Timeout(duration)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_elapses() {
        let result: StoreResult<()> = with_timeout(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        })
        .await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let result: StoreResult<()> = with_timeout(DEFAULT_QUERY_TIMEOUT, async {
            Err::<(), _>(StoreError::Conflict("dup".to_string()))
        })
        .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = StoreError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("5s"));
    }
}
