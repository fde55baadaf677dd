//! # Conflict Retry
//!
//! Re-runs a whole unit of work when it lost a write race.
//!
//! ```text
//! attempt ──► Ok ─────────────────────────────► return
//!    │
//!    ├──► Transient (Conflict, busy, pool) ──► sleep (exponential) ──► attempt
//!    │                                          until max_elapsed_ms
//!    │
//!    └──► Validation / BusinessRule / NotFound / Storage ──► return at once
//! ```
//!
//! Each attempt opens its own SQLite transaction, so a failed attempt leaves
//! nothing behind for the next one to trip over.

use std::future::Future;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tracing::debug;

use crate::config::RetrySettings;
use crate::error::{ServiceError, ServiceResult};

impl RetrySettings {
    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_backoff_ms),
            max_interval: Duration::from_millis(self.max_backoff_ms),
            multiplier: 2.0,
            max_elapsed_time: Some(Duration::from_millis(self.max_elapsed_ms)),
            ..Default::default()
        }
    }
}

/// Runs `attempt` until it succeeds, fails permanently, or the retry budget
/// is spent.
pub async fn with_retry<T, F, Fut>(
    settings: &RetrySettings,
    operation: &'static str,
    mut attempt: F,
) -> ServiceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ServiceResult<T>>,
{
    backoff::future::retry_notify(
        settings.backoff(),
        || {
            let fut = attempt();
            async move {
                fut.await.map_err(|e| {
                    if e.is_transient() {
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        },
        |err: ServiceError, wait: Duration| {
            debug!(operation, error = %err, ?wait, "Retrying after conflict");
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use kassa_core::CoreError;
    use kassa_db::DbError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetrySettings {
        RetrySettings {
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            max_elapsed_ms: 200,
        }
    }

    #[tokio::test]
    async fn test_conflict_is_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast(), "test", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::from(DbError::conflict("Lot", "l-1")))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_business_rule_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: ServiceResult<()> = with_retry(&fast(), "test", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(CoreError::PaymentFinalized("p-1".into()).into())
        })
        .await;

        assert!(matches!(result, Err(ServiceError::BusinessRule(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_reports_transient() {
        let result: ServiceResult<()> = with_retry(&fast(), "test", || async {
            Err(DbError::conflict("Drawer", "d-1").into())
        })
        .await;

        assert!(result.unwrap_err().is_transient());
    }
}
