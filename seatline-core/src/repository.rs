use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

use crate::key::DraftKey;
use crate::models::{NewReservation, Reservation, ReservationDraft};
use crate::{CoreError, CoreResult};

pub type RepoError = Box<dyn std::error::Error + Send + Sync>;

/// Ephemeral key → draft storage
#[async_trait]
pub trait DraftStore: Send + Sync {
    /// Insert or overwrite the draft under its own key. Refreshes expiry.
    async fn put(&self, draft: &ReservationDraft) -> Result<(), RepoError>;

    async fn get(&self, key: &DraftKey) -> Result<Option<ReservationDraft>, RepoError>;

    /// Returns whether a draft was present.
    async fn remove(&self, key: &DraftKey) -> Result<bool, RepoError>;
}

/// Durable reservation rows
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Persist all rows atomically, returning them in input order with ids.
    async fn insert_all(&self, rows: &[NewReservation]) -> Result<Vec<Reservation>, RepoError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Reservation>, RepoError>;

    /// Ordered by id; empty when nothing matches.
    async fn find_by_event_and_user(&self, event_id: i64, user_id: i64) -> Result<Vec<Reservation>, RepoError>;
}

/// Read side of the external key-value cache holding identity tokens and
/// event payloads written by other services.
#[async_trait]
pub trait ExternalCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, RepoError>;
}

/// Run a storage call under a time budget, mapping transport errors with `wrap`.
pub(crate) async fn bounded<T, F>(
    budget: Duration,
    operation: &'static str,
    call: F,
    wrap: fn(String) -> CoreError,
) -> CoreResult<T>
where
    F: Future<Output = Result<T, RepoError>>,
{
    match tokio::time::timeout(budget, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::error!(operation, error = %e, "storage call failed");
            Err(wrap(format!("{}: {}", operation, e)))
        }
        Err(_) => {
            tracing::warn!(operation, budget_ms = budget.as_millis() as u64, "storage call timed out");
            Err(CoreError::Timeout(operation.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, RepoError>(1)
        };
        let result = bounded(Duration::from_millis(100), "slow call", slow, CoreError::InternalError).await;
        assert!(matches!(result, Err(CoreError::Timeout(op)) if op == "slow call"));
    }

    #[tokio::test]
    async fn test_bounded_wraps_errors() {
        let failing = async { Err::<i32, RepoError>("connection refused".into()) };
        let result = bounded(Duration::from_secs(1), "insert", failing, CoreError::PersistenceFailure).await;
        match result {
            Err(CoreError::PersistenceFailure(msg)) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
