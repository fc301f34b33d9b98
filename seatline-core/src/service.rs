use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::finalizer::build_reservations;
use crate::key::DraftKey;
use crate::locks::KeyLocks;
use crate::models::{Reservation, ReservationDetails, ReservationDraft, Ticket};
use crate::repository::{bounded, DraftStore, ReservationRepository};
use crate::{CoreError, CoreResult};

/// Drives a reservation from seat selection to persisted rows and tickets.
///
/// Every mutation of a draft runs under that draft's lock, so a seat change
/// cannot interleave with finalization of the same key. Storage calls are
/// bounded by `timeout`.
pub struct ReservationService {
    drafts: Arc<dyn DraftStore>,
    reservations: Arc<dyn ReservationRepository>,
    locks: KeyLocks,
    timeout: Duration,
}

impl ReservationService {
    pub fn new(drafts: Arc<dyn DraftStore>, reservations: Arc<dyn ReservationRepository>, timeout: Duration) -> Self {
        Self {
            drafts,
            reservations,
            locks: KeyLocks::new(),
            timeout,
        }
    }

    pub async fn create_draft(&self, details: ReservationDetails) -> CoreResult<DraftKey> {
        let draft = ReservationDraft::new(details);
        self.save_draft(&draft).await?;
        info!(key = %draft.key, event_id = draft.details.event_id, user_id = draft.details.user_id, "draft created");
        Ok(draft.key)
    }

    pub async fn get_draft(&self, key: &DraftKey) -> CoreResult<ReservationDraft> {
        self.load_draft(key).await
    }

    pub async fn update_spots(&self, key: &DraftKey, spots: Vec<String>) -> CoreResult<ReservationDraft> {
        let _guard = self.locks.acquire(key).await;
        let mut draft = self.load_draft(key).await?;
        draft.set_spots(spots)?;
        self.save_draft(&draft).await?;
        info!(key = %key, spots = ?draft.spots, "spots selected");
        Ok(draft)
    }

    pub async fn update_contact(&self, key: &DraftKey, phone: String, email: String) -> CoreResult<ReservationDraft> {
        let _guard = self.locks.acquire(key).await;
        let mut draft = self.load_draft(key).await?;
        draft.set_contact(phone, email)?;
        self.save_draft(&draft).await?;
        info!(key = %key, "contact confirmed");
        Ok(draft)
    }

    /// Remove the draft. Unknown keys are reported as `NotFound`.
    pub async fn cancel(&self, key: &DraftKey) -> CoreResult<()> {
        let _guard = self.locks.acquire(key).await;
        let removed = bounded(self.timeout, "remove draft", self.drafts.remove(key), CoreError::InternalError).await?;
        if !removed {
            warn!(key = %key, "cancel for unknown draft");
            return Err(CoreError::NotFound(format!("draft {}", key)));
        }
        info!(key = %key, "draft cancelled");
        Ok(())
    }

    /// Persist one reservation per selected spot. All rows are written in a
    /// single repository call, so either every spot is stored or none is.
    pub async fn finalize(&self, key: &DraftKey) -> CoreResult<Vec<Reservation>> {
        let _guard = self.locks.acquire(key).await;
        let mut draft = self.load_draft(key).await?;
        draft.ensure_finalizable()?;

        let rows = build_reservations(&draft, Utc::now())?;
        let saved = bounded(
            self.timeout,
            "insert reservations",
            self.reservations.insert_all(&rows),
            CoreError::PersistenceFailure,
        )
        .await?;

        if saved.len() != rows.len() {
            return Err(CoreError::InvariantViolation(format!(
                "{} spots selected but {} reservations persisted",
                rows.len(),
                saved.len()
            )));
        }

        let ids: Vec<i64> = saved.iter().map(|r| r.id).collect();
        draft.mark_finalized()?;
        // Rows are already committed. An open draft left behind would be
        // finalized again on retry, so it is dropped when the stage write fails.
        if let Err(e) = self.save_draft(&draft).await {
            error!(key = %key, error = %e, reservation_ids = ?ids, "reservations persisted but draft stage not updated");
            match bounded(self.timeout, "remove draft", self.drafts.remove(key), CoreError::InternalError).await {
                Ok(_) => warn!(key = %key, "draft dropped after finalization"),
                Err(e) => error!(
                    key = %key,
                    error = %e,
                    reservation_ids = ?ids,
                    "draft still open after finalization; retries may duplicate reservations"
                ),
            }
        }

        info!(key = %key, event_id = draft.details.event_id, reservation_ids = ?ids, "reservation finalized");
        Ok(saved)
    }

    /// Finalize, then project a ticket for every persisted row by reading it
    /// back. A row that cannot be read back is an invariant violation.
    pub async fn issue_tickets(&self, key: &DraftKey) -> CoreResult<Vec<Ticket>> {
        let saved = self.finalize(key).await?;

        let mut tickets = Vec::with_capacity(saved.len());
        for reservation in &saved {
            let ticket = self.get_ticket(reservation.id).await?.ok_or_else(|| {
                CoreError::InvariantViolation(format!("reservation {} persisted but not readable", reservation.id))
            })?;
            tickets.push(ticket);
        }
        Ok(tickets)
    }

    pub async fn get_reservation(&self, id: i64) -> CoreResult<Option<Reservation>> {
        bounded(self.timeout, "find reservation", self.reservations.find_by_id(id), CoreError::PersistenceFailure).await
    }

    pub async fn get_user_reservations(&self, event_id: i64, user_id: i64) -> CoreResult<Vec<Reservation>> {
        bounded(
            self.timeout,
            "find user reservations",
            self.reservations.find_by_event_and_user(event_id, user_id),
            CoreError::PersistenceFailure,
        )
        .await
    }

    pub async fn get_ticket(&self, id: i64) -> CoreResult<Option<Ticket>> {
        Ok(self.get_reservation(id).await?.map(|r| r.ticket()))
    }

    async fn load_draft(&self, key: &DraftKey) -> CoreResult<ReservationDraft> {
        bounded(self.timeout, "load draft", self.drafts.get(key), CoreError::InternalError)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("draft {}", key)))
    }

    async fn save_draft(&self, draft: &ReservationDraft) -> CoreResult<()> {
        bounded(self.timeout, "save draft", self.drafts.put(draft), CoreError::InternalError).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryDraftStore, MemoryReservationRepository};
    use crate::models::tests::concert;
    use crate::models::{NewReservation, SpotStatus};
    use crate::repository::RepoError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn service() -> (ReservationService, Arc<MemoryReservationRepository>) {
        let repo = Arc::new(MemoryReservationRepository::new());
        let service = ReservationService::new(
            Arc::new(MemoryDraftStore::default()),
            repo.clone(),
            Duration::from_secs(1),
        );
        (service, repo)
    }

    fn spots(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_concert_scenario() {
        let (service, repo) = service();

        let key = service.create_draft(concert()).await.unwrap();
        service.update_spots(&key, spots(&["A1", "A2"])).await.unwrap();
        let saved = service.finalize(&key).await.unwrap();

        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].spot, "A1");
        assert_eq!(saved[1].spot, "A2");
        assert!(saved.iter().all(|r| r.price == 50000 && r.status == SpotStatus::NonAvailable));
        assert_eq!(repo.count().await, 2);

        // Draft survives finalization, marked as such
        assert!(service.get_draft(&key).await.unwrap().is_finalized());
    }

    #[tokio::test]
    async fn test_tickets_match_persisted_rows() {
        let (service, _) = service();
        let key = service.create_draft(concert()).await.unwrap();
        service.update_spots(&key, spots(&["B7", "B8", "B9"])).await.unwrap();
        service
            .update_contact(&key, "010-1234-5678".to_string(), "alice@example.com".to_string())
            .await
            .unwrap();

        let tickets = service.issue_tickets(&key).await.unwrap();
        assert_eq!(tickets.len(), 3);

        for ticket in &tickets {
            let row = service.get_reservation(ticket.id).await.unwrap().unwrap();
            assert_eq!(ticket.spot, row.spot);
            assert_eq!(ticket.user_name, row.user_name);
            assert_eq!(ticket.title, row.title);
            assert_eq!(row.email.as_ref().unwrap().expose(), "alice@example.com");
        }
        assert_eq!(service.get_ticket(tickets[1].id).await.unwrap().unwrap().spot, "B8");
    }

    #[tokio::test]
    async fn test_unparsable_price_writes_nothing() {
        let (service, repo) = service();
        let mut details = concert();
        details.price = "abc".to_string();

        let key = service.create_draft(details).await.unwrap();
        service.update_spots(&key, spots(&["A1", "A2"])).await.unwrap();

        assert!(matches!(service.finalize(&key).await, Err(CoreError::ValidationError(_))));
        assert_eq!(repo.count().await, 0);
        assert!(!service.get_draft(&key).await.unwrap().is_finalized());
    }

    #[tokio::test]
    async fn test_cancel_then_confirm_is_not_found() {
        let (service, _) = service();
        let key = service.create_draft(concert()).await.unwrap();

        service.cancel(&key).await.unwrap();
        assert!(matches!(service.update_spots(&key, spots(&["A1"])).await, Err(CoreError::NotFound(_))));
        assert!(matches!(service.cancel(&key).await, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_second_finalization_is_rejected() {
        let (service, repo) = service();
        let key = service.create_draft(concert()).await.unwrap();
        service.update_spots(&key, spots(&["A1"])).await.unwrap();
        service.finalize(&key).await.unwrap();

        assert!(matches!(service.finalize(&key).await, Err(CoreError::AlreadyFinalized(_))));
        assert_eq!(repo.count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_lookups() {
        let (service, _) = service();
        let key = DraftKey::generate();

        assert!(matches!(service.get_draft(&key).await, Err(CoreError::NotFound(_))));
        assert!(matches!(service.finalize(&key).await, Err(CoreError::NotFound(_))));
        assert!(service.get_user_reservations(1, 7).await.unwrap().is_empty());
        assert!(service.get_ticket(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_updates_and_finalize_stay_consistent() {
        let (service, repo) = service();
        let service = Arc::new(service);
        let key = service.create_draft(concert()).await.unwrap();
        service.update_spots(&key, spots(&["A1"])).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let service = service.clone();
            let key = key.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    service.finalize(&key).await.is_ok()
                } else {
                    let _ = service.update_spots(&key, vec![format!("B{}", i)]).await;
                    false
                }
            }));
        }

        let mut finalized = 0;
        for handle in handles {
            if handle.await.unwrap() {
                finalized += 1;
            }
        }

        // exactly one finalize wins; the one-spot draft yields one row
        assert_eq!(finalized, 1);
        assert_eq!(repo.count().await, 1);
    }

    struct FailingRepository;

    #[async_trait]
    impl ReservationRepository for FailingRepository {
        async fn insert_all(&self, _rows: &[NewReservation]) -> Result<Vec<Reservation>, RepoError> {
            Err("database unavailable".into())
        }

        async fn find_by_id(&self, _id: i64) -> Result<Option<Reservation>, RepoError> {
            Ok(None)
        }

        async fn find_by_event_and_user(&self, _event_id: i64, _user_id: i64) -> Result<Vec<Reservation>, RepoError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_keeps_draft_open() {
        let service = ReservationService::new(
            Arc::new(MemoryDraftStore::default()),
            Arc::new(FailingRepository),
            Duration::from_secs(1),
        );
        let key = service.create_draft(concert()).await.unwrap();
        service.update_spots(&key, spots(&["A1"])).await.unwrap();

        assert!(matches!(service.finalize(&key).await, Err(CoreError::PersistenceFailure(_))));
        assert!(!service.get_draft(&key).await.unwrap().is_finalized());
    }

    /// Memory store whose writes start failing once `fail_puts` is set.
    #[derive(Default)]
    struct ReadOnlyAfterSwitch {
        inner: MemoryDraftStore,
        fail_puts: AtomicBool,
    }

    #[async_trait]
    impl DraftStore for ReadOnlyAfterSwitch {
        async fn put(&self, draft: &ReservationDraft) -> Result<(), RepoError> {
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err("draft store is read-only".into());
            }
            self.inner.put(draft).await
        }

        async fn get(&self, key: &DraftKey) -> Result<Option<ReservationDraft>, RepoError> {
            self.inner.get(key).await
        }

        async fn remove(&self, key: &DraftKey) -> Result<bool, RepoError> {
            self.inner.remove(key).await
        }
    }

    #[tokio::test]
    async fn test_failed_stage_write_drops_draft() {
        let drafts = Arc::new(ReadOnlyAfterSwitch::default());
        let repo = Arc::new(MemoryReservationRepository::new());
        let service = ReservationService::new(drafts.clone(), repo.clone(), Duration::from_secs(1));

        let key = service.create_draft(concert()).await.unwrap();
        service.update_spots(&key, spots(&["A1", "A2"])).await.unwrap();
        drafts.fail_puts.store(true, Ordering::SeqCst);

        let saved = service.finalize(&key).await.unwrap();
        assert_eq!(saved.len(), 2);

        // A retry finds no draft instead of writing the same spots again
        assert!(matches!(service.finalize(&key).await, Err(CoreError::NotFound(_))));
        assert_eq!(repo.count().await, 2);
    }

    /// Accepts writes but loses them, so tickets cannot be projected.
    struct ForgetfulRepository(MemoryReservationRepository);

    #[async_trait]
    impl ReservationRepository for ForgetfulRepository {
        async fn insert_all(&self, rows: &[NewReservation]) -> Result<Vec<Reservation>, RepoError> {
            self.0.insert_all(rows).await
        }

        async fn find_by_id(&self, _id: i64) -> Result<Option<Reservation>, RepoError> {
            Ok(None)
        }

        async fn find_by_event_and_user(&self, event_id: i64, user_id: i64) -> Result<Vec<Reservation>, RepoError> {
            self.0.find_by_event_and_user(event_id, user_id).await
        }
    }

    #[tokio::test]
    async fn test_missing_ticket_projection_is_an_error() {
        let service = ReservationService::new(
            Arc::new(MemoryDraftStore::default()),
            Arc::new(ForgetfulRepository(MemoryReservationRepository::new())),
            Duration::from_secs(1),
        );
        let key = service.create_draft(concert()).await.unwrap();
        service.update_spots(&key, spots(&["A1"])).await.unwrap();

        assert!(matches!(service.issue_tickets(&key).await, Err(CoreError::InvariantViolation(_))));
    }
}
