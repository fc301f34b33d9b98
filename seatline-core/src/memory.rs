//! In-process implementations of the storage traits. Used for local runs
//! (`drafts.backend = "memory"`) and as test doubles.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::key::DraftKey;
use crate::models::{NewReservation, Reservation, ReservationDraft};
use crate::repository::{DraftStore, ExternalCache, RepoError, ReservationRepository};

struct StoredDraft {
    draft: ReservationDraft,
    expires_at: Option<Instant>,
}

impl StoredDraft {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Draft store backed by a guarded `HashMap`. Entries expire `ttl` after
/// their last write; expired entries read as absent and are evicted lazily.
pub struct MemoryDraftStore {
    entries: RwLock<HashMap<DraftKey, StoredDraft>>,
    ttl: Option<Duration>,
}

impl MemoryDraftStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().await.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for MemoryDraftStore {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl DraftStore for MemoryDraftStore {
    async fn put(&self, draft: &ReservationDraft) -> Result<(), RepoError> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| !e.is_expired(now));
        entries.insert(
            draft.key.clone(),
            StoredDraft {
                draft: draft.clone(),
                expires_at: self.ttl.map(|ttl| now + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &DraftKey) -> Result<Option<ReservationDraft>, RepoError> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(e) if !e.is_expired(now) => return Ok(Some(e.draft.clone())),
                Some(_) => {}
            }
        }

        // expired, evict
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_expired(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn remove(&self, key: &DraftKey) -> Result<bool, RepoError> {
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| !e.is_expired(now)))
    }
}

#[derive(Default)]
struct ReservationTable {
    rows: BTreeMap<i64, Reservation>,
    last_id: i64,
}

/// Reservation table kept in memory. `insert_all` is atomic under one write lock.
#[derive(Default)]
pub struct MemoryReservationRepository {
    table: RwLock<ReservationTable>,
}

impl MemoryReservationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn count(&self) -> usize {
        self.table.read().await.rows.len()
    }
}

#[async_trait]
impl ReservationRepository for MemoryReservationRepository {
    async fn insert_all(&self, rows: &[NewReservation]) -> Result<Vec<Reservation>, RepoError> {
        let mut table = self.table.write().await;
        let mut saved = Vec::with_capacity(rows.len());
        for row in rows {
            table.last_id += 1;
            let reservation = Reservation::from_new(table.last_id, row.clone());
            table.rows.insert(reservation.id, reservation.clone());
            saved.push(reservation);
        }
        Ok(saved)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Reservation>, RepoError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_by_event_and_user(&self, event_id: i64, user_id: i64) -> Result<Vec<Reservation>, RepoError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|r| r.event_id == event_id && r.user_id == user_id)
            .cloned()
            .collect())
    }
}

/// Plain string map standing in for the external cache.
#[derive(Default)]
pub struct MemoryExternalCache {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryExternalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().await.insert(key.into(), value.into());
    }
}

#[async_trait]
impl ExternalCache for MemoryExternalCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.values.read().await.get(key).cloned())
    }
}
