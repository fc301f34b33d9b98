use async_trait::async_trait;
use redis::{AsyncCommands, RedisResult};
use seatline_core::repository::{DraftStore, ExternalCache, RepoError};
use seatline_core::{DraftKey, ReservationDraft};
use tracing::{debug, info};

pub const DRAFT_NAMESPACE: &str = "draft";

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await
    }

    pub async fn set(&self, key: &str, value: &str) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set::<_, _, ()>(key, value).await
    }

    pub async fn get(&self, key: &str) -> RedisResult<Option<String>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.get(key).await
    }

    /// Returns whether the key existed.
    pub async fn del(&self, key: &str) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }
}

/// Token and event payloads are written by other services; only read here.
#[async_trait]
impl ExternalCache for RedisClient {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, RepoError> {
        Ok(self.get(key).await?)
    }
}

/// Drafts serialized as JSON under `draft:<key>`. Each write resets the TTL;
/// with no TTL configured the key never expires.
#[derive(Clone)]
pub struct RedisDraftStore {
    redis: RedisClient,
    ttl_seconds: Option<u64>,
}

impl RedisDraftStore {
    pub fn new(redis: RedisClient, ttl_seconds: Option<u64>) -> Self {
        Self { redis, ttl_seconds }
    }
}

#[async_trait]
impl DraftStore for RedisDraftStore {
    async fn put(&self, draft: &ReservationDraft) -> Result<(), RepoError> {
        let key = draft.key.namespaced(DRAFT_NAMESPACE);
        let payload = serde_json::to_string(draft)?;
        match self.ttl_seconds {
            Some(ttl) => self.redis.set_ex(&key, &payload, ttl).await?,
            None => self.redis.set(&key, &payload).await?,
        }
        debug!("Draft stored: {}", key);
        Ok(())
    }

    async fn get(&self, key: &DraftKey) -> Result<Option<ReservationDraft>, RepoError> {
        let payload = self.redis.get(&key.namespaced(DRAFT_NAMESPACE)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &DraftKey) -> Result<bool, RepoError> {
        let removed = self.redis.del(&key.namespaced(DRAFT_NAMESPACE)).await?;
        if removed {
            info!("Draft removed: {}", key);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatline_core::ReservationDetails;

    #[test]
    fn test_draft_payload_round_trips_with_contact() {
        let mut draft = ReservationDraft::new(ReservationDetails {
            user_id: 7,
            user_name: "Alice".to_string(),
            event_id: 1,
            title: "Concert".to_string(),
            place: "Olympic Hall".to_string(),
            date: "2025-05-01T19:00:00".to_string(),
            price: "50000".to_string(),
            all_spots: 100,
            phone: None,
            email: None,
        });
        draft.set_spots(vec!["A1".to_string()]).unwrap();
        draft.set_contact("010-1234-5678".to_string(), "alice@example.com".to_string()).unwrap();

        // Masked contact fields must survive serialization into Redis
        let json = serde_json::to_string(&draft).unwrap();
        assert!(json.contains("alice@example.com"));
        let back: ReservationDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(back, draft);
        assert_eq!(draft.key.namespaced(DRAFT_NAMESPACE), format!("draft:{}", draft.key));
    }
}
