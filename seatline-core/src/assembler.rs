use seatline_shared::Masked;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::key::DraftKey;
use crate::models::{lenient, ReservationDetails};
use crate::repository::{bounded, ExternalCache};
use crate::{CoreError, CoreResult};

pub const TOKEN_NAMESPACE: &str = "token";
pub const RESERVATION_NAMESPACE: &str = "reservation";

/// User identity carried in the payload of the cached identity token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(rename = "uId", alias = "userId", deserialize_with = "lenient::i64_from_any")]
    pub user_id: i64,
    #[serde(rename = "uName", alias = "userName")]
    pub user_name: String,
}

/// Turns a raw identity token into claims. Issuing tokens happens elsewhere.
pub trait TokenDecoder: Send + Sync {
    fn decode(&self, token: &str) -> CoreResult<IdentityClaims>;
}

/// Event snapshot written to the external cache by the catalogue front-end.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedReservation {
    #[serde(alias = "pId", deserialize_with = "lenient::i64_from_any")]
    event_id: i64,
    #[serde(alias = "pTitle")]
    title: String,
    #[serde(alias = "pPlace")]
    place: String,
    #[serde(alias = "pDate")]
    date: String,
    #[serde(alias = "pPrice", deserialize_with = "lenient::string_from_any")]
    price: String,
    #[serde(alias = "pAllSpot", deserialize_with = "lenient::i32_from_any")]
    all_spots: i32,
    #[serde(default, alias = "rPhone")]
    phone: Option<String>,
    #[serde(default, alias = "rEmail")]
    email: Option<String>,
}

/// Builds draft details from two externally cached records sharing one
/// opaque key: `token:<key>` and `reservation:<key>`.
pub struct PayloadAssembler {
    cache: Arc<dyn ExternalCache>,
    decoder: Arc<dyn TokenDecoder>,
    timeout: Duration,
}

impl PayloadAssembler {
    pub fn new(cache: Arc<dyn ExternalCache>, decoder: Arc<dyn TokenDecoder>, timeout: Duration) -> Self {
        Self { cache, decoder, timeout }
    }

    pub async fn assemble(&self, key: &DraftKey) -> CoreResult<ReservationDetails> {
        let token = self.fetch(key.namespaced(TOKEN_NAMESPACE)).await?;
        let payload = self.fetch(key.namespaced(RESERVATION_NAMESPACE)).await?;

        let claims = self.decoder.decode(&token)?;
        let cached: CachedReservation = serde_json::from_str(&payload)
            .map_err(|e| CoreError::ValidationError(format!("cached reservation for {} is malformed: {}", key, e)))?;

        info!(key = %key, user_id = claims.user_id, event_id = cached.event_id, "assembled reservation payload");

        Ok(ReservationDetails {
            user_id: claims.user_id,
            user_name: claims.user_name,
            event_id: cached.event_id,
            title: cached.title,
            place: cached.place,
            date: cached.date,
            price: cached.price,
            all_spots: cached.all_spots,
            phone: cached.phone.map(Masked::new),
            email: cached.email.map(Masked::new),
        })
    }

    async fn fetch(&self, cache_key: String) -> CoreResult<String> {
        let value = bounded(self.timeout, "read external cache", self.cache.get_raw(&cache_key), CoreError::InternalError).await?;
        value.ok_or_else(|| {
            warn!(cache_key = %cache_key, "external record missing");
            CoreError::ExternalRecordMissing(cache_key)
        })
    }
}
