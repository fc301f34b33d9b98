use chrono::{DateTime, NaiveDateTime, Utc};
use seatline_shared::Masked;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::key::DraftKey;
use crate::{CoreError, CoreResult};

/// Event and user snapshot a draft is created from. Price and date stay in
/// their textual form until finalization parses them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDetails {
    #[serde(alias = "uId", deserialize_with = "lenient::i64_from_any")]
    pub user_id: i64,
    #[serde(alias = "uName")]
    pub user_name: String,
    #[serde(alias = "pId", deserialize_with = "lenient::i64_from_any")]
    pub event_id: i64,
    #[serde(alias = "pTitle")]
    pub title: String,
    #[serde(alias = "pPlace")]
    pub place: String,
    #[serde(alias = "pDate")]
    pub date: String,
    #[serde(alias = "pPrice", deserialize_with = "lenient::string_from_any")]
    pub price: String,
    #[serde(alias = "pAllSpot", deserialize_with = "lenient::i32_from_any")]
    pub all_spots: i32,
    #[serde(default, alias = "rPhone")]
    pub phone: Option<Masked<String>>,
    #[serde(default, alias = "rEmail")]
    pub email: Option<Masked<String>>,
}

/// Position of a draft in the reservation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DraftStage {
    Selected,
    SeatsChosen,
    ContactConfirmed,
    Finalized,
}

/// In-progress reservation held in the ephemeral store until it is
/// finalized or cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDraft {
    pub key: DraftKey,
    pub details: ReservationDetails,
    pub spots: Vec<String>,
    pub stage: DraftStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationDraft {
    pub fn new(details: ReservationDetails) -> Self {
        let now = Utc::now();
        Self {
            key: DraftKey::generate(),
            details,
            spots: Vec::new(),
            stage: DraftStage::Selected,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_finalized(&self) -> bool {
        self.stage == DraftStage::Finalized
    }

    /// Replace the selected spots. Order is preserved; it drives the order
    /// of the persisted rows.
    pub fn set_spots(&mut self, spots: Vec<String>) -> CoreResult<()> {
        self.ensure_open()?;

        if spots.is_empty() {
            return Err(CoreError::ValidationError("at least one spot must be selected".to_string()));
        }

        let mut seen = HashSet::with_capacity(spots.len());
        for spot in &spots {
            if spot.trim().is_empty() {
                return Err(CoreError::ValidationError("spot identifiers must not be blank".to_string()));
            }
            if !seen.insert(spot.as_str()) {
                return Err(CoreError::ValidationError(format!("spot {} selected twice", spot)));
            }
        }

        self.spots = spots;
        if self.stage == DraftStage::Selected {
            self.stage = DraftStage::SeatsChosen;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_contact(&mut self, phone: String, email: String) -> CoreResult<()> {
        self.ensure_open()?;

        if phone.trim().is_empty() {
            return Err(CoreError::ValidationError("phone must not be blank".to_string()));
        }
        if !email.contains('@') {
            return Err(CoreError::ValidationError("email is not a valid address".to_string()));
        }

        self.details.phone = Some(Masked::new(phone));
        self.details.email = Some(Masked::new(email));
        self.stage = DraftStage::ContactConfirmed;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Transition: any open stage with spots → Finalized
    pub fn mark_finalized(&mut self) -> CoreResult<()> {
        self.ensure_finalizable()?;
        self.stage = DraftStage::Finalized;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn ensure_finalizable(&self) -> CoreResult<()> {
        self.ensure_open()?;
        if self.spots.is_empty() {
            return Err(CoreError::ValidationError(format!("draft {} has no spots selected", self.key)));
        }
        Ok(())
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_finalized() {
            return Err(CoreError::AlreadyFinalized(self.key.to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpotStatus {
    NonAvailable,
    Available,
}

impl SpotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotStatus::NonAvailable => "nonAvailable",
            SpotStatus::Available => "available",
        }
    }
}

impl fmt::Display for SpotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SpotStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "nonAvailable" => Ok(SpotStatus::NonAvailable),
            "available" => Ok(SpotStatus::Available),
            other => Err(CoreError::ValidationError(format!("unknown spot status: {}", other))),
        }
    }
}

/// A reservation row before the database assigns its id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub user_id: i64,
    pub user_name: String,
    pub event_id: i64,
    pub title: String,
    pub place: String,
    pub date: NaiveDateTime,
    pub price: i32,
    pub all_spots: i32,
    pub spot: String,
    pub status: SpotStatus,
    pub phone: Option<Masked<String>>,
    pub email: Option<Masked<String>>,
    pub reserved_at: DateTime<Utc>,
}

/// One persisted seat reservation. Event fields are a copy taken at
/// finalization and are not kept in sync with the event afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub event_id: i64,
    pub title: String,
    pub place: String,
    pub date: NaiveDateTime,
    pub price: i32,
    pub all_spots: i32,
    pub spot: String,
    pub status: SpotStatus,
    pub phone: Option<Masked<String>>,
    pub email: Option<Masked<String>>,
    pub reserved_at: DateTime<Utc>,
}

impl Reservation {
    pub fn from_new(id: i64, row: NewReservation) -> Self {
        Self {
            id,
            user_id: row.user_id,
            user_name: row.user_name,
            event_id: row.event_id,
            title: row.title,
            place: row.place,
            date: row.date,
            price: row.price,
            all_spots: row.all_spots,
            spot: row.spot,
            status: row.status,
            phone: row.phone,
            email: row.email,
            reserved_at: row.reserved_at,
        }
    }

    pub fn ticket(&self) -> Ticket {
        Ticket {
            id: self.id,
            spot: self.spot.clone(),
            user_name: self.user_name.clone(),
            title: self.title.clone(),
            place: self.place.clone(),
            date: self.date,
            user_id: self.user_id,
        }
    }
}

/// Read-only projection of a persisted reservation. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: i64,
    pub spot: String,
    pub user_name: String,
    pub title: String,
    pub place: String,
    pub date: NaiveDateTime,
    pub user_id: i64,
}

/// Clients send ids and prices either as JSON numbers or as strings.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Int(i64),
        Float(f64),
        Text(String),
    }

    pub fn i64_from_any<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Int(v) => Ok(v),
            // i64::MAX is not representable as f64; the bound is exclusive
            NumberOrString::Float(v) if v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 => {
                Ok(v as i64)
            }
            NumberOrString::Float(v) => Err(serde::de::Error::custom(format!("expected an integer id, got {}", v))),
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| serde::de::Error::custom(format!("expected an integer id, got {:?}", s))),
        }
    }

    pub fn i32_from_any<'de, D>(deserializer: D) -> Result<i32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = i64_from_any(deserializer)?;
        i32::try_from(v).map_err(|_| serde::de::Error::custom(format!("integer {} out of range", v)))
    }

    pub fn string_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match NumberOrString::deserialize(deserializer)? {
            NumberOrString::Int(v) => v.to_string(),
            NumberOrString::Float(v) => v.to_string(),
            NumberOrString::Text(s) => s,
        })
    }
}
