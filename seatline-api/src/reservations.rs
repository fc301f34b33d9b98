use axum::{
    extract::State,
    routing::{delete, get, post},
    Json, Router,
};
use seatline_core::{DraftKey, Reservation, ReservationDetails, ReservationDraft, Ticket};
use serde::Deserialize;

use crate::{
    error::AppError,
    extract::{ApiJson, ApiPath, ApiQuery},
    state::AppState,
};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub key: String,
    #[serde(alias = "rPhone")]
    pub phone: String,
    #[serde(alias = "rEmail")]
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserReservationsQuery {
    #[serde(alias = "pId")]
    pub event_id: i64,
    #[serde(alias = "uId")]
    pub user_id: i64,
}

/// `?key=..&spots=A1&spots=A2`, `?key=..&spots=A1,A2` and the legacy
/// `rSpots` name all select the same seats, in the order given.
#[derive(Debug, PartialEq)]
pub struct SpotSelection {
    pub key: DraftKey,
    pub spots: Vec<String>,
}

impl SpotSelection {
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Result<Self, AppError> {
        let mut key = None;
        let mut spots = Vec::new();

        for (name, value) in pairs {
            match name.as_str() {
                "key" => key = Some(value),
                "spots" | "rSpots" => spots.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                ),
                _ => {}
            }
        }

        let key = key.ok_or_else(|| AppError::ValidationError("missing query parameter: key".to_string()))?;
        Ok(Self { key: DraftKey::from(key), spots })
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/reservation/select", post(create_draft).get(get_draft))
        .route("/reservation/confirm", post(confirm_spots).get(get_draft))
        .route("/reservation/complete/info", post(update_contact))
        .route("/reservation/complete", post(issue_tickets).get(get_draft))
        .route("/reservation/ticket", post(issue_tickets))
        .route("/reservation/ticket/{id}", get(get_ticket))
        .route("/reservation/save", post(save_reservations))
        .route("/reservation/cancel", delete(cancel_draft))
        .route("/reservation/send", get(assemble_external))
        .route("/reservation/user", get(user_reservations))
        .route("/reservation/{id}", get(get_reservation))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /reservation/select
/// Start a draft from an event/user snapshot; responds with the draft key
async fn create_draft(
    State(state): State<AppState>,
    ApiJson(details): ApiJson<ReservationDetails>,
) -> Result<String, AppError> {
    let key = state.reservations.create_draft(details).await?;
    Ok(key.to_string())
}

/// GET /reservation/select | /reservation/confirm | /reservation/complete
async fn get_draft(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<KeyQuery>,
) -> Result<Json<ReservationDraft>, AppError> {
    let draft = state.reservations.get_draft(&DraftKey::from(query.key)).await?;
    Ok(Json(draft))
}

/// POST /reservation/confirm
async fn confirm_spots(
    State(state): State<AppState>,
    ApiQuery(pairs): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<ReservationDraft>, AppError> {
    let selection = SpotSelection::from_pairs(pairs)?;
    let draft = state.reservations.update_spots(&selection.key, selection.spots).await?;
    Ok(Json(draft))
}

/// POST /reservation/complete/info
async fn update_contact(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<ContactRequest>,
) -> Result<Json<ReservationDraft>, AppError> {
    let draft = state
        .reservations
        .update_contact(&DraftKey::from(req.key), req.phone, req.email)
        .await?;
    Ok(Json(draft))
}

/// POST /reservation/complete | /reservation/ticket
/// Persist one reservation per seat and return the issued tickets
async fn issue_tickets(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<KeyQuery>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    let tickets = state.reservations.issue_tickets(&DraftKey::from(query.key)).await?;
    Ok(Json(tickets))
}

/// POST /reservation/save
/// Persist without projecting tickets
async fn save_reservations(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<KeyQuery>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let saved = state.reservations.finalize(&DraftKey::from(query.key)).await?;
    Ok(Json(saved))
}

/// DELETE /reservation/cancel
async fn cancel_draft(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<KeyQuery>,
) -> Result<&'static str, AppError> {
    state.reservations.cancel(&DraftKey::from(query.key)).await?;
    Ok("reservation cancelled")
}

/// GET /reservation/send
/// Merge the cached identity token and event payload stored under the key
async fn assemble_external(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<KeyQuery>,
) -> Result<Json<ReservationDetails>, AppError> {
    let details = state.assembler.assemble(&DraftKey::from(query.key)).await?;
    Ok(Json(details))
}

/// GET /reservation/user?eventId=&userId=
async fn user_reservations(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserReservationsQuery>,
) -> Result<Json<Vec<Reservation>>, AppError> {
    let reservations = state
        .reservations
        .get_user_reservations(query.event_id, query.user_id)
        .await?;
    Ok(Json(reservations))
}

/// GET /reservation/{id}
async fn get_reservation(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Reservation>, AppError> {
    state
        .reservations
        .get_reservation(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("reservation {} not found", id)))
}

/// GET /reservation/ticket/{id}
async fn get_ticket(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Ticket>, AppError> {
    state
        .reservations
        .get_ticket(id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFoundError(format!("ticket {} not found", id)))
}
