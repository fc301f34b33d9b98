use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use seatline_core::repository::{RepoError, ReservationRepository};
use seatline_core::{CoreError, NewReservation, Reservation, SpotStatus};
use seatline_shared::Masked;
use sqlx::PgPool;

const COLUMNS: &str = "id, user_id, user_name, event_id, title, place, event_date, price, all_spots, spot, status, phone, email, reserved_at";

pub struct StoreReservationRepository {
    pool: PgPool,
}

impl StoreReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReservationRow {
    id: i64,
    user_id: i64,
    user_name: String,
    event_id: i64,
    title: String,
    place: String,
    event_date: NaiveDateTime,
    price: i32,
    all_spots: i32,
    spot: String,
    status: String,
    phone: Option<String>,
    email: Option<String>,
    reserved_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = CoreError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        let status: SpotStatus = row
            .status
            .parse()
            .map_err(|_| CoreError::InvariantViolation(format!("reservation {} has unknown status {:?}", row.id, row.status)))?;

        Ok(Reservation {
            id: row.id,
            user_id: row.user_id,
            user_name: row.user_name,
            event_id: row.event_id,
            title: row.title,
            place: row.place,
            date: row.event_date,
            price: row.price,
            all_spots: row.all_spots,
            spot: row.spot,
            status,
            phone: row.phone.map(Masked::new),
            email: row.email.map(Masked::new),
            reserved_at: row.reserved_at,
        })
    }
}

#[async_trait]
impl ReservationRepository for StoreReservationRepository {
    async fn insert_all(&self, rows: &[NewReservation]) -> Result<Vec<Reservation>, RepoError> {
        let insert = format!(
            r#"
            INSERT INTO reservations (user_id, user_name, event_id, title, place, event_date, price, all_spots, spot, status, phone, email, reserved_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            COLUMNS
        );

        let mut tx = self.pool.begin().await?;
        let mut saved = Vec::with_capacity(rows.len());

        for row in rows {
            let inserted = sqlx::query_as::<_, ReservationRow>(&insert)
                .bind(row.user_id)
                .bind(&row.user_name)
                .bind(row.event_id)
                .bind(&row.title)
                .bind(&row.place)
                .bind(row.date)
                .bind(row.price)
                .bind(row.all_spots)
                .bind(&row.spot)
                .bind(row.status.as_str())
                .bind(row.phone.as_ref().map(|p| p.expose().as_str()))
                .bind(row.email.as_ref().map(|e| e.expose().as_str()))
                .bind(row.reserved_at)
                .fetch_one(&mut *tx)
                .await?;
            saved.push(Reservation::try_from(inserted)?);
        }

        // dropping `tx` on any error above rolls the whole batch back
        tx.commit().await?;

        Ok(saved)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Reservation>, RepoError> {
        let row = sqlx::query_as::<_, ReservationRow>(&format!("SELECT {} FROM reservations WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Reservation::try_from).transpose()?)
    }

    async fn find_by_event_and_user(&self, event_id: i64, user_id: i64) -> Result<Vec<Reservation>, RepoError> {
        let rows = sqlx::query_as::<_, ReservationRow>(&format!(
            "SELECT {} FROM reservations WHERE event_id = $1 AND user_id = $2 ORDER BY id",
            COLUMNS
        ))
        .bind(event_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Reservation::try_from).collect::<Result<Vec<_>, _>>()?)
    }
}
