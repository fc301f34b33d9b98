use chrono::{DateTime, NaiveDateTime, Utc};

use crate::models::{NewReservation, ReservationDraft, SpotStatus};
use crate::{CoreError, CoreResult};

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

pub fn parse_price(raw: &str) -> CoreResult<i32> {
    let price: i32 = raw
        .parse()
        .map_err(|_| CoreError::ValidationError(format!("price {:?} is not an integer", raw)))?;
    if price < 0 {
        return Err(CoreError::ValidationError(format!("price {} is negative", price)));
    }
    Ok(price)
}

/// Local ISO date-times are taken as-is; RFC 3339 values with an offset are
/// converted to UTC.
pub fn parse_event_date(raw: &str) -> CoreResult<NaiveDateTime> {
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.naive_utc())
        .map_err(|_| CoreError::ValidationError(format!("date {:?} is not an ISO date-time", raw)))
}

/// Build one row per selected spot, in selection order. Parsing happens
/// once, up front, so a malformed draft yields no rows at all.
pub fn build_reservations(draft: &ReservationDraft, reserved_at: DateTime<Utc>) -> CoreResult<Vec<NewReservation>> {
    let details = &draft.details;
    let price = parse_price(&details.price)?;
    let date = parse_event_date(&details.date)?;

    Ok(draft
        .spots
        .iter()
        .map(|spot| NewReservation {
            user_id: details.user_id,
            user_name: details.user_name.clone(),
            event_id: details.event_id,
            title: details.title.clone(),
            place: details.place.clone(),
            date,
            price,
            all_spots: details.all_spots,
            spot: spot.clone(),
            status: SpotStatus::NonAvailable,
            phone: details.phone.clone(),
            email: details.email.clone(),
            reserved_at,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::concert;
    use chrono::NaiveDate;

    #[test]
    fn test_one_row_per_spot_in_order() {
        let mut draft = ReservationDraft::new(concert());
        draft.spots = vec!["C3".to_string(), "A1".to_string(), "B2".to_string()];
        let now = Utc::now();

        let rows = build_reservations(&draft, now).unwrap();
        assert_eq!(rows.iter().map(|r| r.spot.as_str()).collect::<Vec<_>>(), vec!["C3", "A1", "B2"]);
        for row in &rows {
            assert_eq!(row.status, SpotStatus::NonAvailable);
            assert_eq!(row.price, 50000);
            assert_eq!(row.all_spots, 100);
            assert_eq!(row.user_name, "Alice");
            assert_eq!(row.reserved_at, now);
        }
    }

    #[test]
    fn test_unparsable_price_fails() {
        let mut details = concert();
        details.price = "abc".to_string();
        let mut draft = ReservationDraft::new(details);
        draft.spots = vec!["A1".to_string()];

        assert!(matches!(build_reservations(&draft, Utc::now()), Err(CoreError::ValidationError(_))));
    }

    #[test]
    fn test_price_rules() {
        assert_eq!(parse_price("0").unwrap(), 0);
        assert!(parse_price("-5").is_err());
        assert!(parse_price("12.5").is_err());
        assert!(parse_price("99999999999").is_err());
    }

    #[test]
    fn test_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap().and_hms_opt(19, 0, 0).unwrap();
        assert_eq!(parse_event_date("2025-05-01T19:00:00").unwrap(), expected);
        assert_eq!(parse_event_date("2025-05-01T19:00").unwrap(), expected);
        assert_eq!(parse_event_date("2025-05-01 19:00:00").unwrap(), expected);
        assert_eq!(parse_event_date("2025-05-01T19:00:00.000").unwrap(), expected);
        assert_eq!(parse_event_date("2025-05-02T04:00:00+09:00").unwrap(), expected);
        assert!(parse_event_date("May 1st").is_err());
        assert!(parse_event_date("").is_err());
    }
}
