//! Trip capacity and reservation engine.
//!
//! All seat bookings funnel through [`reserve_seats`], which is the sole
//! writer of `trip.seats_available`. The trip row is read under
//! `SELECT ... FOR UPDATE`, so concurrent bookings against the same trip
//! are serialized by the database while bookings against different trips
//! proceed in parallel.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::entities::reservation::{self, ReservationStatus};
use crate::entities::{trip, user};
use crate::error::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub trip_id: Uuid,
    pub student_id: Uuid,
    pub seat_count: i32,
    pub reserved_at: DateTime<Utc>,
}

/// Seats left on the trip after granting the request, or `None` when the
/// remaining capacity is short. Applied while the trip row is locked.
fn seats_remaining_after(seats_available: i32, seat_count: i32) -> Option<i32> {
    (seat_count <= seats_available).then(|| seats_available - seat_count)
}

/// Atomically reserve seats on a trip.
///
/// Protocol: begin a transaction, lock the trip row exclusively, check
/// capacity, insert the reservation, decrement `seats_available`, commit.
/// Every failure path aborts the transaction before anything is visible:
/// the conflict and not-found branches roll back explicitly, and an error
/// bubbling out of `?` drops the uncommitted transaction, which sea-orm
/// rolls back. No partial booking can ever persist.
pub async fn reserve_seats(
    db: &DatabaseConnection,
    request: BookingRequest,
) -> AppResult<reservation::Model> {
    if request.seat_count <= 0 {
        return Err(AppError::BadRequest(
            "Seat count must be greater than 0".to_string(),
        ));
    }

    let txn = db.begin().await?;

    let student = user::Entity::find_by_id(request.student_id)
        .one(&txn)
        .await?;
    if student.is_none() {
        txn.rollback().await?;
        return Err(AppError::NotFound("Student not found".to_string()));
    }

    // Exclusive row lock: concurrent bookings for this trip block here
    // until the transaction ends, so the seat count read below cannot go
    // stale before the decrement.
    let trip = match trip::Entity::find_by_id(request.trip_id)
        .lock_exclusive()
        .one(&txn)
        .await?
    {
        Some(trip) => trip,
        None => {
            txn.rollback().await?;
            return Err(AppError::NotFound("Trip not found".to_string()));
        }
    };

    let remaining = match seats_remaining_after(trip.seats_available, request.seat_count) {
        Some(remaining) => remaining,
        None => {
            let remaining = trip.seats_available;
            txn.rollback().await?;
            return Err(AppError::SeatsUnavailable { remaining });
        }
    };

    let new_reservation = reservation::ActiveModel {
        id: Set(Uuid::new_v4()),
        trip_id: Set(trip.id),
        student_id: Set(request.student_id),
        seat_count: Set(request.seat_count),
        status: Set(ReservationStatus::Confirmed),
        reserved_at: Set(request.reserved_at.into()),
    };
    let reservation = new_reservation.insert(&txn).await?;

    let trip_id = trip.id;
    let mut locked_trip: trip::ActiveModel = trip.into();
    locked_trip.seats_available = Set(remaining);
    locked_trip.update(&txn).await?;

    txn.commit().await?;

    tracing::info!(
        trip_id = %trip_id,
        seats = request.seat_count,
        remaining,
        "Reservation confirmed"
    );

    Ok(reservation)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};
    use sea_orm::{DatabaseBackend, MockDatabase};

    use super::*;
    use crate::entities::trip::TripStatus;
    use crate::entities::user::UserRole;

    fn student_model(id: Uuid) -> user::Model {
        user::Model {
            id,
            email: "ana@example.edu".to_string(),
            password_hash: "hash".to_string(),
            first_name: "Ana".to_string(),
            last_name: "Mora".to_string(),
            phone: None,
            role: UserRole::Student,
            profile_picture_url: None,
            created_at: Utc::now().into(),
        }
    }

    fn trip_model(id: Uuid, seats_available: i32) -> trip::Model {
        trip::Model {
            id,
            route_id: Uuid::new_v4(),
            vehicle_id: Uuid::new_v4(),
            driver_id: None,
            departure_date: NaiveDate::from_ymd_opt(2025, 4, 10).unwrap(),
            departure_time: NaiveTime::from_hms_opt(7, 30, 0).unwrap(),
            estimated_arrival_time: NaiveTime::from_hms_opt(8, 15, 0),
            status: TripStatus::Scheduled,
            price: 1.5,
            seats_available,
            created_at: Utc::now().into(),
        }
    }

    fn reservation_model(trip_id: Uuid, student_id: Uuid, seat_count: i32) -> reservation::Model {
        reservation::Model {
            id: Uuid::new_v4(),
            trip_id,
            student_id,
            seat_count,
            status: ReservationStatus::Confirmed,
            reserved_at: Utc::now().into(),
        }
    }

    fn request(trip_id: Uuid, student_id: Uuid, seat_count: i32) -> BookingRequest {
        BookingRequest {
            trip_id,
            student_id,
            seat_count,
            reserved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn booking_succeeds_and_decrements_under_row_lock() {
        let trip_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_model(student_id)]])
            .append_query_results([vec![trip_model(trip_id, 3)]])
            .append_query_results([vec![reservation_model(trip_id, student_id, 2)]])
            .append_query_results([vec![trip_model(trip_id, 1)]])
            .into_connection();

        let reservation = reserve_seats(&db, request(trip_id, student_id, 2))
            .await
            .unwrap();
        assert_eq!(reservation.seat_count, 2);
        assert_eq!(reservation.status, ReservationStatus::Confirmed);

        let log = format!("{:?}", db.into_transaction_log());
        assert!(log.contains("FOR UPDATE"), "trip read must take a row lock");
        assert!(log.contains("INSERT"), "booking must insert a reservation");
        assert!(log.contains("seats_available"), "booking must write the seat count");
    }

    #[tokio::test]
    async fn insufficient_capacity_rolls_back_without_insert() {
        let trip_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_model(student_id)]])
            .append_query_results([vec![trip_model(trip_id, 1)]])
            .into_connection();

        let err = reserve_seats(&db, request(trip_id, student_id, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SeatsUnavailable { remaining: 1 }));

        let log = format!("{:?}", db.into_transaction_log());
        assert!(!log.contains("INSERT"), "rejected booking must not insert");
        // "FOR UPDATE" appears in the locked SELECT, so look for the
        // decrement statement specifically.
        assert!(
            !log.contains("seats_available\\\" ="),
            "rejected booking must not decrement"
        );
    }

    #[tokio::test]
    async fn second_booking_observes_the_first_decrement() {
        let trip_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();

        // First booking takes 2 of 3 seats; the second request for 2 then
        // finds only 1 left and conflicts.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_model(student_id)]])
            .append_query_results([vec![trip_model(trip_id, 3)]])
            .append_query_results([vec![reservation_model(trip_id, student_id, 2)]])
            .append_query_results([vec![trip_model(trip_id, 1)]])
            .append_query_results([vec![student_model(student_id)]])
            .append_query_results([vec![trip_model(trip_id, 1)]])
            .into_connection();

        let first = reserve_seats(&db, request(trip_id, student_id, 2)).await;
        assert!(first.is_ok());

        let second = reserve_seats(&db, request(trip_id, student_id, 2))
            .await
            .unwrap_err();
        assert!(matches!(second, AppError::SeatsUnavailable { remaining: 1 }));
    }

    #[tokio::test]
    async fn unknown_trip_is_not_found() {
        let student_id = Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_model(student_id)]])
            .append_query_results([Vec::<trip::Model>::new()])
            .into_connection();

        let err = reserve_seats(&db, request(Uuid::new_v4(), student_id, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_student_is_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<user::Model>::new()])
            .into_connection();

        let err = reserve_seats(&db, request(Uuid::new_v4(), Uuid::new_v4(), 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn non_positive_seat_count_is_rejected_before_any_query() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = reserve_seats(&db, request(Uuid::new_v4(), Uuid::new_v4(), 0))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        assert!(db.into_transaction_log().is_empty());
    }

    #[test]
    fn admission_scenario_three_seats() {
        // 3 seats: a request for 2 succeeds leaving 1, a second request
        // for 2 conflicts and leaves the count untouched.
        assert_eq!(seats_remaining_after(3, 2), Some(1));
        assert_eq!(seats_remaining_after(1, 2), None);
        assert_eq!(seats_remaining_after(1, 1), Some(0));
        assert_eq!(seats_remaining_after(0, 1), None);
    }

    #[test]
    fn serialized_single_seat_requests_sell_out_exactly() {
        // The row lock totally orders attempts against one trip, so N
        // single-seat requests against K remaining seats behave like this
        // sequential fold: exactly K admitted, the rest rejected.
        let (n, k) = (8, 5);
        let mut seats_available = k;
        let mut admitted = 0;
        let mut rejected = 0;

        for _ in 0..n {
            match seats_remaining_after(seats_available, 1) {
                Some(remaining) => {
                    seats_available = remaining;
                    admitted += 1;
                }
                None => rejected += 1,
            }
        }

        assert_eq!(admitted, k);
        assert_eq!(rejected, n - k);
        assert_eq!(seats_available, 0);
    }
}
