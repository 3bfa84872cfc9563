use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::reservation::ReservationStatus;
use crate::entities::user::UserRole;
use crate::entities::{reservation, route, trip, user, vehicle};
use crate::error::{AppError, AppResult};
use crate::handlers::student::{self, TripResponse};
use crate::AppState;

// ============ User Management ============

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub role: UserRole,
    pub profile_picture_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        UserResponse {
            id: u.id,
            email: u.email,
            first_name: u.first_name,
            last_name: u.last_name,
            phone: u.phone,
            role: u.role,
            profile_picture_url: u.profile_picture_url,
            created_at: u.created_at.with_timezone(&Utc),
        }
    }
}

/// List all users (admin)
pub async fn list_all_users(State(state): State<AppState>) -> AppResult<Json<Vec<UserResponse>>> {
    let users = user::Entity::find()
        .order_by_asc(user::Column::CreatedAt)
        .all(&state.db)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UpdateRoleRequest {
    pub role: UserRole,
}

/// Update a user's role (admin)
pub async fn update_user_role(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> AppResult<Json<UserResponse>> {
    let user = user::Entity::find_by_id(user_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let old_role = user.role.clone();

    // A demoted driver keeps published trips but is detached from them
    if old_role == UserRole::Driver && payload.role != UserRole::Driver {
        let trips = trip::Entity::find()
            .filter(trip::Column::DriverId.eq(user_id))
            .all(&state.db)
            .await?;
        for t in trips {
            let mut active: trip::ActiveModel = t.into();
            active.driver_id = Set(None);
            active.update(&state.db).await?;
        }
    }

    let mut active: user::ActiveModel = user.into();
    active.role = Set(payload.role.clone());
    let updated = active.update(&state.db).await?;

    Ok(Json(updated.into()))
}

/// Delete a user account (admin). Users holding confirmed reservations
/// cannot be deleted: their rows back the seat decrements on the booked
/// trips, and there is no refund path that could release those seats.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    let user = user::Entity::find_by_id(id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let booked = reservation::Entity::find()
        .filter(reservation::Column::StudentId.eq(id))
        .one(&state.db)
        .await?;
    if booked.is_some() {
        return Err(AppError::Conflict(
            "User has confirmed reservations and cannot be deleted".to_string(),
        ));
    }

    if user.role == UserRole::Driver {
        // Detach from published trips before the row goes away
        let trips = trip::Entity::find()
            .filter(trip::Column::DriverId.eq(id))
            .all(&state.db)
            .await?;
        for t in trips {
            let mut active: trip::ActiveModel = t.into();
            active.driver_id = Set(None);
            active.update(&state.db).await?;
        }
    }

    user::Entity::delete_by_id(id).exec(&state.db).await?;

    Ok(Json(serde_json::json!({ "message": "User deleted" })))
}

// ============ Trips ============

/// List every trip, booked out or not (admin)
pub async fn list_trips(State(state): State<AppState>) -> AppResult<Json<Vec<TripResponse>>> {
    let trips = trip::Entity::find()
        .order_by_asc(trip::Column::DepartureDate)
        .order_by_asc(trip::Column::DepartureTime)
        .all(&state.db)
        .await?;

    let routes = route::Entity::find().all(&state.db).await?;
    let vehicles = vehicle::Entity::find().all(&state.db).await?;
    let drivers = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Driver))
        .all(&state.db)
        .await?;

    let responses: Vec<TripResponse> = trips
        .into_iter()
        .filter_map(|t| student::build_trip_response(t, &routes, &vehicles, &drivers))
        .collect();

    Ok(Json(responses))
}

// ============ Reservations ============

#[derive(Debug, Serialize)]
pub struct ReservationDetail {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub seat_count: i32,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub student_name: String,
    pub student_email: String,
    pub route_name: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub price: f64,
    pub trip_seats_available: i32,
}

/// List every reservation joined with student and trip attributes,
/// newest first (admin)
pub async fn list_reservations(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ReservationDetail>>> {
    let reservations = reservation::Entity::find()
        .order_by_desc(reservation::Column::ReservedAt)
        .all(&state.db)
        .await?;

    let users = user::Entity::find().all(&state.db).await?;
    let trips = trip::Entity::find().all(&state.db).await?;
    let routes = route::Entity::find().all(&state.db).await?;

    let responses: Vec<ReservationDetail> = reservations
        .into_iter()
        .filter_map(|r| {
            let student = users.iter().find(|u| u.id == r.student_id)?;
            let trip = trips.iter().find(|t| t.id == r.trip_id)?;
            let route = routes.iter().find(|rt| rt.id == trip.route_id)?;

            Some(ReservationDetail {
                id: r.id,
                trip_id: r.trip_id,
                seat_count: r.seat_count,
                status: r.status,
                reserved_at: r.reserved_at.with_timezone(&Utc),
                student_name: format!("{} {}", student.first_name, student.last_name),
                student_email: student.email.clone(),
                route_name: route.name.clone(),
                origin: route.origin.clone(),
                destination: route.destination.clone(),
                departure_date: trip.departure_date,
                departure_time: trip.departure_time,
                price: trip.price,
                trip_seats_available: trip.seats_available,
            })
        })
        .collect();

    Ok(Json(responses))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, DatabaseConnection, MockDatabase, MockExecResult};

    use super::*;
    use crate::entities::reservation::ReservationStatus;
    use crate::Config;

    fn test_state(db: DatabaseConnection) -> AppState {
        AppState {
            db,
            config: Config {
                database_url: String::new(),
                jwt_secret: "secret".to_string(),
                jwt_expiration_hours: 24,
                server_host: "127.0.0.1".to_string(),
                server_port: 3000,
                uploads_dir: "uploads".to_string(),
            },
        }
    }

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

    fn reservation_model(student_id: Uuid) -> reservation::Model {
        reservation::Model {
            id: Uuid::new_v4(),
            trip_id: Uuid::new_v4(),
            student_id,
            seat_count: 2,
            status: ReservationStatus::Confirmed,
            reserved_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn deleting_a_user_with_reservations_is_refused() {
        let user_id = Uuid::new_v4();

        // The student's reservation rows back the seat decrements on the
        // booked trips; removing them would leave seats phantom-occupied.
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_model(user_id)]])
            .append_query_results([vec![reservation_model(user_id)]])
            .into_connection();
        let state = test_state(db);

        let err = delete_user(State(state.clone()), Path(user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let log = format!("{:?}", state.db.into_transaction_log());
        assert!(!log.contains("DELETE"), "refused deletion must not delete");
    }

    #[tokio::test]
    async fn deleting_a_user_without_reservations_succeeds() {
        let user_id = Uuid::new_v4();

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![student_model(user_id)]])
            .append_query_results([Vec::<reservation::Model>::new()])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let state = test_state(db);

        let result = delete_user(State(state), Path(user_id)).await;
        assert!(result.is_ok());
    }
}
