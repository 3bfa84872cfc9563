use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{self, BookingRequest};
use crate::entities::reservation::ReservationStatus;
use crate::entities::trip::TripStatus;
use crate::entities::user::UserRole;
use crate::entities::{reservation, route, trip, user, vehicle};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TripResponse {
    pub id: Uuid,
    pub route: RouteInfo,
    pub vehicle: VehicleInfo,
    pub driver_name: Option<String>,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub estimated_arrival_time: Option<NaiveTime>,
    pub status: TripStatus,
    pub price: f64,
    pub seats_available: i32,
}

#[derive(Debug, Serialize)]
pub struct RouteInfo {
    pub id: Uuid,
    pub name: String,
    pub origin: String,
    pub destination: String,
}

#[derive(Debug, Serialize)]
pub struct VehicleInfo {
    pub id: Uuid,
    pub make: String,
    pub model: String,
    pub plate: String,
    pub capacity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ListTripsQuery {
    pub available: Option<bool>,
}

pub(crate) fn build_trip_response(
    t: trip::Model,
    routes: &[route::Model],
    vehicles: &[vehicle::Model],
    drivers: &[user::Model],
) -> Option<TripResponse> {
    let route = routes.iter().find(|r| r.id == t.route_id)?;
    let vehicle = vehicles.iter().find(|v| v.id == t.vehicle_id)?;
    let driver_name = t.driver_id.and_then(|did| {
        drivers
            .iter()
            .find(|d| d.id == did)
            .map(|d| format!("{} {}", d.first_name, d.last_name))
    });

    Some(TripResponse {
        id: t.id,
        route: RouteInfo {
            id: route.id,
            name: route.name.clone(),
            origin: route.origin.clone(),
            destination: route.destination.clone(),
        },
        vehicle: VehicleInfo {
            id: vehicle.id,
            make: vehicle.make.clone(),
            model: vehicle.model.clone(),
            plate: vehicle.plate.clone(),
            capacity: vehicle.capacity,
        },
        driver_name,
        departure_date: t.departure_date,
        departure_time: t.departure_time,
        estimated_arrival_time: t.estimated_arrival_time,
        status: t.status,
        price: t.price,
        seats_available: t.seats_available,
    })
}

/// List trips joined with route, vehicle, and driver display attributes,
/// ordered by departure date then departure time. With `?available=true`
/// only trips that still have seats are returned.
pub async fn list_trips(
    State(state): State<AppState>,
    Query(query): Query<ListTripsQuery>,
) -> AppResult<Json<Vec<TripResponse>>> {
    let mut finder = trip::Entity::find()
        .order_by_asc(trip::Column::DepartureDate)
        .order_by_asc(trip::Column::DepartureTime);

    if query.available.unwrap_or(false) {
        finder = finder.filter(trip::Column::SeatsAvailable.gt(0));
    }

    let trips = finder.all(&state.db).await?;
    let routes = route::Entity::find().all(&state.db).await?;
    let vehicles = vehicle::Entity::find().all(&state.db).await?;
    let drivers = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Driver))
        .all(&state.db)
        .await?;

    let responses: Vec<TripResponse> = trips
        .into_iter()
        .filter_map(|t| build_trip_response(t, &routes, &vehicles, &drivers))
        .collect();

    Ok(Json(responses))
}

/// Get one trip with the same joined shape
pub async fn get_trip(
    State(state): State<AppState>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripResponse>> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    let routes = route::Entity::find().all(&state.db).await?;
    let vehicles = vehicle::Entity::find().all(&state.db).await?;
    let drivers = user::Entity::find()
        .filter(user::Column::Role.eq(UserRole::Driver))
        .all(&state.db)
        .await?;

    build_trip_response(trip, &routes, &vehicles, &drivers)
        .map(Json)
        .ok_or_else(|| AppError::Internal("Trip references missing route or vehicle".to_string()))
}

/// List all routes
pub async fn list_routes(State(state): State<AppState>) -> AppResult<Json<Vec<route::Model>>> {
    Ok(Json(route::Entity::find().all(&state.db).await?))
}

/// List all vehicles
pub async fn list_vehicles(State(state): State<AppState>) -> AppResult<Json<Vec<vehicle::Model>>> {
    Ok(Json(vehicle::Entity::find().all(&state.db).await?))
}

// ============ Reservations ============

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub trip_id: Uuid,
    pub seat_count: i32,
    pub reserved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub reservation_id: Uuid,
    pub trip_id: Uuid,
    pub seat_count: i32,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
}

/// Book seats on a trip. The whole admission decision happens inside the
/// reservation engine's locked transaction; this handler only shapes the
/// request and the response.
pub async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateReservationRequest>,
) -> AppResult<(StatusCode, Json<ReservationResponse>)> {
    let reservation = engine::reserve_seats(
        &state.db,
        BookingRequest {
            trip_id: payload.trip_id,
            student_id: claims.sub,
            seat_count: payload.seat_count,
            reserved_at: payload.reserved_at.unwrap_or_else(Utc::now),
        },
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(ReservationResponse {
            reservation_id: reservation.id,
            trip_id: reservation.trip_id,
            seat_count: reservation.seat_count,
            status: reservation.status,
            reserved_at: reservation.reserved_at.with_timezone(&Utc),
        }),
    ))
}

#[derive(Debug, Serialize)]
pub struct MyReservationResponse {
    pub id: Uuid,
    pub trip_id: Uuid,
    pub seat_count: i32,
    pub status: ReservationStatus,
    pub reserved_at: DateTime<Utc>,
    pub route_name: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub price: f64,
}

/// List the logged-in student's reservations
pub async fn my_reservations(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<MyReservationResponse>>> {
    let reservations = reservation::Entity::find()
        .filter(reservation::Column::StudentId.eq(claims.sub))
        .order_by_desc(reservation::Column::ReservedAt)
        .all(&state.db)
        .await?;

    let trips = trip::Entity::find().all(&state.db).await?;
    let routes = route::Entity::find().all(&state.db).await?;

    let responses: Vec<MyReservationResponse> = reservations
        .into_iter()
        .filter_map(|r| {
            let trip = trips.iter().find(|t| t.id == r.trip_id)?;
            let route = routes.iter().find(|rt| rt.id == trip.route_id)?;

            Some(MyReservationResponse {
                id: r.id,
                trip_id: r.trip_id,
                seat_count: r.seat_count,
                status: r.status,
                reserved_at: r.reserved_at.with_timezone(&Utc),
                route_name: route.name.clone(),
                origin: route.origin.clone(),
                destination: route.destination.clone(),
                departure_date: trip.departure_date,
                departure_time: trip.departure_time,
                price: trip.price,
            })
        })
        .collect();

    Ok(Json(responses))
}
