use axum::{
    extract::{Path, State},
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::trip::TripStatus;
use crate::entities::{reservation, route, trip, user, vehicle};
use crate::error::{AppError, AppResult};
use crate::utils::jwt::Claims;
use crate::AppState;

// ============ Catalog (routes & vehicles) ============

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub name: String,
    pub origin: String,
    pub destination: String,
}

/// Create a route, or return the existing one with the same name, origin,
/// and destination
pub async fn create_route(
    State(state): State<AppState>,
    Json(payload): Json<CreateRouteRequest>,
) -> AppResult<Json<route::Model>> {
    if payload.name.is_empty() || payload.origin.is_empty() || payload.destination.is_empty() {
        return Err(AppError::BadRequest(
            "Route name, origin, and destination are required".to_string(),
        ));
    }

    let existing = route::Entity::find()
        .filter(route::Column::Name.eq(&payload.name))
        .filter(route::Column::Origin.eq(&payload.origin))
        .filter(route::Column::Destination.eq(&payload.destination))
        .one(&state.db)
        .await?;

    if let Some(route) = existing {
        return Ok(Json(route));
    }

    let new_route = route::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        origin: Set(payload.origin),
        destination: Set(payload.destination),
    };

    Ok(Json(new_route.insert(&state.db).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateVehicleRequest {
    pub make: String,
    pub model: String,
    pub plate: String,
    pub capacity: i32,
}

/// Create a vehicle, or return the existing one with the same plate
pub async fn create_vehicle(
    State(state): State<AppState>,
    Json(payload): Json<CreateVehicleRequest>,
) -> AppResult<Json<vehicle::Model>> {
    if payload.capacity <= 0 {
        return Err(AppError::BadRequest(
            "Vehicle capacity must be greater than 0".to_string(),
        ));
    }

    let existing = vehicle::Entity::find()
        .filter(vehicle::Column::Plate.eq(&payload.plate))
        .one(&state.db)
        .await?;

    if let Some(vehicle) = existing {
        return Ok(Json(vehicle));
    }

    let new_vehicle = vehicle::ActiveModel {
        id: Set(Uuid::new_v4()),
        make: Set(payload.make),
        model: Set(payload.model),
        plate: Set(payload.plate),
        capacity: Set(payload.capacity),
    };

    Ok(Json(new_vehicle.insert(&state.db).await?))
}

// ============ Trip publishing ============

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub route_id: Uuid,
    pub vehicle_id: Uuid,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub estimated_arrival_time: Option<NaiveTime>,
    pub price: f64,
}

/// Publish a trip. The seat inventory starts at the vehicle's capacity;
/// from then on only the reservation engine may change it.
pub async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTripRequest>,
) -> AppResult<Json<trip::Model>> {
    route::Entity::find_by_id(payload.route_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid route".to_string()))?;

    let vehicle = vehicle::Entity::find_by_id(payload.vehicle_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Invalid vehicle".to_string()))?;

    if payload.price < 0.0 {
        return Err(AppError::BadRequest("Price cannot be negative".to_string()));
    }

    let new_trip = trip::ActiveModel {
        id: Set(Uuid::new_v4()),
        route_id: Set(payload.route_id),
        vehicle_id: Set(payload.vehicle_id),
        driver_id: Set(Some(claims.sub)),
        departure_date: Set(payload.departure_date),
        departure_time: Set(payload.departure_time),
        estimated_arrival_time: Set(payload.estimated_arrival_time),
        status: Set(TripStatus::Scheduled),
        price: Set(payload.price),
        seats_available: Set(vehicle.capacity),
        ..Default::default()
    };

    Ok(Json(new_trip.insert(&state.db).await?))
}

#[derive(Debug, Serialize)]
pub struct DriverTripResponse {
    pub id: Uuid,
    pub route_name: String,
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub price: f64,
    pub seats_available: i32,
    pub vehicle_capacity: i32,
}

/// List trips published by the logged-in driver
pub async fn my_trips(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AppResult<Json<Vec<DriverTripResponse>>> {
    let trips = trip::Entity::find()
        .filter(trip::Column::DriverId.eq(claims.sub))
        .order_by_asc(trip::Column::DepartureDate)
        .order_by_asc(trip::Column::DepartureTime)
        .all(&state.db)
        .await?;

    let routes = route::Entity::find().all(&state.db).await?;
    let vehicles = vehicle::Entity::find().all(&state.db).await?;

    let responses: Vec<DriverTripResponse> = trips
        .into_iter()
        .filter_map(|t| {
            let route = routes.iter().find(|r| r.id == t.route_id)?;
            let vehicle = vehicles.iter().find(|v| v.id == t.vehicle_id)?;

            Some(DriverTripResponse {
                id: t.id,
                route_name: route.name.clone(),
                origin: route.origin.clone(),
                destination: route.destination.clone(),
                departure_date: t.departure_date,
                departure_time: t.departure_time,
                price: t.price,
                seats_available: t.seats_available,
                vehicle_capacity: vehicle.capacity,
            })
        })
        .collect();

    Ok(Json(responses))
}

#[derive(Debug, Serialize)]
pub struct PassengerInfo {
    pub reservation_id: Uuid,
    pub student_name: String,
    pub student_email: String,
    pub seat_count: i32,
    pub reserved_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TripPassengersResponse {
    pub trip_id: Uuid,
    pub route_name: String,
    pub departure_date: NaiveDate,
    pub departure_time: NaiveTime,
    pub passengers: Vec<PassengerInfo>,
}

/// Get the confirmed passengers for one of the driver's trips
pub async fn trip_passengers(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(trip_id): Path<Uuid>,
) -> AppResult<Json<TripPassengersResponse>> {
    let trip = trip::Entity::find_by_id(trip_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Trip not found".to_string()))?;

    if trip.driver_id != Some(claims.sub) {
        return Err(AppError::Forbidden(
            "You are not the driver of this trip".to_string(),
        ));
    }

    let route = route::Entity::find_by_id(trip.route_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| AppError::Internal("Route not found".to_string()))?;

    let reservations = reservation::Entity::find()
        .filter(reservation::Column::TripId.eq(trip_id))
        .all(&state.db)
        .await?;

    let students = user::Entity::find().all(&state.db).await?;

    let passengers: Vec<PassengerInfo> = reservations
        .into_iter()
        .map(|r| {
            let student = students.iter().find(|s| s.id == r.student_id);
            PassengerInfo {
                reservation_id: r.id,
                student_name: student
                    .map(|s| format!("{} {}", s.first_name, s.last_name))
                    .unwrap_or_default(),
                student_email: student.map(|s| s.email.clone()).unwrap_or_default(),
                seat_count: r.seat_count,
                reserved_at: r.reserved_at.with_timezone(&Utc),
            }
        })
        .collect();

    Ok(Json(TripPassengersResponse {
        trip_id: trip.id,
        route_name: route.name,
        departure_date: trip.departure_date,
        departure_time: trip.departure_time,
        passengers,
    }))
}
