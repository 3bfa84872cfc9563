use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::services::ServeDir;

use crate::handlers::{admin, auth, driver, profile, student};
use crate::middleware::auth::{auth_middleware, require_admin, require_driver, require_student};
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::role_rate_limit::{create_role_governor, RateLimitedRole};
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Create role-specific governor layers
    let driver_governor = create_role_governor(RateLimitedRole::Driver);
    let student_governor = create_role_governor(RateLimitedRole::Student);
    // Create IP-based governor for public routes (with student-level limits)
    let public_governor = create_public_governor();

    let uploads_dir = state.config.uploads_dir.clone();

    // Public routes (with student-level rate limiting per IP)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Public catalog routes (trips, routes, vehicles)
    let public_routes = Router::new()
        .route("/trips", get(student::list_trips))
        .route("/trips/{id}", get(student::get_trip))
        .route("/routes", get(student::list_routes))
        .route("/vehicles", get(student::list_vehicles))
        .layer(public_governor);

    // Profile picture management (any authenticated user, self or admin)
    let profile_routes = Router::new()
        .route("/{id}/profile-picture", post(profile::upload_profile_picture))
        .route("/{id}/profile-picture", delete(profile::delete_profile_picture))
        .layer(DefaultBodyLimit::max(6 * 1024 * 1024))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Admin routes (requires auth + admin role)
    let admin_routes = Router::new()
        .route("/users", get(admin::list_all_users))
        .route("/users/{id}", delete(admin::delete_user))
        .route("/users/{id}/role", put(admin::update_user_role))
        .route("/trips", get(admin::list_trips))
        .route("/reservations", get(admin::list_reservations))
        .layer(middleware::from_fn(require_admin))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Driver routes (requires auth + driver role)
    let driver_routes = Router::new()
        .route("/routes", post(driver::create_route))
        .route("/vehicles", post(driver::create_vehicle))
        .route("/trips", post(driver::create_trip))
        .route("/trips", get(driver::my_trips))
        .route("/trips/{id}/passengers", get(driver::trip_passengers))
        .layer(driver_governor)
        .layer(middleware::from_fn(require_driver))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Student booking routes (requires auth + student role)
    let student_routes = Router::new()
        .route("/", post(student::create_reservation))
        .route("/", get(student::my_reservations))
        .layer(student_governor)
        .layer(middleware::from_fn(require_student))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", public_routes)
        .nest("/api/users", profile_routes)
        .nest("/api/admin", admin_routes)
        .nest("/api/driver", driver_routes)
        .nest("/api/reservations", student_routes)
        .nest_service("/uploads", ServeDir::new(uploads_dir))
        .with_state(state)
}
