use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::entities::user::UserRole;
use crate::error::{AppError, AppResult};
use crate::utils::jwt::{verify_token, Claims};
use crate::AppState;

/// Validate the bearer token and stash the claims in the request
/// extensions for the role guards and handlers downstream
pub async fn auth_middleware(
    State(state): State<AppState>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    mut request: Request,
    next: Next,
) -> AppResult<Response> {
    let claims = verify_token(auth.token(), &state.config.jwt_secret)?;
    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Pass only requests whose authenticated user carries the expected role.
/// Claims missing from the extensions means the guard ran on a route that
/// skipped `auth_middleware`.
fn check_role(request: &Request, expected: UserRole) -> AppResult<()> {
    let claims = request
        .extensions()
        .get::<Claims>()
        .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()))?;

    if claims.role != expected {
        return Err(AppError::Forbidden(format!(
            "This action requires the {:?} role",
            expected
        )));
    }

    Ok(())
}

pub async fn require_admin(request: Request, next: Next) -> AppResult<Response> {
    check_role(&request, UserRole::Admin)?;
    Ok(next.run(request).await)
}

pub async fn require_driver(request: Request, next: Next) -> AppResult<Response> {
    check_role(&request, UserRole::Driver)?;
    Ok(next.run(request).await)
}

pub async fn require_student(request: Request, next: Next) -> AppResult<Response> {
    check_role(&request, UserRole::Student)?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;

    fn request_with_role(role: UserRole) -> Request {
        let mut request = Request::new(Body::empty());
        request.extensions_mut().insert(Claims {
            sub: Uuid::new_v4(),
            email: "ana@example.edu".to_string(),
            role,
            exp: Utc::now().timestamp() + 3600,
            iat: Utc::now().timestamp(),
        });
        request
    }

    #[test]
    fn guard_admits_the_expected_role() {
        let request = request_with_role(UserRole::Driver);
        assert!(check_role(&request, UserRole::Driver).is_ok());
    }

    #[test]
    fn guard_rejects_other_roles() {
        let request = request_with_role(UserRole::Student);
        let err = check_role(&request, UserRole::Admin).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn guard_rejects_unauthenticated_requests() {
        let request = Request::new(Body::empty());
        let err = check_role(&request, UserRole::Student).unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
