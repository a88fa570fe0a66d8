use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use busline_core::{AccessToken, CoreError, Role};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Bearer Token Middleware
// ============================================================================

/// Decode the bearer token and inject the caller's [`AccessToken`].
pub async fn token_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(CoreError::MalformedHeader)?;

    let token = state.accounts.decode(header)?;
    req.extensions_mut().insert(token);

    Ok(next.run(req).await)
}

// ============================================================================
// Admin Middleware
// ============================================================================

/// Runs after [`token_middleware`]; lets only `ADMIN` tokens through.
pub async fn admin_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    let token = req
        .extensions()
        .get::<AccessToken>()
        .ok_or(CoreError::MalformedHeader)?;
    token.require_admin()?;
    Ok(next.run(req).await)
}

// ============================================================================
// Extractors
// ============================================================================

/// The authenticated caller, as injected by [`token_middleware`].
pub struct Caller(pub AccessToken);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AccessToken>()
            .cloned()
            .map(Caller)
            .ok_or(AppError::Core(CoreError::MalformedHeader))
    }
}

/// A caller holding the `ADMIN` role.
pub struct AdminCaller(pub AccessToken);

impl<S: Send + Sync> FromRequestParts<S> for AdminCaller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Caller(token) = Caller::from_request_parts(parts, state).await?;
        if !token.has_role(Role::Admin) {
            return Err(CoreError::AccessDenied.into());
        }
        Ok(AdminCaller(token))
    }
}
