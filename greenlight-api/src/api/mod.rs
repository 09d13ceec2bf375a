//! HTTP API
//!
//! Layer order, outermost first: trace → request timeout → CORS → rate limit →
//! authenticate → per-route guards → handler.

pub mod health;
pub mod metrics;
pub mod permissions;
pub mod tokens;
pub mod users;

use axum::routing::{get, post, put};
use axum::{Router, middleware};
use http::{HeaderValue, Method, StatusCode, header};
use shared::error::AppError;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use validator::ValidationError;

use crate::auth::permissions::PERMISSIONS_WRITE;
use crate::auth::{authenticate, rate_limit_middleware, require_activated_user, require_permission};
use crate::config::Config;
use crate::state::AppState;

pub use crate::error::ApiResult;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Activated users only
    let account = Router::new()
        .route("/v1/users/me", get(users::me))
        .route_layer(middleware::from_fn(require_activated_user));

    // permissions:write holders only
    let admin = Router::new()
        .route("/v1/users/{id}/permissions", post(permissions::grant))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_permission(PERMISSIONS_WRITE),
        ));

    // Public
    let public = Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route("/v1/users", post(users::register))
        .route("/v1/users/activated", put(users::activate))
        .route("/v1/users/password", put(users::reset_password))
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token),
        )
        .route("/v1/tokens/activation", post(tokens::create_activation_token))
        .route(
            "/v1/tokens/password-reset",
            post(tokens::create_password_reset_token),
        );

    let mut router = Router::new().merge(public).merge(account).merge(admin);

    if state.config.metrics_enabled {
        router = router.merge(
            Router::new()
                .route("/debug/vars", get(metrics::debug_vars))
                .route_layer(middleware::from_fn(metrics::local_only)),
        );
    }

    router
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), authenticate))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .layer(cors_layer(&state.config))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> AppError {
    AppError::not_found("route")
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_trusted_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::OPTIONS,
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

// ── Shared field validators (lengths are in bytes) ──

pub(crate) fn validate_password(password: &str) -> Result<(), ValidationError> {
    if !(8..=72).contains(&password.len()) {
        return Err(ValidationError::new("password_length")
            .with_message("must be between 8 and 72 bytes long".into()));
    }
    Ok(())
}

pub(crate) fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::new("required").with_message("must be provided".into()));
    }
    if name.len() > 500 {
        return Err(ValidationError::new("name_length")
            .with_message("must not be more than 500 bytes long".into()));
    }
    Ok(())
}

pub(crate) fn validate_token(token: &str) -> Result<(), ValidationError> {
    if !crate::auth::tokens::is_well_formed(token) {
        return Err(ValidationError::new("token_format")
            .with_message("must be 43 bytes long".into()));
    }
    Ok(())
}
