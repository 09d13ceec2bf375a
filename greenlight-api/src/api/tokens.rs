//! Token issuing endpoints

use axum::{Json, extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError, ErrorCode};
use validator::Validate;

use super::validate_password;
use crate::auth::Scope;
use crate::db::{StoreError, User};
use crate::email::EmailTemplate;
use crate::error::validation_failed;
use crate::security_log;
use crate::state::AppState;
use crate::util::verify_password;

#[derive(Debug, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expiry: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
}

/// Look up the account a token is being requested for
async fn user_for_email(state: &AppState, email: &str) -> Result<User, AppError> {
    match state.store.user_by_email(email).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => Err(AppError::validation("no matching email address found")
            .with_detail("email", "no matching email address found")),
        Err(e) => Err(e.into()),
    }
}

// ── POST /v1/tokens/authentication ──

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
}

pub async fn create_authentication_token(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<(StatusCode, Json<ApiResponse<IssuedToken>>), AppError> {
    req.validate().map_err(validation_failed)?;

    let user = match state.store.user_by_email(&req.email).await {
        Ok(user) => user,
        Err(StoreError::NotFound) => {
            security_log!("WARN", "login_failed", reason = "unknown_email");
            return Err(AppError::invalid_credentials());
        }
        Err(e) => return Err(e.into()),
    };

    if !verify_password(&req.password, &user.password_hash) {
        security_log!("WARN", "login_failed", reason = "bad_password", user_id = user.id);
        return Err(AppError::invalid_credentials());
    }

    let ttl = Scope::Authentication.default_ttl();
    let expiry = DateTime::from_timestamp_millis(state.store.now_millis() + ttl.as_millis() as i64);
    let token = state
        .store
        .new_token(user.id, ttl, Scope::Authentication)
        .await?;

    security_log!("INFO", "login_succeeded", user_id = user.id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(IssuedToken { token, expiry })),
    ))
}

// ── POST /v1/tokens/activation ──

pub async fn create_activation_token(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), AppError> {
    req.validate().map_err(validation_failed)?;

    let user = user_for_email(&state, &req.email).await?;
    if user.activated {
        return Err(AppError::new(ErrorCode::AccountAlreadyActivated)
            .with_detail("email", "user has already been activated"));
    }

    let token = state
        .store
        .new_token(user.id, Scope::Activation.default_ttl(), Scope::Activation)
        .await?;
    state.send_email(
        user.email,
        EmailTemplate::Activation {
            activation_token: token,
        },
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok_with_message(
            "an email will be sent to you containing activation instructions",
        )),
    ))
}

// ── POST /v1/tokens/password-reset ──

pub async fn create_password_reset_token(
    State(state): State<AppState>,
    Json(req): Json<EmailRequest>,
) -> Result<(StatusCode, Json<ApiResponse<()>>), AppError> {
    req.validate().map_err(validation_failed)?;

    let user = user_for_email(&state, &req.email).await?;
    if !user.activated {
        return Err(AppError::validation("user account must be activated")
            .with_detail("email", "user account must be activated"));
    }

    let token = state
        .store
        .new_token(
            user.id,
            Scope::PasswordReset.default_ttl(),
            Scope::PasswordReset,
        )
        .await?;
    state.send_email(user.email, EmailTemplate::PasswordReset { reset_token: token });

    security_log!("INFO", "password_reset_requested", user_id = user.id);
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::ok_with_message(
            "an email will be sent to you containing password reset instructions",
        )),
    ))
}
