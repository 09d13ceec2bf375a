//! Account endpoints: registration, activation, password reset, current user

use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError};
use validator::Validate;

use super::{ApiResult, validate_name, validate_password, validate_token};
use crate::auth::permissions::DEFAULT_USER_PERMISSIONS;
use crate::auth::{CurrentUser, Scope};
use crate::db::{NewUser, StoreError, User};
use crate::email::EmailTemplate;
use crate::error::validation_failed;
use crate::security_log;
use crate::state::AppState;
use crate::util::hash_password;

fn hash_or_internal(password: &str) -> Result<String, AppError> {
    hash_password(password).map_err(|e| {
        tracing::error!("Password hash error: {e}");
        AppError::internal("Failed to hash password")
    })
}

/// Token lookup for a consumption endpoint: unknown or expired tokens are a
/// field error on `token`, not an authentication failure
async fn user_for_submitted_token(
    state: &AppState,
    scope: Scope,
    token: &str,
) -> Result<User, AppError> {
    match state.store.user_for_token(scope, token).await {
        Ok(user) => Ok(user),
        Err(StoreError::NotFound) => {
            let msg = match scope {
                Scope::PasswordReset => "invalid or expired password reset token",
                _ => "invalid or expired activation token",
            };
            Err(AppError::validation(msg).with_detail("token", msg))
        }
        Err(e) => Err(e.into()),
    }
}

// ── POST /v1/users ──

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_name"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(custom(function = "validate_password"))]
    pub password: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), AppError> {
    req.validate().map_err(validation_failed)?;

    let password_hash = hash_or_internal(&req.password)?;
    let user = state
        .store
        .insert_user(NewUser {
            name: req.name,
            email: req.email,
            password_hash,
            activated: false,
        })
        .await?;

    state
        .store
        .grant_permissions(user.id, DEFAULT_USER_PERMISSIONS.iter().copied())
        .await?;

    let token = state
        .store
        .new_token(user.id, Scope::Activation.default_ttl(), Scope::Activation)
        .await?;

    state.send_email(
        user.email.clone(),
        EmailTemplate::Welcome {
            user_id: user.id,
            activation_token: token,
        },
    );

    security_log!("INFO", "user_registered", user_id = user.id);
    Ok((StatusCode::ACCEPTED, Json(ApiResponse::success(user))))
}

// ── PUT /v1/users/activated ──

#[derive(Debug, Deserialize, Validate)]
pub struct ActivateRequest {
    #[validate(custom(function = "validate_token"))]
    pub token: String,
}

pub async fn activate(
    State(state): State<AppState>,
    Json(req): Json<ActivateRequest>,
) -> ApiResult<User> {
    req.validate().map_err(validation_failed)?;

    let mut user = user_for_submitted_token(&state, Scope::Activation, &req.token).await?;
    user.activated = true;
    let user = state.store.update_user(&user).await?;

    state
        .store
        .delete_all_tokens_for_user(Scope::Activation, user.id)
        .await?;

    security_log!("INFO", "user_activated", user_id = user.id);
    Ok(Json(ApiResponse::success(user)))
}

// ── PUT /v1/users/password ──

#[derive(Debug, Deserialize, Validate)]
pub struct ResetPasswordRequest {
    #[validate(custom(function = "validate_password"))]
    pub password: String,
    #[validate(custom(function = "validate_token"))]
    pub token: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<()> {
    req.validate().map_err(validation_failed)?;

    let mut user = user_for_submitted_token(&state, Scope::PasswordReset, &req.token).await?;
    user.password_hash = hash_or_internal(&req.password)?;
    let user = state.store.update_user(&user).await?;

    state
        .store
        .delete_all_tokens_for_user(Scope::PasswordReset, user.id)
        .await?;

    security_log!("INFO", "password_reset", user_id = user.id);
    Ok(Json(ApiResponse::ok_with_message(
        "your password was successfully reset",
    )))
}

// ── GET /v1/users/me ──

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub permissions: Vec<String>,
}

pub async fn me(State(state): State<AppState>, current: CurrentUser) -> ApiResult<MeResponse> {
    let user = current.require_activated()?.clone();
    let permissions = state.store.permissions_for_user(user.id).await?;
    Ok(Json(ApiResponse::success(MeResponse {
        user,
        permissions: permissions.to_sorted_vec(),
    })))
}
