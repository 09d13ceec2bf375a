//! Permission grants

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use shared::error::{ApiResponse, AppError};
use validator::Validate;

use super::ApiResult;
use crate::auth::CurrentUser;
use crate::db::StoreError;
use crate::error::validation_failed;
use crate::security_log;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct GrantRequest {
    #[validate(length(min = 1, message = "must contain at least one permission code"))]
    pub codes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub user_id: i64,
    pub permissions: Vec<String>,
}

/// POST /v1/users/{id}/permissions
pub async fn grant(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    current: CurrentUser,
    Json(req): Json<GrantRequest>,
) -> ApiResult<GrantResponse> {
    req.validate().map_err(validation_failed)?;

    state.store.user_by_id(user_id).await.map_err(|e| match e {
        StoreError::NotFound => AppError::not_found("user"),
        other => other.into(),
    })?;

    state.store.grant_permissions(user_id, &req.codes).await?;

    let granted_by = current.user().map(|u| u.id).unwrap_or_default();
    security_log!(
        "INFO",
        "permissions_granted",
        user_id = user_id,
        granted_by = granted_by,
        codes = req.codes.join(",")
    );

    let permissions = state.store.permissions_for_user(user_id).await?;
    Ok(Json(ApiResponse::success(GrantResponse {
        user_id,
        permissions: permissions.to_sorted_vec(),
    })))
}
