//! Boundary mapping from service-layer errors to `AppError`
//!
//! Expected outcomes (not found, unknown permission code, duplicate email,
//! edit conflict) pass through with their own codes. Infrastructure faults are
//! logged here with full context and leave the process as a generic error.

use serde_json::Value;
use shared::error::{ApiResponse, AppError, ErrorCode};

use crate::db::StoreError;

/// Handler result carrying the unified response envelope
pub type ApiResult<T> = Result<axum::Json<ApiResponse<T>>, AppError>;

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => AppError::new(ErrorCode::NotFound),
            StoreError::InvalidCode(code) => {
                AppError::new(ErrorCode::PermissionCodeUnknown).with_detail("code", code)
            }
            StoreError::DuplicateEmail => AppError::new(ErrorCode::EmailAlreadyExists)
                .with_detail("email", "a user with this email address already exists"),
            StoreError::EditConflict => AppError::new(ErrorCode::EditConflict),
            StoreError::Timeout => {
                tracing::error!("Store call exceeded query timeout");
                AppError::new(ErrorCode::TimeoutError)
            }
            StoreError::Database(db_err) => {
                tracing::error!(error = %db_err, "Service database error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

/// Field-level validation failures as a 422 with one detail per field
pub fn validation_failed(errors: validator::ValidationErrors) -> AppError {
    let mut err = AppError::new(ErrorCode::ValidationFailed);
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));
    for (field, list) in fields {
        let reason = list
            .first()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string())
            })
            .unwrap_or_default();
        err = err.with_detail(field.to_string(), Value::String(reason));
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct Input {
        #[validate(email(message = "must be a valid email address"))]
        email: String,
        #[validate(length(min = 8))]
        password: String,
    }

    #[test]
    fn test_store_errors_map_to_codes() {
        let cases = [
            (StoreError::NotFound, ErrorCode::NotFound),
            (StoreError::InvalidCode("x".into()), ErrorCode::PermissionCodeUnknown),
            (StoreError::DuplicateEmail, ErrorCode::EmailAlreadyExists),
            (StoreError::EditConflict, ErrorCode::EditConflict),
            (StoreError::Timeout, ErrorCode::TimeoutError),
            (StoreError::Database(sqlx::Error::PoolTimedOut), ErrorCode::DatabaseError),
        ];
        for (store_err, code) in cases {
            assert_eq!(AppError::from(store_err).code, code);
        }
    }

    #[test]
    fn test_database_error_does_not_leak_detail() {
        let err = AppError::from(StoreError::Database(sqlx::Error::PoolClosed));
        assert_eq!(err.message, ErrorCode::DatabaseError.message());
        assert!(err.details.is_none());
    }

    #[test]
    fn test_validation_details_per_field() {
        let input = Input {
            email: "not-an-email".into(),
            password: "short".into(),
        };
        let err = validation_failed(input.validate().unwrap_err());
        assert_eq!(err.code, ErrorCode::ValidationFailed);
        let details = err.details.unwrap();
        assert_eq!(details["email"], "must be a valid email address");
        assert_eq!(details["password"], "length");
    }
}
