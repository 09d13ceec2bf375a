//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            Self::NotFound => StatusCode::NOT_FOUND,

            Self::EditConflict | Self::EmailAlreadyExists => StatusCode::CONFLICT,

            Self::NotAuthenticated
            | Self::InvalidCredentials
            | Self::TokenInvalid
            | Self::CredentialMalformed => StatusCode::UNAUTHORIZED,

            Self::PermissionDenied | Self::AccountNotActivated => StatusCode::FORBIDDEN,

            Self::ValidationFailed
            | Self::PermissionCodeUnknown
            | Self::AccountAlreadyActivated => StatusCode::UNPROCESSABLE_ENTITY,

            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,

            // Transient, client can retry
            Self::TimeoutError => StatusCode::SERVICE_UNAVAILABLE,

            Self::InternalError | Self::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether a response for this code must carry `WWW-Authenticate: Bearer`
    pub fn wants_bearer_challenge(&self) -> bool {
        matches!(self, Self::TokenInvalid | Self::CredentialMalformed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_status() {
        assert_eq!(
            ErrorCode::NotAuthenticated.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::TokenInvalid.http_status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::CredentialMalformed.http_status(),
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_forbidden_is_distinct_from_unauthorized() {
        assert_eq!(
            ErrorCode::PermissionDenied.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::AccountNotActivated.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_ne!(
            ErrorCode::PermissionDenied.http_status(),
            ErrorCode::TokenInvalid.http_status()
        );
    }

    #[test]
    fn test_rate_limited_status() {
        assert_eq!(
            ErrorCode::TooManyRequests.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_system_status() {
        assert_eq!(
            ErrorCode::DatabaseError.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ErrorCode::TimeoutError.http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_bearer_challenge() {
        assert!(ErrorCode::TokenInvalid.wants_bearer_challenge());
        assert!(ErrorCode::CredentialMalformed.wants_bearer_challenge());
        assert!(!ErrorCode::NotAuthenticated.wants_bearer_challenge());
        assert!(!ErrorCode::PermissionDenied.wants_bearer_challenge());
    }
}
