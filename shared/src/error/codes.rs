//! Unified error codes
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 3xxx: Account errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Concurrent modification detected
    EditConflict = 7,
    /// Client exceeded its request rate
    TooManyRequests = 8,

    // ==================== 1xxx: Auth ====================
    /// Request is anonymous but the route requires a user
    NotAuthenticated = 1001,
    /// Invalid credentials (email/password)
    InvalidCredentials = 1002,
    /// Bearer token is unknown, expired or has the wrong scope
    TokenInvalid = 1004,
    /// Authorization header is present but unparsable
    CredentialMalformed = 1005,
    /// Account exists but has not been activated
    AccountNotActivated = 1006,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Permission code does not exist
    PermissionCodeUnknown = 2002,

    // ==================== 3xxx: Account ====================
    /// Email address is already registered
    EmailAlreadyExists = 3001,
    /// Account is already activated
    AccountAlreadyActivated = 3003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Storage operation timed out
    TimeoutError = 9003,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, ErrorCode::Success)
    }

    /// Get the developer-facing English message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::Success => "Operation completed successfully",
            ErrorCode::ValidationFailed => "Validation failed",
            ErrorCode::NotFound => "Resource not found",
            ErrorCode::EditConflict => {
                "Unable to update the record due to an edit conflict, please try again"
            }
            ErrorCode::TooManyRequests => "Rate limit exceeded",

            // Auth
            ErrorCode::NotAuthenticated => "You must be authenticated to access this resource",
            ErrorCode::InvalidCredentials => "Invalid authentication credentials",
            ErrorCode::TokenInvalid => "Invalid or missing authentication token",
            ErrorCode::CredentialMalformed => "Malformed authorization header",
            ErrorCode::AccountNotActivated => {
                "Your user account must be activated to access this resource"
            }

            // Permission
            ErrorCode::PermissionDenied => {
                "Your user account doesn't have the necessary permissions to access this resource"
            }
            ErrorCode::PermissionCodeUnknown => "Permission code does not exist",

            // Account
            ErrorCode::EmailAlreadyExists => "A user with this email address already exists",
            ErrorCode::AccountAlreadyActivated => "User has already been activated",

            // System
            ErrorCode::InternalError => {
                "The server encountered a problem and could not process your request"
            }
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::TimeoutError => "The server timed out while processing your request",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error returned when a u16 does not map to a known [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            0 => Ok(ErrorCode::Success),
            2 => Ok(ErrorCode::ValidationFailed),
            3 => Ok(ErrorCode::NotFound),
            7 => Ok(ErrorCode::EditConflict),
            8 => Ok(ErrorCode::TooManyRequests),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1002 => Ok(ErrorCode::InvalidCredentials),
            1004 => Ok(ErrorCode::TokenInvalid),
            1005 => Ok(ErrorCode::CredentialMalformed),
            1006 => Ok(ErrorCode::AccountNotActivated),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::PermissionCodeUnknown),

            // Account
            3001 => Ok(ErrorCode::EmailAlreadyExists),
            3003 => Ok(ErrorCode::AccountAlreadyActivated),

            // System
            9001 => Ok(ErrorCode::InternalError),
            9002 => Ok(ErrorCode::DatabaseError),
            9003 => Ok(ErrorCode::TimeoutError),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
