//! Request identity

use axum::{extract::FromRequestParts, http::request::Parts};
use shared::error::{AppError, ErrorCode};

use crate::db::User;

/// Identity attached to every request by [`authenticate`](super::authenticate)
#[derive(Debug, Clone)]
pub enum CurrentUser {
    /// No `Authorization` header was sent
    Anonymous,
    Authenticated(User),
}

impl CurrentUser {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, CurrentUser::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            CurrentUser::Anonymous => None,
            CurrentUser::Authenticated(user) => Some(user),
        }
    }

    /// The authenticated user, or 401 for anonymous requests
    pub fn require_user(&self) -> Result<&User, AppError> {
        self.user().ok_or_else(AppError::not_authenticated)
    }

    /// The authenticated and activated user
    pub fn require_activated(&self) -> Result<&User, AppError> {
        let user = self.require_user()?;
        if !user.activated {
            return Err(AppError::new(ErrorCode::AccountNotActivated));
        }
        Ok(user)
    }
}

/// Read the identity placed by the authenticate middleware
///
/// Requests that never went through the middleware are anonymous.
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or(CurrentUser::Anonymous))
    }
}
