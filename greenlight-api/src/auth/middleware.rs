//! Authentication and authorization middleware
//!
//! [`authenticate`] runs on every request and attaches a [`CurrentUser`]; the
//! `require_*` guards are layered onto individual routes.
//!
//! | Situation | Result |
//! |-----------|--------|
//! | No `Authorization` header | anonymous, request continues |
//! | Header is not `Bearer <token>` | 401 CredentialMalformed |
//! | Unknown / expired / wrong-scope token | 401 TokenInvalid |
//! | Anonymous at a guarded route | 401 NotAuthenticated |
//! | Account not activated | 403 AccountNotActivated |
//! | Missing permission code | 403 PermissionDenied |

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use http::{HeaderValue, header};
use shared::error::AppError;
use std::future::Future;
use std::pin::Pin;

use super::CurrentUser;
use super::tokens::{self, Scope};
use crate::db::StoreError;
use crate::security_log;
use crate::state::AppState;

/// Token from `Authorization: Bearer <token>`, if well formed
fn bearer_token(value: &HeaderValue) -> Option<String> {
    let value = value.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?;
    tokens::is_well_formed(token).then(|| token.to_owned())
}

/// Resolve the bearer token into a [`CurrentUser`]
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let credential = req.headers().get(header::AUTHORIZATION).map(bearer_token);

    let identity = match credential {
        None => CurrentUser::Anonymous,
        Some(None) => {
            security_log!("WARN", "auth_malformed", uri = req.uri().path());
            return Err(AppError::malformed_credential());
        }
        Some(Some(token)) => match state.store.user_for_token(Scope::Authentication, &token).await {
            Ok(user) => CurrentUser::Authenticated(user),
            Err(StoreError::NotFound) => {
                security_log!("WARN", "auth_failed", uri = req.uri().path());
                return Err(AppError::invalid_token());
            }
            Err(e) => return Err(e.into()),
        },
    };

    req.extensions_mut().insert(identity);
    let mut response = next.run(req).await;
    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    Ok(response)
}

fn current_user(req: &Request) -> CurrentUser {
    req.extensions()
        .get::<CurrentUser>()
        .cloned()
        .unwrap_or(CurrentUser::Anonymous)
}

/// Reject anonymous requests
pub async fn require_authenticated_user(req: Request, next: Next) -> Result<Response, AppError> {
    current_user(&req).require_user()?;
    Ok(next.run(req).await)
}

/// Reject anonymous requests and accounts that are not yet activated
pub async fn require_activated_user(req: Request, next: Next) -> Result<Response, AppError> {
    let current = current_user(&req);
    if let Err(e) = current.require_activated() {
        if let Some(user) = current.user() {
            security_log!("WARN", "inactive_account", user_id = user.id);
        }
        return Err(e);
    }
    Ok(next.run(req).await)
}

/// Require an activated user holding `code`
///
/// Permissions are re-read from the store on every check.
///
/// ```ignore
/// Router::new()
///     .route("/v1/users/{id}/permissions", post(grant))
///     .layer(middleware::from_fn_with_state(state.clone(), require_permission(PERMISSIONS_WRITE)));
/// ```
pub fn require_permission(
    code: &'static str,
) -> impl Fn(
    State<AppState>,
    Request,
    Next,
) -> Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>
+ Clone {
    move |State(state): State<AppState>, req: Request, next: Next| {
        Box::pin(async move {
            let user = current_user(&req).require_activated()?.clone();

            let permissions = state.store.permissions_for_user(user.id).await?;
            if !permissions.include(code) {
                security_log!(
                    "WARN",
                    "permission_denied",
                    user_id = user.id,
                    required_permission = code
                );
                return Err(AppError::permission_denied()
                    .with_detail("required_permission", code));
            }

            Ok(next.run(req).await)
        })
    }
}
