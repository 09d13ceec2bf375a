//! Authentication, authorization and request shaping
//!
//! - [`tokens`]: opaque bearer tokens, stored only as digests
//! - [`permissions`]: flat permission codes
//! - [`rate_limit`]: per-client token buckets
//! - [`middleware`]: identity resolution and route guards

mod extractor;
pub mod middleware;
pub mod permissions;
pub mod rate_limit;
pub mod tokens;

pub use extractor::CurrentUser;
pub use middleware::{
    authenticate, require_activated_user, require_authenticated_user, require_permission,
};
pub use permissions::Permissions;
pub use rate_limit::{RateLimiter, rate_limit_middleware};
pub use tokens::Scope;
