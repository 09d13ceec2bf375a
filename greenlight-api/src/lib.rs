//! Greenlight API server
//!
//! JSON API with opaque bearer-token authentication, permission-code
//! authorization, per-client rate limiting and supervised background work.
//!
//! # Module layout
//!
//! ```text
//! greenlight-api/src/
//! ├── config.rs      # environment configuration
//! ├── state.rs       # AppState shared by handlers
//! ├── error.rs       # StoreError → AppError mapping
//! ├── db/            # DataStore, PgStore, MemoryStore
//! ├── auth/          # tokens, permissions, rate limit, middleware
//! ├── email/         # Mailer trait, SES and log transports
//! ├── tasks.rs       # BackgroundRunner
//! ├── api/           # routes and handlers
//! └── server.rs      # startup and graceful shutdown
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod email;
pub mod error;
pub mod server;
pub mod state;
pub mod tasks;
pub mod util;

pub use config::Config;
pub use state::AppState;

// Security logging macro
#[macro_export]
macro_rules! security_log {
    ($level:expr, $event:expr, $($key:ident = $value:expr),*) => {
        tracing::info!(
            target: "security",
            level = $level,
            event = $event,
            $($key = $value),*
        );
    };
}
