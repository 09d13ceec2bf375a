//! Server lifecycle
//!
//! Shutdown ordering:
//! 1. stop accepting connections
//! 2. let in-flight requests finish (axum graceful shutdown)
//! 3. wait for background tasks
//! 4. close the database pool
//!
//! Background tasks may still use the pool, so 3 must happen before 4.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aws_sdk_sesv2::Client as SesClient;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;

use crate::api;
use crate::config::{Config, MailerKind};
use crate::db::{DataStore, PgStore};
use crate::email::{LogMailer, Mailer, SesMailer};
use crate::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize tracing
pub fn init_logger(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "greenlight_api=info,tower_http=info".into());

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Open the pool and verify connectivity
pub async fn connect_pool(config: &Config) -> Result<PgPool, BoxError> {
    let options = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .idle_timeout(config.db_max_idle_time)
        .acquire_timeout(CONNECT_TIMEOUT);

    let pool = tokio::time::timeout(CONNECT_TIMEOUT, options.connect(&config.database_url))
        .await
        .map_err(|_| "timed out connecting to database")??;

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database connection pool established");
    Ok(pool)
}

async fn build_mailer(config: &Config) -> Arc<dyn Mailer> {
    match config.mailer {
        MailerKind::Ses => {
            let aws_config =
                aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let ses = if let Ok(ses_region) = std::env::var("SES_REGION") {
                let ses_config = aws_config
                    .to_builder()
                    .region(aws_config::Region::new(ses_region))
                    .build();
                SesClient::new(&ses_config)
            } else {
                SesClient::new(&aws_config)
            };
            Arc::new(SesMailer::new(ses, config.ses_from_email.clone()))
        }
        MailerKind::Log => Arc::new(LogMailer),
    }
}

/// Run the server until a shutdown signal arrives
pub async fn run(config: Config) -> Result<(), BoxError> {
    let pool = connect_pool(&config).await?;
    let store = DataStore::new(Arc::new(PgStore::new(pool.clone())), config.query_timeout);
    let mailer = build_mailer(&config).await;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = AppState::new(config, store, mailer);

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(
        env = %state.config.environment,
        "Greenlight API listening on {addr}"
    );

    serve(state, listener, shutdown_signal()).await?;

    pool.close().await;
    tracing::info!("Database connection pool closed");
    Ok(())
}

/// Serve until `shutdown` resolves, then drain background tasks
///
/// The pool is not touched here; callers close it after this returns.
pub async fn serve<F>(state: AppState, listener: TcpListener, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let sweeper = state.limiter.spawn_sweeper();
    let app = api::create_router(state.clone());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;
    tracing::info!("HTTP server stopped accepting requests");

    sweeper.abort();
    state.runner.drain(state.config.shutdown_warn_interval).await;
    tracing::info!("Background tasks drained");
    Ok(())
}

/// Graceful shutdown handler
///
/// Listens for SIGTERM and Ctrl+C signals
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
