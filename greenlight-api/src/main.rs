//! greenlight-api: JSON API server

use greenlight_api::{Config, server};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    server::init_logger(config.log_json);

    tracing::info!(
        "Starting greenlight-api {} (env: {})",
        env!("CARGO_PKG_VERSION"),
        config.environment
    );

    server::run(config).await
}
