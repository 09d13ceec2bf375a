//! Server configuration

use std::time::Duration;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Token-bucket limiter settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Tokens added per second
    pub rps: f64,
    /// Bucket capacity
    pub burst: u32,
    /// When false every request is admitted
    pub enabled: bool,
    /// How often idle buckets are swept
    pub sweep_interval: Duration,
    /// Buckets not seen for this long are dropped by the sweep
    pub idle_timeout: Duration,
    /// Key clients by the first X-Forwarded-For entry instead of the peer
    /// address. Only safe behind a proxy that overwrites the header.
    pub trust_proxy: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rps: 2.0,
            burst: 4,
            enabled: true,
            sweep_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(180),
            trust_proxy: false,
        }
    }
}

/// Which notification transport to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailerKind {
    /// AWS SES
    Ses,
    /// Log recipient and template only (development)
    Log,
}

/// Server configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | DATABASE_URL | (required) | PostgreSQL connection string |
/// | HTTP_PORT | 4000 | API port |
/// | ENVIRONMENT | development | development / staging / production |
/// | DB_MAX_CONNECTIONS | 25 | Pool size |
/// | DB_MAX_IDLE_TIME_SECS | 900 | Idle connection lifetime |
/// | QUERY_TIMEOUT_MS | 3000 | Upper bound for a single store call |
/// | REQUEST_TIMEOUT_SECS | 30 | Upper bound for a whole request (408 on expiry) |
/// | LIMITER_RPS | 2 | Rate limiter refill rate |
/// | LIMITER_BURST | 4 | Rate limiter bucket size |
/// | LIMITER_ENABLED | true | Rate limiter on/off |
/// | LIMITER_SWEEP_SECS | 60 | Idle bucket sweep interval |
/// | LIMITER_IDLE_SECS | 180 | Idle bucket retention |
/// | LIMITER_TRUST_PROXY | false | Key clients by X-Forwarded-For |
/// | CORS_TRUSTED_ORIGINS | (empty) | Space separated origins |
/// | MAILER | log (development) / ses | Notification transport |
/// | SES_FROM_EMAIL | Greenlight <no-reply@greenlight.local> | Sender address |
/// | LOG_JSON | false | JSON log output |
/// | METRICS_ENABLED | true | Serve /debug/vars to loopback callers |
/// | SHUTDOWN_WARN_SECS | 30 | Warning interval while draining background tasks |
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub http_port: u16,
    /// Environment: development | staging | production
    pub environment: String,
    pub db_max_connections: u32,
    pub db_max_idle_time: Duration,
    pub query_timeout: Duration,
    pub request_timeout: Duration,
    pub limiter: RateLimitConfig,
    pub cors_trusted_origins: Vec<String>,
    pub mailer: MailerKind,
    pub ses_from_email: String,
    pub log_json: bool,
    pub metrics_enabled: bool,
    /// Shutdown waits for every background task; this only paces the warnings
    pub shutdown_warn_interval: Duration,
}

impl Default for Config {
    /// Development defaults with no database URL
    fn default() -> Self {
        Self {
            database_url: String::new(),
            http_port: 4000,
            environment: "development".into(),
            db_max_connections: 25,
            db_max_idle_time: Duration::from_secs(900),
            query_timeout: Duration::from_millis(3000),
            request_timeout: Duration::from_secs(30),
            limiter: RateLimitConfig::default(),
            cors_trusted_origins: Vec::new(),
            mailer: MailerKind::Log,
            ses_from_email: "Greenlight <no-reply@greenlight.local>".into(),
            log_json: false,
            metrics_enabled: true,
            shutdown_warn_interval: Duration::from_secs(30),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        let environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let mailer = match std::env::var("MAILER").ok().as_deref() {
            Some("ses") => MailerKind::Ses,
            Some("log") => MailerKind::Log,
            Some(other) => return Err(format!("unknown MAILER value: {other}").into()),
            None if environment == "development" => MailerKind::Log,
            None => MailerKind::Ses,
        };

        let limiter_rps: f64 = env_or("LIMITER_RPS", 2.0);
        if !(limiter_rps > 0.0) {
            return Err("LIMITER_RPS must be positive".into());
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set")?,
            http_port: env_or("HTTP_PORT", 4000),
            environment,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 25),
            db_max_idle_time: Duration::from_secs(env_or("DB_MAX_IDLE_TIME_SECS", 900)),
            query_timeout: Duration::from_millis(env_or("QUERY_TIMEOUT_MS", 3000)),
            request_timeout: Duration::from_secs(env_or("REQUEST_TIMEOUT_SECS", 30)),
            limiter: RateLimitConfig {
                rps: limiter_rps,
                burst: env_or("LIMITER_BURST", 4),
                enabled: env_or("LIMITER_ENABLED", true),
                sweep_interval: Duration::from_secs(env_or("LIMITER_SWEEP_SECS", 60)),
                idle_timeout: Duration::from_secs(env_or("LIMITER_IDLE_SECS", 180)),
                trust_proxy: env_or("LIMITER_TRUST_PROXY", false),
            },
            cors_trusted_origins: std::env::var("CORS_TRUSTED_ORIGINS")
                .map(|v| v.split_whitespace().map(str::to_owned).collect())
                .unwrap_or_default(),
            mailer,
            ses_from_email: std::env::var("SES_FROM_EMAIL")
                .unwrap_or_else(|_| "Greenlight <no-reply@greenlight.local>".into()),
            log_json: env_or("LOG_JSON", false),
            metrics_enabled: env_or("METRICS_ENABLED", true),
            shutdown_warn_interval: Duration::from_secs(env_or::<u64>("SHUTDOWN_WARN_SECS", 30).max(1)),
        })
    }
}
