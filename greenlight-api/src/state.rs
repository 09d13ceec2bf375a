//! Application state shared by every handler and middleware

use std::sync::Arc;

use crate::auth::RateLimiter;
use crate::config::Config;
use crate::db::DataStore;
use crate::email::Mailer;
use crate::tasks::BackgroundRunner;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Users, tokens and permissions
    pub store: DataStore,
    /// Global per-client rate limiter
    pub limiter: RateLimiter,
    /// Fire-and-forget work, drained at shutdown
    pub runner: BackgroundRunner,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(config: Config, store: DataStore, mailer: Arc<dyn Mailer>) -> Self {
        let limiter = RateLimiter::new(config.limiter.clone());
        Self {
            config: Arc::new(config),
            store,
            limiter,
            runner: BackgroundRunner::new(),
            mailer,
        }
    }

    /// Send `template` to `recipient` in the background
    pub fn send_email(&self, recipient: String, template: crate::email::EmailTemplate) {
        let mailer = self.mailer.clone();
        self.runner.run(template.name(), async move {
            mailer.send(&recipient, &template).await
        });
    }
}
