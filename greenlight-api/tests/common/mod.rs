//! Shared harness: the full router over an in-memory store

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::extract::ConnectInfo;
use http::{HeaderMap, Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use greenlight_api::api::create_router;
use greenlight_api::auth::Scope;
use greenlight_api::config::{Config, RateLimitConfig};
use greenlight_api::db::{DataStore, MemoryStore, NewUser, User};
use greenlight_api::email::{EmailTemplate, MailError, Mailer};
use greenlight_api::state::AppState;
use greenlight_api::util::ManualClock;

pub const START_MS: i64 = 1_700_000_000_000;

/// Mailer that keeps every message it is asked to send
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, EmailTemplate)>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<(String, EmailTemplate)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, recipient: &str, template: &EmailTemplate) -> Result<(), MailError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), template.clone()));
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub router: Router,
    pub mailer: Arc<RecordingMailer>,
    pub clock: ManualClock,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `code` field of the response envelope
    pub fn code(&self) -> u64 {
        self.body["code"].as_u64().unwrap_or(u64::MAX)
    }
}

/// App with the rate limiter disabled
pub fn test_app() -> TestApp {
    test_app_with(Config {
        limiter: RateLimitConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    })
}

pub fn test_app_with(config: Config) -> TestApp {
    test_app_with_store(config, MemoryStore::new())
}

pub fn test_app_with_store(config: Config, backend: MemoryStore) -> TestApp {
    let clock = ManualClock::new(START_MS);
    let store = DataStore::new(Arc::new(backend), config.query_timeout)
        .with_clock(Arc::new(clock.clone()));
    let mailer = Arc::new(RecordingMailer::default());
    let state = AppState::new(config, store, mailer.clone());
    let router = create_router(state.clone());
    TestApp {
        state,
        router,
        mailer,
        clock,
    }
}

/// Attach the peer address the listener would have recorded
pub fn from_peer(mut request: Request<Body>, ip: [u8; 4]) -> Request<Body> {
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
    request
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    /// Insert a user directly, bypassing registration
    pub async fn create_user(&self, email: &str, activated: bool, permissions: &[&str]) -> User {
        let user = self
            .state
            .store
            .insert_user(NewUser {
                name: "Test User".into(),
                email: email.into(),
                password_hash: "$argon2id$unused".into(),
                activated,
            })
            .await
            .unwrap();
        self.state
            .store
            .grant_permissions(user.id, permissions.iter().copied())
            .await
            .unwrap();
        user
    }

    /// Authentication token for `user`, valid for 24h
    pub async fn login_token(&self, user: &User) -> String {
        self.state
            .store
            .new_token(
                user.id,
                Scope::Authentication.default_ttl(),
                Scope::Authentication,
            )
            .await
            .unwrap()
    }

    /// Drain the runner and return everything the mailer received
    pub async fn sent_emails(&self) -> Vec<(String, EmailTemplate)> {
        self.state.runner.wait().await;
        self.mailer.sent()
    }
}
