//! Database access layer
//!
//! ```text
//!            ┌──────────────┐
//!            │  DataStore   │  hashing, expiry, timeouts
//!            └──────┬───────┘
//!                   │ Arc<dyn Store>
//!          ┌────────┴────────┐
//!          ▼                 ▼
//!       PgStore          MemoryStore
//!     (PostgreSQL)     (tests, local dev)
//! ```
//!
//! The backends only move rows. Token digests, the clock and the per-call
//! timeout are handled once in [`DataStore`].

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::auth::permissions::Permissions;
use crate::auth::tokens::{self, Scope, StoredToken};
use crate::util::{Clock, SystemClock};

/// Storage layer error
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unknown permission code: {0}")]
    InvalidCode(String),

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("edit conflict")]
    EditConflict,

    #[error("store call timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Database(other),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A registered account
#[derive(Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    /// Unix millis
    pub created_at: i64,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub activated: bool,
    pub version: i32,
}

impl fmt::Debug for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("activated", &self.activated)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// Fields supplied at registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub activated: bool,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert_user(&self, user: NewUser, now_ms: i64) -> StoreResult<User>;

    /// Case-insensitive lookup
    async fn user_by_email(&self, email: &str) -> StoreResult<User>;

    async fn user_by_id(&self, id: i64) -> StoreResult<User>;

    /// Write `user` if its version is still current; returns the stored row
    async fn update_user(&self, user: &User) -> StoreResult<User>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &StoredToken) -> StoreResult<()>;

    /// Owner of an unexpired token with this digest and scope. An unknown
    /// digest, a wrong scope and an expired token all return `NotFound`.
    async fn user_for_token_hash(
        &self,
        scope: Scope,
        hash: &[u8],
        now_ms: i64,
    ) -> StoreResult<User>;

    /// Returns the number of tokens removed
    async fn delete_tokens_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<u64>;
}

#[async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for_user(&self, user_id: i64) -> StoreResult<Permissions>;

    /// Grant every code in `codes` or none of them. `codes` is deduplicated
    /// and non-empty.
    async fn add_permissions_for_user(&self, user_id: i64, codes: &[String]) -> StoreResult<()>;
}

/// Connection pool gauges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max_connections: u32,
    /// Open connections, idle or in use
    pub size: u32,
    pub idle: usize,
}

/// A complete storage backend
pub trait Store: UserStore + TokenStore + PermissionStore {
    /// `None` for backends without a connection pool
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Model layer shared by every request
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    query_timeout: Duration,
}

impl DataStore {
    pub fn new(inner: Arc<dyn Store>, query_timeout: Duration) -> Self {
        Self {
            inner,
            clock: Arc::new(SystemClock),
            query_timeout,
        }
    }

    /// Replace the wall clock (tests use [`crate::util::ManualClock`])
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.inner.pool_stats()
    }

    async fn bounded<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = self.query_timeout.as_millis() as u64, "Store call timed out");
                Err(StoreError::Timeout)
            }
        }
    }

    // ========== Permissions ==========

    /// Every code granted to `user_id`; empty when there are none
    pub async fn permissions_for_user(&self, user_id: i64) -> StoreResult<Permissions> {
        self.bounded(self.inner.permissions_for_user(user_id)).await
    }

    /// Grant codes to a user, skipping ones already held
    pub async fn grant_permissions<I, S>(&self, user_id: i64, codes: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut codes: Vec<String> = codes.into_iter().map(|c| c.as_ref().to_owned()).collect();
        codes.sort();
        codes.dedup();
        if codes.is_empty() {
            return Ok(());
        }
        self.bounded(self.inner.add_permissions_for_user(user_id, &codes))
            .await
    }

    // ========== Tokens ==========

    /// Issue and persist a token; the plaintext is returned exactly once
    pub async fn new_token(&self, user_id: i64, ttl: Duration, scope: Scope) -> StoreResult<String> {
        let (plaintext, token) = tokens::generate_token(user_id, ttl, scope, self.now_millis());
        self.bounded(self.inner.insert_token(&token)).await?;
        Ok(plaintext)
    }

    /// Resolve the owner of an unexpired token of `scope`
    ///
    /// The plaintext never reaches the backend. Lookups match on the
    /// fixed-length SHA-256 digest, with scope and expiry checked in the same
    /// lookup, so a wrong token and an expired one fail the same way.
    pub async fn user_for_token(&self, scope: Scope, plaintext: &str) -> StoreResult<User> {
        let hash = tokens::hash_token(plaintext);
        self.bounded(
            self.inner
                .user_for_token_hash(scope, &hash, self.now_millis()),
        )
        .await
    }

    /// Remove every token of `scope` held by `user_id`
    pub async fn delete_all_tokens_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<()> {
        let removed = self
            .bounded(self.inner.delete_tokens_for_user(scope, user_id))
            .await?;
        tracing::debug!(user_id, scope = %scope, removed, "Tokens deleted");
        Ok(())
    }

    // ========== Users ==========

    pub async fn insert_user(&self, user: NewUser) -> StoreResult<User> {
        self.bounded(self.inner.insert_user(user, self.now_millis()))
            .await
    }

    pub async fn user_by_email(&self, email: &str) -> StoreResult<User> {
        self.bounded(self.inner.user_by_email(email)).await
    }

    pub async fn user_by_id(&self, id: i64) -> StoreResult<User> {
        self.bounded(self.inner.user_by_id(id)).await
    }

    pub async fn update_user(&self, user: &User) -> StoreResult<User> {
        self.bounded(self.inner.update_user(user)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ManualClock;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store() -> (DataStore, ManualClock) {
        let clock = ManualClock::new(1_700_000_000_000);
        let store = DataStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(3))
            .with_clock(Arc::new(clock.clone()));
        (store, clock)
    }

    async fn register(store: &DataStore, email: &str) -> User {
        store
            .insert_user(NewUser {
                name: "Alice".into(),
                email: email.into(),
                password_hash: "$argon2id$placeholder".into(),
                activated: true,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_token_resolves_until_expiry() {
        let (store, clock) = store();
        let user = register(&store, "alice@example.com").await;

        let plaintext = store
            .new_token(user.id, HOUR, Scope::Authentication)
            .await
            .unwrap();
        let found = store
            .user_for_token(Scope::Authentication, &plaintext)
            .await
            .unwrap();
        assert_eq!(found.id, user.id);

        clock.advance(HOUR);
        assert!(matches!(
            store.user_for_token(Scope::Authentication, &plaintext).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_token_lookup_filters_scope() {
        let (store, _) = store();
        let user = register(&store, "alice@example.com").await;
        let plaintext = store
            .new_token(user.id, HOUR, Scope::Activation)
            .await
            .unwrap();

        assert!(matches!(
            store.user_for_token(Scope::Authentication, &plaintext).await,
            Err(StoreError::NotFound)
        ));
        assert!(store
            .user_for_token(Scope::Activation, &plaintext)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_near_miss_token_is_not_found() {
        let (store, _) = store();
        let user = register(&store, "alice@example.com").await;
        let plaintext = store
            .new_token(user.id, HOUR, Scope::Authentication)
            .await
            .unwrap();

        let mut altered = plaintext.clone().into_bytes();
        let last = altered.len() - 1;
        altered[last] = if altered[last] == b'A' { b'B' } else { b'A' };
        let altered = String::from_utf8(altered).unwrap();

        assert!(matches!(
            store.user_for_token(Scope::Authentication, &altered).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let (store, _) = store();
        let bogus = "A".repeat(tokens::TOKEN_LEN);
        assert!(matches!(
            store.user_for_token(Scope::Authentication, &bogus).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_delete_all_only_touches_scope_and_user() {
        let (store, _) = store();
        let alice = register(&store, "alice@example.com").await;
        let bob = register(&store, "bob@example.com").await;

        let a_reset_1 = store.new_token(alice.id, HOUR, Scope::PasswordReset).await.unwrap();
        let a_reset_2 = store.new_token(alice.id, HOUR, Scope::PasswordReset).await.unwrap();
        let a_auth = store.new_token(alice.id, HOUR, Scope::Authentication).await.unwrap();
        let b_reset = store.new_token(bob.id, HOUR, Scope::PasswordReset).await.unwrap();

        store
            .delete_all_tokens_for_user(Scope::PasswordReset, alice.id)
            .await
            .unwrap();

        for t in [&a_reset_1, &a_reset_2] {
            assert!(store.user_for_token(Scope::PasswordReset, t).await.is_err());
        }
        assert_eq!(
            store.user_for_token(Scope::Authentication, &a_auth).await.unwrap().id,
            alice.id
        );
        assert_eq!(
            store.user_for_token(Scope::PasswordReset, &b_reset).await.unwrap().id,
            bob.id
        );
    }

    #[tokio::test]
    async fn test_grant_is_idempotent() {
        let (store, _) = store();
        let user = register(&store, "alice@example.com").await;

        store.grant_permissions(user.id, ["movies:read"]).await.unwrap();
        store
            .grant_permissions(user.id, ["movies:read", "movies:read", "movies:write"])
            .await
            .unwrap();

        let perms = store.permissions_for_user(user.id).await.unwrap();
        assert_eq!(perms.to_sorted_vec(), vec!["movies:read", "movies:write"]);
    }

    #[tokio::test]
    async fn test_grant_unknown_code_adds_nothing() {
        let (store, _) = store();
        let user = register(&store, "alice@example.com").await;

        let err = store
            .grant_permissions(user.id, ["movies:write", "movies:delete"])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidCode(ref c) if c == "movies:delete"));
        assert!(store.permissions_for_user(user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_permissions_empty_without_grants() {
        let (store, _) = store();
        let user = register(&store, "alice@example.com").await;
        let perms = store.permissions_for_user(user.id).await.unwrap();
        assert!(perms.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let (store, _) = store();
        register(&store, "alice@example.com").await;
        let err = store
            .insert_user(NewUser {
                name: "Other".into(),
                email: "ALICE@example.com".into(),
                password_hash: "x".into(),
                activated: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail));
    }

    #[tokio::test]
    async fn test_update_user_checks_version() {
        let (store, _) = store();
        let user = register(&store, "alice@example.com").await;

        let mut first = user.clone();
        first.name = "Alice B".into();
        let updated = store.update_user(&first).await.unwrap();
        assert_eq!(updated.version, user.version + 1);

        let mut stale = user.clone();
        stale.name = "Stale".into();
        assert!(matches!(
            store.update_user(&stale).await,
            Err(StoreError::EditConflict)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_backend_times_out() {
        let backend = MemoryStore::new().with_latency(Duration::from_secs(10));
        let store = DataStore::new(Arc::new(backend), Duration::from_secs(3));
        assert!(matches!(
            store.permissions_for_user(1).await,
            Err(StoreError::Timeout)
        ));
    }
}
