//! In-process store
//!
//! Mirrors the PostgreSQL semantics closely enough to drive the whole API in
//! tests and local development: case-insensitive unique emails, versioned
//! updates, all-or-nothing grants against a fixed code table.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

use super::{
    NewUser, PermissionStore, Store, StoreError, StoreResult, TokenStore, User, UserStore,
};
use crate::auth::permissions::{MOVIES_READ, MOVIES_WRITE, PERMISSIONS_WRITE, Permissions};
use crate::auth::tokens::{Scope, StoredToken, constant_time_eq};

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, User>,
    next_user_id: i64,
    tokens: HashMap<Vec<u8>, StoredToken>,
    codes: HashSet<String>,
    grants: HashSet<(i64, String)>,
}

/// Store held entirely in memory
pub struct MemoryStore {
    inner: Mutex<Inner>,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Empty store with the standard permission codes
    pub fn new() -> Self {
        Self::with_codes([MOVIES_READ, MOVIES_WRITE, PERMISSIONS_WRITE])
    }

    pub fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner: Mutex::new(Inner {
                next_user_id: 1,
                codes: codes.into_iter().map(Into::into).collect(),
                ..Default::default()
            }),
            latency: None,
        }
    }

    /// Delay every call, simulating a slow database
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn email_taken(inner: &Inner, email: &str, except_id: Option<i64>) -> bool {
    inner
        .users
        .values()
        .any(|u| Some(u.id) != except_id && u.email.eq_ignore_ascii_case(email))
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: NewUser, now_ms: i64) -> StoreResult<User> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        if email_taken(&inner, &user.email, None) {
            return Err(StoreError::DuplicateEmail);
        }

        let id = inner.next_user_id;
        inner.next_user_id += 1;
        let stored = User {
            id,
            created_at: now_ms,
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            activated: user.activated,
            version: 1,
        };
        inner.users.insert(id, stored.clone());
        Ok(stored)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<User> {
        self.simulate_latency().await;
        let inner = self.inner.lock().await;
        inner
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<User> {
        self.simulate_latency().await;
        let inner = self.inner.lock().await;
        inner.users.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        match inner.users.get(&user.id) {
            Some(current) if current.version == user.version => {}
            _ => return Err(StoreError::EditConflict),
        }
        if email_taken(&inner, &user.email, Some(user.id)) {
            return Err(StoreError::DuplicateEmail);
        }

        let mut stored = user.clone();
        stored.version += 1;
        inner.users.insert(user.id, stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert_token(&self, token: &StoredToken) -> StoreResult<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        if !inner.users.contains_key(&token.user_id) {
            return Err(StoreError::NotFound);
        }
        inner.tokens.insert(token.hash.clone(), token.clone());
        Ok(())
    }

    async fn user_for_token_hash(
        &self,
        scope: Scope,
        hash: &[u8],
        now_ms: i64,
    ) -> StoreResult<User> {
        self.simulate_latency().await;
        let inner = self.inner.lock().await;
        // full scan, every digest compared in constant time
        let mut found: Option<&StoredToken> = None;
        for token in inner.tokens.values() {
            let live = token.scope == scope && !token.is_expired(now_ms);
            if constant_time_eq(&token.hash, hash) & live {
                found = Some(token);
            }
        }
        let token = found.ok_or(StoreError::NotFound)?;
        inner
            .users
            .get(&token.user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn delete_tokens_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<u64> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|_, t| !(t.user_id == user_id && t.scope == scope));
        Ok((before - inner.tokens.len()) as u64)
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn permissions_for_user(&self, user_id: i64) -> StoreResult<Permissions> {
        self.simulate_latency().await;
        let inner = self.inner.lock().await;
        Ok(inner
            .grants
            .iter()
            .filter(|(uid, _)| *uid == user_id)
            .map(|(_, code)| code.clone())
            .collect())
    }

    async fn add_permissions_for_user(&self, user_id: i64, codes: &[String]) -> StoreResult<()> {
        self.simulate_latency().await;
        let mut inner = self.inner.lock().await;
        if let Some(unknown) = codes.iter().find(|c| !inner.codes.contains(c.as_str())) {
            return Err(StoreError::InvalidCode(unknown.clone()));
        }
        if !inner.users.contains_key(&user_id) {
            return Err(StoreError::NotFound);
        }
        for code in codes {
            inner.grants.insert((user_id, code.clone()));
        }
        Ok(())
    }
}

impl Store for MemoryStore {}
