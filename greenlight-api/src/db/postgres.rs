//! PostgreSQL store

use async_trait::async_trait;
use sqlx::PgPool;

use super::{
    NewUser, PermissionStore, PoolStats, Store, StoreError, StoreResult, TokenStore, User,
    UserStore,
};
use crate::auth::permissions::Permissions;
use crate::auth::tokens::{Scope, StoredToken};

// email is CITEXT; cast so it decodes as TEXT
const USER_COLUMNS: &str = "users.id, users.created_at, users.name, users.email::TEXT AS email, \
                            users.password_hash, users.activated, users.version";

fn map_write_error(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::DuplicateEmail,
        other => map_missing_owner(other),
    }
}

fn map_missing_owner(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => StoreError::NotFound,
        other => other.into(),
    }
}

/// Store backed by a connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl Store for PgStore {
    fn pool_stats(&self) -> Option<PoolStats> {
        let pool = self.pool();
        Some(PoolStats {
            max_connections: pool.options().get_max_connections(),
            size: pool.size(),
            idle: pool.num_idle(),
        })
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn insert_user(&self, user: NewUser, now_ms: i64) -> StoreResult<User> {
        let sql = format!(
            "INSERT INTO users (created_at, name, email, password_hash, activated) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(now_ms)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .fetch_one(&self.pool)
            .await
            .map_err(map_write_error)
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE users.email = $1::citext");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn user_by_id(&self, id: i64) -> StoreResult<User> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE users.id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn update_user(&self, user: &User) -> StoreResult<User> {
        let sql = format!(
            "UPDATE users SET name = $1, email = $2, password_hash = $3, activated = $4, \
             version = version + 1 \
             WHERE id = $5 AND version = $6 RETURNING {USER_COLUMNS}"
        );
        sqlx::query_as::<_, User>(&sql)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.activated)
            .bind(user.id)
            .bind(user.version)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_write_error)?
            .ok_or(StoreError::EditConflict)
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn insert_token(&self, token: &StoredToken) -> StoreResult<()> {
        sqlx::query("INSERT INTO tokens (hash, user_id, expiry, scope) VALUES ($1, $2, $3, $4)")
            .bind(&token.hash)
            .bind(token.user_id)
            .bind(token.expiry)
            .bind(token.scope.as_str())
            .execute(&self.pool)
            .await
            .map_err(map_missing_owner)?;
        Ok(())
    }

    async fn user_for_token_hash(
        &self,
        scope: Scope,
        hash: &[u8],
        now_ms: i64,
    ) -> StoreResult<User> {
        let sql = format!(
            "SELECT {USER_COLUMNS} \
             FROM users INNER JOIN tokens ON users.id = tokens.user_id \
             WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3"
        );
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(hash)
            .bind(scope.as_str())
            .bind(now_ms)
            .fetch_one(&self.pool)
            .await?;
        Ok(user)
    }

    async fn delete_tokens_for_user(&self, scope: Scope, user_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM tokens WHERE scope = $1 AND user_id = $2")
            .bind(scope.as_str())
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl PermissionStore for PgStore {
    async fn permissions_for_user(&self, user_id: i64) -> StoreResult<Permissions> {
        let codes: Vec<String> = sqlx::query_scalar(
            "SELECT permissions.code FROM permissions \
             INNER JOIN users_permissions ON users_permissions.permission_id = permissions.id \
             WHERE users_permissions.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes.into_iter().collect())
    }

    async fn add_permissions_for_user(&self, user_id: i64, codes: &[String]) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;

        let known: Vec<String> =
            sqlx::query_scalar("SELECT code FROM permissions WHERE code = ANY($1)")
                .bind(codes)
                .fetch_all(&mut *tx)
                .await?;
        if let Some(unknown) = codes.iter().find(|c| !known.contains(c)) {
            // dropping tx rolls back
            return Err(StoreError::InvalidCode(unknown.clone()));
        }

        sqlx::query(
            "INSERT INTO users_permissions (user_id, permission_id) \
             SELECT $1, permissions.id FROM permissions WHERE permissions.code = ANY($2) \
             ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(codes)
        .execute(&mut *tx)
        .await
        .map_err(map_missing_owner)?;

        tx.commit().await?;
        Ok(())
    }
}
