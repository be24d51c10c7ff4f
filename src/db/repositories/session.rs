//! Session repository
//!
//! Database operations for the session table. The table is the sole source
//! of truth for "is this session alive"; expiry policy (lazy reaping,
//! touch-to-renew) lives in the session service, this module only executes
//! the single-row and single-predicate statements it needs.

use crate::config::DatabaseDriver;
use crate::db::Db;
use crate::models::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Session repository trait
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session row
    async fn create(&self, session: &Session) -> Result<Session>;

    /// Get a session by ID (token), expired or not
    async fn get_by_id(&self, id: &str) -> Result<Option<Session>>;

    /// Push a session's expiry forward; returns whether a row was updated
    async fn update_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> Result<bool>;

    /// Delete a session row; returns whether a row existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// Delete all sessions for an account
    async fn delete_by_account(&self, account_id: i64) -> Result<u64>;

    /// Bulk-delete all rows with `expires_at` in the past
    async fn delete_expired(&self) -> Result<u64>;

    /// Count unexpired sessions for an account
    async fn count_valid_by_account(&self, account_id: i64) -> Result<i64>;
}

/// SQLx-based session repository supporting SQLite and MySQL
pub struct SqlxSessionRepository {
    pool: Db,
}

impl SqlxSessionRepository {
    /// Create a new SQLx session repository
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for dependency injection
    pub fn boxed(pool: Db) -> Arc<dyn SessionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn create(&self, session: &Session) -> Result<Session> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_session_sqlite(self.pool.as_sqlite().unwrap(), session).await
            }
            DatabaseDriver::Mysql => {
                create_session_mysql(self.pool.as_mysql().unwrap(), session).await
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Session>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_session_by_id_sqlite(self.pool.as_sqlite().unwrap(), id).await
            }
            DatabaseDriver::Mysql => {
                get_session_by_id_mysql(self.pool.as_mysql().unwrap(), id).await
            }
        }
    }

    async fn update_expiry(&self, id: &str, expires_at: DateTime<Utc>) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
                    .bind(expires_at)
                    .bind(id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to update session expiry")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("UPDATE sessions SET expires_at = ? WHERE id = ?")
                    .bind(expires_at)
                    .bind(id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to update session expiry")?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE id = ?")
                    .bind(id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to delete session")?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    async fn delete_by_account(&self, account_id: i64) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE account_id = ?")
                    .bind(account_id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to delete sessions by account")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE account_id = ?")
                    .bind(account_id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to delete sessions by account")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    async fn delete_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                    .bind(now)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to delete expired sessions")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
                    .bind(now)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to delete expired sessions")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    async fn count_valid_by_account(&self, account_id: i64) -> Result<i64> {
        let now = Utc::now();
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM sessions WHERE account_id = ? AND expires_at > ?",
                )
                .bind(account_id)
                .bind(now)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count sessions")?
            }
            DatabaseDriver::Mysql => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM sessions WHERE account_id = ? AND expires_at > ?",
                )
                .bind(account_id)
                .bind(now)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count sessions")?
            }
        };
        Ok(count)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_session_sqlite(pool: &SqlitePool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, account_id, account_label, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.account_id)
    .bind(&session.account_label)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_sqlite(pool: &SqlitePool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, account_id, account_label, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    Ok(row.map(|row| Session {
        id: row.get("id"),
        account_id: row.get("account_id"),
        account_label: row.get("account_label"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    }))
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_session_mysql(pool: &MySqlPool, session: &Session) -> Result<Session> {
    sqlx::query(
        r#"
        INSERT INTO sessions (id, account_id, account_label, expires_at, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&session.id)
    .bind(session.account_id)
    .bind(&session.account_label)
    .bind(session.expires_at)
    .bind(session.created_at)
    .execute(pool)
    .await
    .context("Failed to create session")?;

    Ok(session.clone())
}

async fn get_session_by_id_mysql(pool: &MySqlPool, id: &str) -> Result<Option<Session>> {
    let row = sqlx::query(
        r#"
        SELECT id, account_id, account_label, expires_at, created_at
        FROM sessions
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get session by ID")?;

    Ok(row.map(|row| {
        let expires_at: DateTime<Utc> = row.get("expires_at");
        let created_at: DateTime<Utc> = row.get("created_at");
        Session {
            id: row.get("id"),
            account_id: row.get("account_id"),
            account_label: row.get("account_label"),
            expires_at,
            created_at,
        }
    }))
}
