//! Account repository
//!
//! Database operations for accounts. Each method dispatches on the pool
//! driver and runs the same parameterized SQL against SQLite or MySQL.

use crate::config::DatabaseDriver;
use crate::db::Db;
use crate::models::{Account, AccountKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

/// Account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account; returns the account with its assigned id
    async fn create(&self, account: &Account) -> Result<Account>;

    /// Get an account by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Account>>;

    /// Get an account by handle
    async fn get_by_handle(&self, handle: &str) -> Result<Option<Account>>;

    /// Update display name, avatar, and password hash
    async fn update(&self, account: &Account) -> Result<Account>;

    /// Delete an account row; returns whether a row existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// List all accounts of a given kind
    async fn list_by_kind(&self, kind: AccountKind) -> Result<Vec<Account>>;

    /// Count accounts
    async fn count(&self) -> Result<i64>;
}

/// SQLx-based account repository supporting SQLite and MySQL
pub struct SqlxAccountRepository {
    pool: Db,
}

impl SqlxAccountRepository {
    /// Create a new SQLx account repository
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for dependency injection
    pub fn boxed(pool: Db) -> Arc<dyn AccountRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str =
    "id, handle, password_hash, display_name, avatar, kind, created_at";

fn row_to_account_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let kind: String = row.get("kind");
    Ok(Account {
        id: row.get("id"),
        handle: row.get("handle"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        avatar: row.get("avatar"),
        kind: AccountKind::from_str(&kind)?,
        created_at: row.get("created_at"),
    })
}

fn row_to_account_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Account> {
    let kind: String = row.get("kind");
    let created_at: DateTime<Utc> = row.get("created_at");
    Ok(Account {
        id: row.get("id"),
        handle: row.get("handle"),
        password_hash: row.get("password_hash"),
        display_name: row.get("display_name"),
        avatar: row.get("avatar"),
        kind: AccountKind::from_str(&kind)?,
        created_at,
    })
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn create(&self, account: &Account) -> Result<Account> {
        let sql = r#"
            INSERT INTO accounts (handle, password_hash, display_name, avatar, kind, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;

        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&account.handle)
                .bind(&account.password_hash)
                .bind(&account.display_name)
                .bind(&account.avatar)
                .bind(account.kind.to_string())
                .bind(account.created_at)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to create account")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&account.handle)
                .bind(&account.password_hash)
                .bind(&account.display_name)
                .bind(&account.avatar)
                .bind(account.kind.to_string())
                .bind(account.created_at)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to create account")?
                .last_insert_id() as i64,
        };

        Ok(Account {
            id,
            ..account.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE id = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get account by ID")?;
                row.as_ref().map(row_to_account_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get account by ID")?;
                row.as_ref().map(row_to_account_mysql).transpose()
            }
        }
    }

    async fn get_by_handle(&self, handle: &str) -> Result<Option<Account>> {
        let sql = format!("SELECT {} FROM accounts WHERE handle = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(handle)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get account by handle")?;
                row.as_ref().map(row_to_account_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(handle)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get account by handle")?;
                row.as_ref().map(row_to_account_mysql).transpose()
            }
        }
    }

    async fn update(&self, account: &Account) -> Result<Account> {
        let sql = r#"
            UPDATE accounts
            SET display_name = ?, avatar = ?, password_hash = ?
            WHERE id = ?
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&account.display_name)
                    .bind(&account.avatar)
                    .bind(&account.password_hash)
                    .bind(account.id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to update account")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&account.display_name)
                    .bind(&account.avatar)
                    .bind(&account.password_hash)
                    .bind(account.id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to update account")?;
            }
        }
        Ok(account.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM accounts WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete account")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete account")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_kind(&self, kind: AccountKind) -> Result<Vec<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE kind = ? ORDER BY id",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(kind.to_string())
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list accounts by kind")?;
                rows.iter().map(row_to_account_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(kind.to_string())
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list accounts by kind")?;
                rows.iter().map(row_to_account_mysql).collect()
            }
        }
    }

    async fn count(&self) -> Result<i64> {
        let sql = "SELECT COUNT(*) FROM accounts";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to count accounts")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to count accounts")?,
        };
        Ok(count)
    }
}
