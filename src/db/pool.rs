//! Database connection pool
//!
//! A thin enum over the SQLite and MySQL sqlx pools. Repositories match on
//! the variant to pick the backend-specific query path; everything else in
//! the application only sees [`Db`].

use anyhow::{Context, Result};
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions},
    sqlite::{SqlitePool, SqlitePoolOptions},
};
use std::sync::Arc;

use crate::config::{DatabaseConfig, DatabaseDriver};

/// Shared handle to the database pool
pub type Db = Arc<DbPool>;

/// Connection pool for the configured database backend
pub enum DbPool {
    Sqlite(SqlitePool),
    Mysql(MySqlPool),
}

impl DbPool {
    /// The driver backing this pool
    pub fn driver(&self) -> DatabaseDriver {
        match self {
            DbPool::Sqlite(_) => DatabaseDriver::Sqlite,
            DbPool::Mysql(_) => DatabaseDriver::Mysql,
        }
    }

    /// The underlying SQLite pool, if any
    pub fn as_sqlite(&self) -> Option<&SqlitePool> {
        match self {
            DbPool::Sqlite(pool) => Some(pool),
            DbPool::Mysql(_) => None,
        }
    }

    /// The underlying MySQL pool, if any
    pub fn as_mysql(&self) -> Option<&MySqlPool> {
        match self {
            DbPool::Sqlite(_) => None,
            DbPool::Mysql(pool) => Some(pool),
        }
    }

    /// Execute a raw SQL statement that doesn't return rows
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let affected = match self {
            DbPool::Sqlite(pool) => sqlx::query(sql)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to execute statement: {}", sql))?
                .rows_affected(),
            DbPool::Mysql(pool) => sqlx::query(sql)
                .execute(pool)
                .await
                .with_context(|| format!("Failed to execute statement: {}", sql))?
                .rows_affected(),
        };
        Ok(affected)
    }

    /// Check that the connection is healthy
    pub async fn ping(&self) -> Result<()> {
        match self {
            DbPool::Sqlite(pool) => {
                sqlx::query("SELECT 1").fetch_one(pool).await?;
            }
            DbPool::Mysql(pool) => {
                sqlx::query("SELECT 1").fetch_one(pool).await?;
            }
        }
        Ok(())
    }

    /// Close the pool
    pub async fn close(&self) {
        match self {
            DbPool::Sqlite(pool) => pool.close().await,
            DbPool::Mysql(pool) => pool.close().await,
        }
    }
}

/// Create a database connection pool based on configuration.
pub async fn create_pool(config: &DatabaseConfig) -> Result<Db> {
    let pool = match config.driver {
        DatabaseDriver::Sqlite => DbPool::Sqlite(connect_sqlite(&config.url).await?),
        DatabaseDriver::Mysql => DbPool::Mysql(connect_mysql(&config.url).await?),
    };
    Ok(Arc::new(pool))
}

async fn connect_sqlite(url: &str) -> Result<SqlitePool> {
    // Ensure the database directory exists for file-based SQLite
    if !url.starts_with(":memory:") && !url.starts_with("sqlite::memory:") {
        let path = url.trim_start_matches("sqlite:");
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory: {:?}", parent)
                })?;
            }
        }
    }

    let connection_url = if url == ":memory:" {
        "sqlite::memory:".to_string()
    } else if url.starts_with("sqlite:") {
        if url.contains('?') {
            url.to_string()
        } else {
            format!("{}?mode=rwc", url)
        }
    } else {
        format!("sqlite:{}?mode=rwc", url)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(20)
        .connect(&connection_url)
        .await
        .with_context(|| format!("Failed to connect to SQLite database: {}", url))?;

    // Cascading deletes rely on foreign keys being enforced
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .context("Failed to enable foreign keys")?;

    Ok(pool)
}

async fn connect_mysql(url: &str) -> Result<MySqlPool> {
    let connection_url = if url.starts_with("mysql://") {
        url.to_string()
    } else {
        format!("mysql://{}", url)
    };

    MySqlPoolOptions::new()
        .max_connections(30)
        .connect(&connection_url)
        .await
        .with_context(|| format!("Failed to connect to MySQL database: {}", url))
}

/// Create a SQLite in-memory database pool for testing.
///
/// Capped at one connection: every pooled connection to `sqlite::memory:`
/// would otherwise get its own empty database.
pub async fn create_test_pool() -> Result<Db> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to create in-memory database")?;

    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await
        .context("Failed to enable foreign keys")?;

    Ok(Arc::new(DbPool::Sqlite(pool)))
}
