//! Collection repository
//!
//! Database operations for collections, the ownership join table, and the
//! temporal (session-scoped) predicates the cleanup pipelines run on.

use crate::config::DatabaseDriver;
use crate::db::repositories::placeholders;
use crate::db::Db;
use crate::models::{Collection, CollectionKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

/// Collection repository trait
#[async_trait]
pub trait CollectionRepository: Send + Sync {
    /// Insert a new collection; returns the collection with its assigned id
    async fn create(&self, collection: &Collection) -> Result<Collection>;

    /// Get a collection by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Collection>>;

    /// Update name, description, and kind
    async fn update(&self, collection: &Collection) -> Result<Collection>;

    /// Delete a collection row; returns whether a row existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Bulk-delete collections by id
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64>;

    /// Grant co-ownership (no-op if the row already exists)
    async fn add_owner(&self, collection_id: i64, account_id: i64) -> Result<bool>;

    /// Revoke one ownership row
    async fn remove_owner(&self, collection_id: i64, account_id: i64) -> Result<bool>;

    /// Drop all ownership rows for the given collections
    async fn remove_owners_for_collections(&self, ids: &[i64]) -> Result<u64>;

    /// Account ids owning a collection
    async fn owner_ids(&self, collection_id: i64) -> Result<Vec<i64>>;

    /// Whether the account owns the collection
    async fn is_owner(&self, collection_id: i64, account_id: i64) -> Result<bool>;

    /// All collections owned by an account
    async fn list_by_owner(&self, account_id: i64) -> Result<Vec<Collection>>;

    /// Temporary collections tied to a session
    async fn list_temporary_by_session(&self, session_id: &str) -> Result<Vec<Collection>>;

    /// Temporary collections whose expiry has passed
    async fn list_expired_temporary(&self, now: DateTime<Utc>) -> Result<Vec<Collection>>;

    /// Clear the temporal fields; returns whether a row changed
    async fn make_permanent(&self, id: i64) -> Result<bool>;

    /// Bulk-update expiry of all temporary collections tied to a session
    async fn extend_temporary_by_session(
        &self,
        session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<u64>;

    /// Re-bind temporary collections to a fresh session with a new expiry
    async fn transfer_temporary(
        &self,
        old_session_id: &str,
        new_session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<u64>;
}

/// SQLx-based collection repository supporting SQLite and MySQL
pub struct SqlxCollectionRepository {
    pool: Db,
}

impl SqlxCollectionRepository {
    /// Create a new SQLx collection repository
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for dependency injection
    pub fn boxed(pool: Db) -> Arc<dyn CollectionRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str =
    "id, name, description, kind, is_temporary, session_id, expires_at, created_at";

fn row_to_collection_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<Collection> {
    let kind: String = row.get("kind");
    Ok(Collection {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        kind: CollectionKind::from_str(&kind)?,
        is_temporary: row.get("is_temporary"),
        session_id: row.get("session_id"),
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

fn row_to_collection_mysql(row: &sqlx::mysql::MySqlRow) -> Result<Collection> {
    let kind: String = row.get("kind");
    let expires_at: Option<DateTime<Utc>> = row.get("expires_at");
    let created_at: DateTime<Utc> = row.get("created_at");
    Ok(Collection {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        kind: CollectionKind::from_str(&kind)?,
        is_temporary: row.get("is_temporary"),
        session_id: row.get("session_id"),
        expires_at,
        created_at,
    })
}

#[async_trait]
impl CollectionRepository for SqlxCollectionRepository {
    async fn create(&self, collection: &Collection) -> Result<Collection> {
        let sql = r#"
            INSERT INTO collections (name, description, kind, is_temporary, session_id, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&collection.name)
                .bind(&collection.description)
                .bind(collection.kind.to_string())
                .bind(collection.is_temporary)
                .bind(&collection.session_id)
                .bind(collection.expires_at)
                .bind(collection.created_at)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to create collection")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&collection.name)
                .bind(&collection.description)
                .bind(collection.kind.to_string())
                .bind(collection.is_temporary)
                .bind(&collection.session_id)
                .bind(collection.expires_at)
                .bind(collection.created_at)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to create collection")?
                .last_insert_id() as i64,
        };

        Ok(Collection {
            id,
            ..collection.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Collection>> {
        let sql = format!("SELECT {} FROM collections WHERE id = ?", SELECT_COLUMNS);
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get collection by ID")?;
                row.as_ref().map(row_to_collection_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(id)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get collection by ID")?;
                row.as_ref().map(row_to_collection_mysql).transpose()
            }
        }
    }

    async fn update(&self, collection: &Collection) -> Result<Collection> {
        let sql = "UPDATE collections SET name = ?, description = ?, kind = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&collection.name)
                    .bind(&collection.description)
                    .bind(collection.kind.to_string())
                    .bind(collection.id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to update collection")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&collection.name)
                    .bind(&collection.description)
                    .bind(collection.kind.to_string())
                    .bind(collection.id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to update collection")?;
            }
        }
        Ok(collection.clone())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM collections WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete collection")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete collection")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM collections WHERE id IN ({})",
            placeholders(ids.len())
        );
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to delete collections")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to delete collections")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    async fn add_owner(&self, collection_id: i64, account_id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(
                    "INSERT OR IGNORE INTO collection_owners (collection_id, account_id) VALUES (?, ?)",
                )
                .bind(collection_id)
                .bind(account_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to add owner")?
                .rows_affected()
            }
            DatabaseDriver::Mysql => {
                sqlx::query(
                    "INSERT IGNORE INTO collection_owners (collection_id, account_id) VALUES (?, ?)",
                )
                .bind(collection_id)
                .bind(account_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to add owner")?
                .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    async fn remove_owner(&self, collection_id: i64, account_id: i64) -> Result<bool> {
        let sql = "DELETE FROM collection_owners WHERE collection_id = ? AND account_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(collection_id)
                .bind(account_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to remove owner")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(collection_id)
                .bind(account_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to remove owner")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn remove_owners_for_collections(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM collection_owners WHERE collection_id IN ({})",
            placeholders(ids.len())
        );
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to remove owners")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to remove owners")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    async fn owner_ids(&self, collection_id: i64) -> Result<Vec<i64>> {
        let sql = "SELECT account_id FROM collection_owners WHERE collection_id = ? ORDER BY account_id";
        let ids = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(collection_id)
                .fetch_all(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to list owners")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(collection_id)
                .fetch_all(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to list owners")?,
        };
        Ok(ids)
    }

    async fn is_owner(&self, collection_id: i64, account_id: i64) -> Result<bool> {
        let sql =
            "SELECT COUNT(*) FROM collection_owners WHERE collection_id = ? AND account_id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .bind(collection_id)
                .bind(account_id)
                .fetch_one(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to check ownership")?,
            DatabaseDriver::Mysql => sqlx::query_scalar(sql)
                .bind(collection_id)
                .bind(account_id)
                .fetch_one(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to check ownership")?,
        };
        Ok(count > 0)
    }

    async fn list_by_owner(&self, account_id: i64) -> Result<Vec<Collection>> {
        let sql = r#"
            SELECT c.id, c.name, c.description, c.kind, c.is_temporary, c.session_id, c.expires_at, c.created_at
            FROM collections c
            INNER JOIN collection_owners o ON o.collection_id = c.id
            WHERE o.account_id = ?
            ORDER BY c.id
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(account_id)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list collections by owner")?;
                rows.iter().map(row_to_collection_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(account_id)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list collections by owner")?;
                rows.iter().map(row_to_collection_mysql).collect()
            }
        }
    }

    async fn list_temporary_by_session(&self, session_id: &str) -> Result<Vec<Collection>> {
        let sql = format!(
            "SELECT {} FROM collections WHERE is_temporary = ? AND session_id = ? ORDER BY id",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(session_id)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list temporary collections")?;
                rows.iter().map(row_to_collection_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(session_id)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list temporary collections")?;
                rows.iter().map(row_to_collection_mysql).collect()
            }
        }
    }

    async fn list_expired_temporary(&self, now: DateTime<Utc>) -> Result<Vec<Collection>> {
        let sql = format!(
            "SELECT {} FROM collections WHERE is_temporary = ? AND expires_at < ? ORDER BY id",
            SELECT_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(now)
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list expired collections")?;
                rows.iter().map(row_to_collection_sqlite).collect()
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(&sql)
                    .bind(true)
                    .bind(now)
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list expired collections")?;
                rows.iter().map(row_to_collection_mysql).collect()
            }
        }
    }

    async fn make_permanent(&self, id: i64) -> Result<bool> {
        let sql = r#"
            UPDATE collections
            SET is_temporary = ?, session_id = NULL, expires_at = NULL
            WHERE id = ? AND is_temporary = ?
        "#;
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(false)
                .bind(id)
                .bind(true)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to make collection permanent")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(false)
                .bind(id)
                .bind(true)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to make collection permanent")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn extend_temporary_by_session(
        &self,
        session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<u64> {
        let sql = "UPDATE collections SET expires_at = ? WHERE is_temporary = ? AND session_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(new_expiry)
                .bind(true)
                .bind(session_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to extend temporary collections")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(new_expiry)
                .bind(true)
                .bind(session_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to extend temporary collections")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn transfer_temporary(
        &self,
        old_session_id: &str,
        new_session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<u64> {
        let sql = r#"
            UPDATE collections
            SET session_id = ?, expires_at = ?
            WHERE is_temporary = ? AND session_id = ?
        "#;
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(new_session_id)
                .bind(new_expiry)
                .bind(true)
                .bind(old_session_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to transfer temporary collections")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(new_session_id)
                .bind(new_expiry)
                .bind(true)
                .bind(old_session_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to transfer temporary collections")?
                .rows_affected(),
        };
        Ok(affected)
    }
}
