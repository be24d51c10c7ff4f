//! Photo repository
//!
//! Database operations for photos. Blob handling stays out of this module;
//! callers fetch rows first so storage keys are still known when the binary
//! has to be addressed before the row goes away.

use crate::config::DatabaseDriver;
use crate::db::repositories::placeholders;
use crate::db::Db;
use crate::models::Photo;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Photo repository trait
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Insert a new photo; returns the photo with its assigned id
    async fn create(&self, photo: &Photo) -> Result<Photo>;

    /// Get a photo by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Photo>>;

    /// Update title and description
    async fn update_meta(&self, photo: &Photo) -> Result<Photo>;

    /// Set the liked flag; returns whether a row was updated
    async fn set_liked(&self, id: i64, liked: bool) -> Result<bool>;

    /// Delete a photo row; returns whether a row existed
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Bulk-delete photo rows by id
    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64>;

    /// All photos in a collection
    async fn list_by_collection(&self, collection_id: i64) -> Result<Vec<Photo>>;

    /// Oldest photo of a collection (its thumbnail), if any
    async fn first_by_collection(&self, collection_id: i64) -> Result<Option<Photo>>;

    /// All photos across the given collections
    async fn list_by_collections(&self, collection_ids: &[i64]) -> Result<Vec<Photo>>;

    /// Count photos across the given collections
    async fn count_by_collections(&self, collection_ids: &[i64]) -> Result<i64>;

    /// Temporary photos tied to a session
    async fn list_temporary_by_session(&self, session_id: &str) -> Result<Vec<Photo>>;

    /// Temporary photos whose expiry has passed
    async fn list_expired_temporary(&self, now: DateTime<Utc>) -> Result<Vec<Photo>>;

    /// Clear the temporal fields; returns whether a row changed
    async fn make_permanent(&self, id: i64) -> Result<bool>;

    /// Clear the temporal fields of every photo in a collection
    async fn make_permanent_by_collection(&self, collection_id: i64) -> Result<u64>;

    /// Bulk-update expiry of all temporary photos tied to a session
    async fn extend_temporary_by_session(
        &self,
        session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<u64>;

    /// Re-bind temporary photos to a fresh session with a new expiry
    async fn transfer_temporary(
        &self,
        old_session_id: &str,
        new_session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<u64>;
}

/// SQLx-based photo repository supporting SQLite and MySQL
pub struct SqlxPhotoRepository {
    pool: Db,
}

impl SqlxPhotoRepository {
    /// Create a new SQLx photo repository
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for dependency injection
    pub fn boxed(pool: Db) -> Arc<dyn PhotoRepository> {
        Arc::new(Self::new(pool))
    }
}

const SELECT_COLUMNS: &str = "id, collection_id, title, description, storage_key, content_type, liked, is_temporary, session_id, expires_at, uploaded_at";

fn row_to_photo_sqlite(row: &sqlx::sqlite::SqliteRow) -> Photo {
    Photo {
        id: row.get("id"),
        collection_id: row.get("collection_id"),
        title: row.get("title"),
        description: row.get("description"),
        storage_key: row.get("storage_key"),
        content_type: row.get("content_type"),
        liked: row.get("liked"),
        is_temporary: row.get("is_temporary"),
        session_id: row.get("session_id"),
        expires_at: row.get("expires_at"),
        uploaded_at: row.get("uploaded_at"),
    }
}

fn row_to_photo_mysql(row: &sqlx::mysql::MySqlRow) -> Photo {
    let expires_at: Option<DateTime<Utc>> = row.get("expires_at");
    let uploaded_at: DateTime<Utc> = row.get("uploaded_at");
    Photo {
        id: row.get("id"),
        collection_id: row.get("collection_id"),
        title: row.get("title"),
        description: row.get("description"),
        storage_key: row.get("storage_key"),
        content_type: row.get("content_type"),
        liked: row.get("liked"),
        is_temporary: row.get("is_temporary"),
        session_id: row.get("session_id"),
        expires_at,
        uploaded_at,
    }
}

#[async_trait]
impl PhotoRepository for SqlxPhotoRepository {
    async fn create(&self, photo: &Photo) -> Result<Photo> {
        let sql = r#"
            INSERT INTO photos (collection_id, title, description, storage_key, content_type, liked, is_temporary, session_id, expires_at, uploaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(photo.collection_id)
                .bind(&photo.title)
                .bind(&photo.description)
                .bind(&photo.storage_key)
                .bind(&photo.content_type)
                .bind(photo.liked)
                .bind(photo.is_temporary)
                .bind(&photo.session_id)
                .bind(photo.expires_at)
                .bind(photo.uploaded_at)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to create photo")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(photo.collection_id)
                .bind(&photo.title)
                .bind(&photo.description)
                .bind(&photo.storage_key)
                .bind(&photo.content_type)
                .bind(photo.liked)
                .bind(photo.is_temporary)
                .bind(&photo.session_id)
                .bind(photo.expires_at)
                .bind(photo.uploaded_at)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to create photo")?
                .last_insert_id() as i64,
        };

        Ok(Photo {
            id,
            ..photo.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Photo>> {
        let sql = format!("SELECT {} FROM photos WHERE id = ?", SELECT_COLUMNS);
        let photo = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to get photo by ID")?
                .map(|row| row_to_photo_sqlite(&row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to get photo by ID")?
                .map(|row| row_to_photo_mysql(&row)),
        };
        Ok(photo)
    }

    async fn update_meta(&self, photo: &Photo) -> Result<Photo> {
        let sql = "UPDATE photos SET title = ?, description = ? WHERE id = ?";
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                sqlx::query(sql)
                    .bind(&photo.title)
                    .bind(&photo.description)
                    .bind(photo.id)
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to update photo")?;
            }
            DatabaseDriver::Mysql => {
                sqlx::query(sql)
                    .bind(&photo.title)
                    .bind(&photo.description)
                    .bind(photo.id)
                    .execute(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to update photo")?;
            }
        }
        Ok(photo.clone())
    }

    async fn set_liked(&self, id: i64, liked: bool) -> Result<bool> {
        let sql = "UPDATE photos SET liked = ? WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(liked)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to set liked flag")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(liked)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to set liked flag")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM photos WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete photo")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete photo")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete_by_ids(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let sql = format!("DELETE FROM photos WHERE id IN ({})", placeholders(ids.len()));
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(id);
                }
                query
                    .execute(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to delete photos")?
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
                    .context("Failed to delete photos")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }

    async fn list_by_collection(&self, collection_id: i64) -> Result<Vec<Photo>> {
        let sql = format!(
            "SELECT {} FROM photos WHERE collection_id = ? ORDER BY id",
            SELECT_COLUMNS
        );
        let photos = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(collection_id)
                .fetch_all(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to list photos")?
                .iter()
                .map(row_to_photo_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(collection_id)
                .fetch_all(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to list photos")?
                .iter()
                .map(row_to_photo_mysql)
                .collect(),
        };
        Ok(photos)
    }

    async fn first_by_collection(&self, collection_id: i64) -> Result<Option<Photo>> {
        let sql = format!(
            "SELECT {} FROM photos WHERE collection_id = ? ORDER BY id LIMIT 1",
            SELECT_COLUMNS
        );
        let photo = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(collection_id)
                .fetch_optional(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to get first photo")?
                .map(|row| row_to_photo_sqlite(&row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(collection_id)
                .fetch_optional(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to get first photo")?
                .map(|row| row_to_photo_mysql(&row)),
        };
        Ok(photo)
    }

    async fn list_by_collections(&self, collection_ids: &[i64]) -> Result<Vec<Photo>> {
        if collection_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {} FROM photos WHERE collection_id IN ({}) ORDER BY id",
            SELECT_COLUMNS,
            placeholders(collection_ids.len())
        );
        let photos = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for id in collection_ids {
                    query = query.bind(id);
                }
                query
                    .fetch_all(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to list photos")?
                    .iter()
                    .map(row_to_photo_sqlite)
                    .collect()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for id in collection_ids {
                    query = query.bind(id);
                }
                query
                    .fetch_all(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to list photos")?
                    .iter()
                    .map(row_to_photo_mysql)
                    .collect()
            }
        };
        Ok(photos)
    }

    async fn count_by_collections(&self, collection_ids: &[i64]) -> Result<i64> {
        if collection_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) FROM photos WHERE collection_id IN ({})",
            placeholders(collection_ids.len())
        );
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query_scalar(&sql);
                for id in collection_ids {
                    query = query.bind(id);
                }
                query
                    .fetch_one(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to count photos")?
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query_scalar(&sql);
                for id in collection_ids {
                    query = query.bind(id);
                }
                query
                    .fetch_one(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to count photos")?
            }
        };
        Ok(count)
    }

    async fn list_temporary_by_session(&self, session_id: &str) -> Result<Vec<Photo>> {
        let sql = format!(
            "SELECT {} FROM photos WHERE is_temporary = ? AND session_id = ? ORDER BY id",
            SELECT_COLUMNS
        );
        let photos = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(true)
                .bind(session_id)
                .fetch_all(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to list temporary photos")?
                .iter()
                .map(row_to_photo_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(true)
                .bind(session_id)
                .fetch_all(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to list temporary photos")?
                .iter()
                .map(row_to_photo_mysql)
                .collect(),
        };
        Ok(photos)
    }

    async fn list_expired_temporary(&self, now: DateTime<Utc>) -> Result<Vec<Photo>> {
        let sql = format!(
            "SELECT {} FROM photos WHERE is_temporary = ? AND expires_at < ? ORDER BY id",
            SELECT_COLUMNS
        );
        let photos = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(true)
                .bind(now)
                .fetch_all(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to list expired photos")?
                .iter()
                .map(row_to_photo_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(true)
                .bind(now)
                .fetch_all(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to list expired photos")?
                .iter()
                .map(row_to_photo_mysql)
                .collect(),
        };
        Ok(photos)
    }

    async fn make_permanent(&self, id: i64) -> Result<bool> {
        let sql = r#"
            UPDATE photos
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
                .context("Failed to make photo permanent")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(false)
                .bind(id)
                .bind(true)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to make photo permanent")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn make_permanent_by_collection(&self, collection_id: i64) -> Result<u64> {
        let sql = r#"
            UPDATE photos
            SET is_temporary = ?, session_id = NULL, expires_at = NULL
            WHERE collection_id = ? AND is_temporary = ?
        "#;
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(false)
                .bind(collection_id)
                .bind(true)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to make photos permanent")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(false)
                .bind(collection_id)
                .bind(true)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to make photos permanent")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn extend_temporary_by_session(
        &self,
        session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<u64> {
        let sql = "UPDATE photos SET expires_at = ? WHERE is_temporary = ? AND session_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(new_expiry)
                .bind(true)
                .bind(session_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to extend temporary photos")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(new_expiry)
                .bind(true)
                .bind(session_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to extend temporary photos")?
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
            UPDATE photos
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
                .context("Failed to transfer temporary photos")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(new_session_id)
                .bind(new_expiry)
                .bind(true)
                .bind(old_session_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to transfer temporary photos")?
                .rows_affected(),
        };
        Ok(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup() -> (Db, SqlxPhotoRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxPhotoRepository::new(pool.clone());
        (pool, repo)
    }

    async fn seed_fixtures(pool: &Db) {
        let sqlite = pool.as_sqlite().unwrap();
        sqlx::query(
            "INSERT INTO accounts (id, handle, password_hash, display_name, kind) VALUES (1, 'a', 'h', 'A', 'regular')",
        )
        .execute(sqlite)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO sessions (id, account_id, account_label, expires_at) VALUES ('tok', 1, 'A', ?)",
        )
        .bind(Utc::now() + Duration::minutes(10))
        .execute(sqlite)
        .await
        .unwrap();
        for id in [1, 2] {
            sqlx::query("INSERT INTO collections (id, name) VALUES (?, ?)")
                .bind(id)
                .bind(format!("c{}", id))
                .execute(sqlite)
                .await
                .unwrap();
        }
    }

    fn test_photo(collection_id: i64, title: &str) -> Photo {
        Photo {
            id: 0,
            collection_id,
            title: title.to_string(),
            description: None,
            storage_key: format!("{}.jpg", title),
            content_type: "image/jpeg".to_string(),
            liked: false,
            is_temporary: false,
            session_id: None,
            expires_at: None,
            uploaded_at: Utc::now(),
        }
    }

    fn temp_photo(collection_id: i64, title: &str, expires_in_mins: i64) -> Photo {
        Photo {
            is_temporary: true,
            session_id: Some("tok".to_string()),
            expires_at: Some(Utc::now() + Duration::minutes(expires_in_mins)),
            ..test_photo(collection_id, title)
        }
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let (pool, repo) = setup().await;
        seed_fixtures(&pool).await;

        let created = repo.create(&test_photo(1, "sunset")).await.unwrap();
        assert!(created.id > 0);

        let mut found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.title, "sunset");
        assert_eq!(found.storage_key, "sunset.jpg");

        found.title = "Sunset at the lake".to_string();
        found.description = Some("Golden hour".to_string());
        repo.update_meta(&found).await.unwrap();

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.title, "Sunset at the lake");
        assert_eq!(found.description.as_deref(), Some("Golden hour"));
    }

    #[tokio::test]
    async fn test_set_liked() {
        let (pool, repo) = setup().await;
        seed_fixtures(&pool).await;

        let photo = repo.create(&test_photo(1, "sunset")).await.unwrap();

        assert!(repo.set_liked(photo.id, true).await.unwrap());
        assert!(repo.get_by_id(photo.id).await.unwrap().unwrap().liked);

        assert!(repo.set_liked(photo.id, false).await.unwrap());
        assert!(!repo.get_by_id(photo.id).await.unwrap().unwrap().liked);

        assert!(!repo.set_liked(999, true).await.unwrap());
    }

    #[tokio::test]
    async fn test_listing_and_counts() {
        let (pool, repo) = setup().await;
        seed_fixtures(&pool).await;

        repo.create(&test_photo(1, "a")).await.unwrap();
        repo.create(&test_photo(1, "b")).await.unwrap();
        repo.create(&test_photo(2, "c")).await.unwrap();

        assert_eq!(repo.list_by_collection(1).await.unwrap().len(), 2);
        assert_eq!(repo.list_by_collections(&[1, 2]).await.unwrap().len(), 3);
        assert_eq!(repo.count_by_collections(&[1, 2]).await.unwrap(), 3);
        assert_eq!(repo.count_by_collections(&[]).await.unwrap(), 0);

        let first = repo.first_by_collection(1).await.unwrap().unwrap();
        assert_eq!(first.title, "a");
        assert!(repo.first_by_collection(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_bulk_delete() {
        let (pool, repo) = setup().await;
        seed_fixtures(&pool).await;

        let a = repo.create(&test_photo(1, "a")).await.unwrap();
        let b = repo.create(&test_photo(1, "b")).await.unwrap();

        assert!(repo.delete(a.id).await.unwrap());
        assert!(!repo.delete(a.id).await.unwrap());

        assert_eq!(repo.delete_by_ids(&[b.id, 999]).await.unwrap(), 1);
        assert_eq!(repo.delete_by_ids(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_temporal_lifecycle() {
        let (pool, repo) = setup().await;
        seed_fixtures(&pool).await;

        let expired = repo.create(&temp_photo(1, "old", -5)).await.unwrap();
        let fresh = repo.create(&temp_photo(1, "new", 5)).await.unwrap();
        repo.create(&test_photo(1, "keep")).await.unwrap();

        assert_eq!(repo.list_temporary_by_session("tok").await.unwrap().len(), 2);

        let expired_list = repo.list_expired_temporary(Utc::now()).await.unwrap();
        assert_eq!(expired_list.len(), 1);
        assert_eq!(expired_list[0].id, expired.id);

        // Promote the fresh one; it leaves the temporary set
        assert!(repo.make_permanent(fresh.id).await.unwrap());
        assert!(!repo.make_permanent(fresh.id).await.unwrap());
        let promoted = repo.get_by_id(fresh.id).await.unwrap().unwrap();
        assert!(promoted.temporal_fields_consistent());
        assert_eq!(repo.list_temporary_by_session("tok").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_extend_and_transfer() {
        let (pool, repo) = setup().await;
        seed_fixtures(&pool).await;
        sqlx::query(
            "INSERT INTO sessions (id, account_id, account_label, expires_at) VALUES ('tok2', 1, 'A', ?)",
        )
        .bind(Utc::now() + Duration::minutes(10))
        .execute(pool.as_sqlite().unwrap())
        .await
        .unwrap();

        repo.create(&temp_photo(1, "a", 5)).await.unwrap();
        repo.create(&temp_photo(2, "b", 5)).await.unwrap();

        let new_expiry = Utc::now() + Duration::minutes(30);
        assert_eq!(
            repo.extend_temporary_by_session("tok", new_expiry).await.unwrap(),
            2
        );
        for photo in repo.list_temporary_by_session("tok").await.unwrap() {
            assert!((photo.expires_at.unwrap() - new_expiry).num_seconds().abs() < 2);
        }

        assert_eq!(
            repo.transfer_temporary("tok", "tok2", new_expiry).await.unwrap(),
            2
        );
        assert!(repo.list_temporary_by_session("tok").await.unwrap().is_empty());
        assert_eq!(repo.list_temporary_by_session("tok2").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_make_permanent_by_collection() {
        let (pool, repo) = setup().await;
        seed_fixtures(&pool).await;

        repo.create(&temp_photo(1, "a", 5)).await.unwrap();
        repo.create(&temp_photo(1, "b", 5)).await.unwrap();
        repo.create(&temp_photo(2, "other", 5)).await.unwrap();

        assert_eq!(repo.make_permanent_by_collection(1).await.unwrap(), 2);
        assert_eq!(repo.list_temporary_by_session("tok").await.unwrap().len(), 1);
    }
}
