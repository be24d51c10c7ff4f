//! Comment repository

use crate::config::DatabaseDriver;
use crate::db::Db;
use crate::models::Comment;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::sync::Arc;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Insert a new comment; returns the comment with its assigned id
    async fn create(&self, comment: &Comment) -> Result<Comment>;

    /// Get a comment by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// All comments on a photo, oldest first
    async fn list_by_photo(&self, photo_id: i64) -> Result<Vec<Comment>>;

    /// Delete a comment; returns whether a row existed
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based comment repository supporting SQLite and MySQL
pub struct SqlxCommentRepository {
    pool: Db,
}

impl SqlxCommentRepository {
    /// Create a new SQLx comment repository
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for dependency injection
    pub fn boxed(pool: Db) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

fn row_to_comment_sqlite(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        photo_id: row.get("photo_id"),
        account_id: row.get("account_id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
    }
}

fn row_to_comment_mysql(row: &sqlx::mysql::MySqlRow) -> Comment {
    let created_at: DateTime<Utc> = row.get("created_at");
    Comment {
        id: row.get("id"),
        photo_id: row.get("photo_id"),
        account_id: row.get("account_id"),
        content: row.get("content"),
        created_at,
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, comment: &Comment) -> Result<Comment> {
        let sql = r#"
            INSERT INTO comments (photo_id, account_id, content, created_at)
            VALUES (?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(comment.photo_id)
                .bind(comment.account_id)
                .bind(&comment.content)
                .bind(comment.created_at)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(comment.photo_id)
                .bind(comment.account_id)
                .bind(&comment.content)
                .bind(comment.created_at)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };

        Ok(Comment {
            id,
            ..comment.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = "SELECT id, photo_id, account_id, content, created_at FROM comments WHERE id = ?";
        let comment = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment_sqlite(&row)),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_optional(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment_mysql(&row)),
        };
        Ok(comment)
    }

    async fn list_by_photo(&self, photo_id: i64) -> Result<Vec<Comment>> {
        let sql = "SELECT id, photo_id, account_id, content, created_at FROM comments WHERE photo_id = ? ORDER BY id";
        let comments = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(photo_id)
                .fetch_all(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(photo_id)
                .fetch_all(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to list comments")?
                .iter()
                .map(row_to_comment_mysql)
                .collect(),
        };
        Ok(comments)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM comments WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}
