//! Comment service

use crate::db::repositories::{CollectionRepository, CommentRepository, PartnershipRepository, PhotoRepository};
use crate::models::Comment;
use crate::services::{account_can_access_collection, ContentError};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

const MAX_COMMENT_LENGTH: usize = 2000;

/// Comments on photos
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    photos: Arc<dyn PhotoRepository>,
    collections: Arc<dyn CollectionRepository>,
    partnerships: Arc<dyn PartnershipRepository>,
}

impl CommentService {
    /// Create a new comment service
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        photos: Arc<dyn PhotoRepository>,
        collections: Arc<dyn CollectionRepository>,
        partnerships: Arc<dyn PartnershipRepository>,
    ) -> Self {
        Self {
            comments,
            photos,
            collections,
            partnerships,
        }
    }

    /// All comments on a photo the account can see
    pub async fn list(&self, account_id: i64, photo_id: i64) -> Result<Vec<Comment>, ContentError> {
        self.ensure_photo_access(account_id, photo_id).await?;
        let comments = self
            .comments
            .list_by_photo(photo_id)
            .await
            .context("Failed to list comments")?;
        Ok(comments)
    }

    /// Comment on a photo
    pub async fn create(
        &self,
        account_id: i64,
        photo_id: i64,
        content: &str,
    ) -> Result<Comment, ContentError> {
        self.ensure_photo_access(account_id, photo_id).await?;

        let content = content.trim();
        if content.is_empty() {
            return Err(ContentError::Validation(
                "Comment cannot be empty".to_string(),
            ));
        }
        if content.len() > MAX_COMMENT_LENGTH {
            return Err(ContentError::Validation("Comment is too long".to_string()));
        }

        let comment = Comment {
            id: 0,
            photo_id,
            account_id: Some(account_id),
            content: content.to_string(),
            created_at: Utc::now(),
        };

        let created = self
            .comments
            .create(&comment)
            .await
            .context("Failed to create comment")?;
        Ok(created)
    }

    /// Delete a comment. Allowed for its author and for anyone who can
    /// access the photo's collection (owners moderate their albums).
    pub async fn delete(&self, account_id: i64, comment_id: i64) -> Result<(), ContentError> {
        let comment = self
            .comments
            .get_by_id(comment_id)
            .await
            .context("Failed to get comment")?
            .ok_or_else(|| ContentError::NotFound(format!("Comment {} not found", comment_id)))?;

        if comment.account_id != Some(account_id) {
            self.ensure_photo_access(account_id, comment.photo_id).await?;
        }

        self.comments
            .delete(comment_id)
            .await
            .context("Failed to delete comment")?;
        Ok(())
    }

    async fn ensure_photo_access(&self, account_id: i64, photo_id: i64) -> Result<(), ContentError> {
        let photo = self
            .photos
            .get_by_id(photo_id)
            .await
            .context("Failed to get photo")?
            .ok_or_else(|| ContentError::NotFound(format!("Photo {} not found", photo_id)))?;

        let allowed = account_can_access_collection(
            &self.collections,
            &self.partnerships,
            account_id,
            photo.collection_id,
        )
        .await
        .context("Failed to check access")?;

        if allowed {
            Ok(())
        } else {
            Err(ContentError::Forbidden(format!(
                "No access to photo {}",
                photo_id
            )))
        }
    }
}
