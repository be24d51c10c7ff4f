//! Photo service
//!
//! Upload, metadata, like flag, serving, and deletion of photos. Uploads
//! land in the blob store first; the row is created afterwards and the
//! blob is reclaimed if that fails. Deletion addresses the blob before the
//! row so the storage key is never lost.

use crate::config::StorageConfig;
use crate::db::repositories::{CollectionRepository, PartnershipRepository, PhotoRepository};
use crate::models::photo::UpdatePhotoInput;
use crate::models::Photo;
use crate::services::retry::{with_retries, RetryPolicy};
use crate::services::temporal::TemporalContentService;
use crate::services::{account_can_access_collection, ContentError};
use crate::storage::{delete_blob_best_effort, DynBlobStore};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Photo business logic
pub struct PhotoService {
    photos: Arc<dyn PhotoRepository>,
    collections: Arc<dyn CollectionRepository>,
    partnerships: Arc<dyn PartnershipRepository>,
    temporal: Arc<TemporalContentService>,
    blobs: DynBlobStore,
    storage_cfg: StorageConfig,
    retry: RetryPolicy,
}

impl PhotoService {
    /// Create a new photo service
    pub fn new(
        photos: Arc<dyn PhotoRepository>,
        collections: Arc<dyn CollectionRepository>,
        partnerships: Arc<dyn PartnershipRepository>,
        temporal: Arc<TemporalContentService>,
        blobs: DynBlobStore,
        storage_cfg: StorageConfig,
    ) -> Self {
        Self {
            photos,
            collections,
            partnerships,
            temporal,
            blobs,
            storage_cfg,
            retry: RetryPolicy::default(),
        }
    }

    /// Upload a photo into a collection.
    ///
    /// The photo inherits the collection's temporal binding: photos in a
    /// temporary collection expire with it.
    pub async fn upload(
        &self,
        account_id: i64,
        collection_id: i64,
        title: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<Photo, ContentError> {
        self.ensure_access(account_id, collection_id).await?;

        if !self.storage_cfg.is_type_allowed(content_type) {
            return Err(ContentError::Validation(format!(
                "Unsupported content type: {}",
                content_type
            )));
        }
        if bytes.is_empty() {
            return Err(ContentError::Validation("Empty upload".to_string()));
        }
        if bytes.len() as u64 > self.storage_cfg.max_file_size {
            return Err(ContentError::Validation(format!(
                "Photo too large (max {} bytes)",
                self.storage_cfg.max_file_size
            )));
        }

        let collection = self
            .collections
            .get_by_id(collection_id)
            .await
            .context("Failed to get collection")?
            .ok_or_else(|| {
                ContentError::NotFound(format!("Collection {} not found", collection_id))
            })?;

        let extension = self.storage_cfg.get_extension(content_type);
        let storage_key = self
            .blobs
            .put(bytes, extension)
            .await
            .context("Failed to store photo")?;

        let title = if title.trim().is_empty() {
            "Untitled".to_string()
        } else {
            title.trim().to_string()
        };

        let photo = Photo {
            id: 0,
            collection_id,
            title,
            description: None,
            storage_key: storage_key.clone(),
            content_type: content_type.to_string(),
            liked: false,
            is_temporary: collection.is_temporary,
            session_id: collection.session_id.clone(),
            expires_at: collection.expires_at,
            uploaded_at: Utc::now(),
        };

        let created = with_retries(&self.retry, || {
            let photo = photo.clone();
            async move { self.photos.create(&photo).await }
        })
        .await;

        match created {
            Ok(photo) => Ok(photo),
            Err(e) => {
                // Do not leave an orphaned blob behind
                delete_blob_best_effort(self.blobs.as_ref(), &storage_key).await;
                Err(map_storage_error(e))
            }
        }
    }

    /// Get a photo the account can access
    pub async fn get(&self, account_id: i64, id: i64) -> Result<Photo, ContentError> {
        let photo = self
            .photos
            .get_by_id(id)
            .await
            .context("Failed to get photo")?
            .ok_or_else(|| ContentError::NotFound(format!("Photo {} not found", id)))?;

        self.ensure_access(account_id, photo.collection_id).await?;
        Ok(photo)
    }

    /// All photos of a collection the account can access
    pub async fn list(&self, account_id: i64, collection_id: i64) -> Result<Vec<Photo>, ContentError> {
        self.ensure_access(account_id, collection_id).await?;
        let photos = self
            .photos
            .list_by_collection(collection_id)
            .await
            .context("Failed to list photos")?;
        Ok(photos)
    }

    /// The raw image bytes of a photo
    pub async fn raw(&self, account_id: i64, id: i64) -> Result<(Photo, Vec<u8>), ContentError> {
        let photo = self.get(account_id, id).await?;
        let bytes = self
            .blobs
            .get(&photo.storage_key)
            .await
            .context("Failed to read photo blob")?;
        Ok((photo, bytes))
    }

    /// Update photo metadata
    pub async fn update(
        &self,
        account_id: i64,
        id: i64,
        input: UpdatePhotoInput,
    ) -> Result<Photo, ContentError> {
        let mut photo = self.get(account_id, id).await?;

        if let Some(title) = input.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(ContentError::Validation(
                    "Photo title cannot be empty".to_string(),
                ));
            }
            photo.title = title;
        }
        if let Some(description) = input.description {
            photo.description = if description.trim().is_empty() {
                None
            } else {
                Some(description.trim().to_string())
            };
        }

        let updated = with_retries(&self.retry, || {
            let photo = photo.clone();
            async move { self.photos.update_meta(&photo).await }
        })
        .await
        .map_err(map_storage_error)?;

        Ok(updated)
    }

    /// Toggle the liked flag; returns the new state
    pub async fn toggle_like(&self, account_id: i64, id: i64) -> Result<bool, ContentError> {
        let photo = self.get(account_id, id).await?;
        let liked = !photo.liked;
        self.photos
            .set_liked(id, liked)
            .await
            .context("Failed to update liked flag")?;
        Ok(liked)
    }

    /// Delete a photo: blob first (best-effort), then the row
    pub async fn delete(&self, account_id: i64, id: i64) -> Result<(), ContentError> {
        let photo = self.get(account_id, id).await?;

        // A lost blob is logged and swallowed; the row still goes
        delete_blob_best_effort(self.blobs.as_ref(), &photo.storage_key).await;

        self.photos
            .delete(id)
            .await
            .context("Failed to delete photo row")?;
        Ok(())
    }

    /// Promote a temporary photo to permanent.
    ///
    /// Idempotent; reports whether the row changed.
    pub async fn make_permanent(&self, account_id: i64, id: i64) -> Result<bool, ContentError> {
        self.get(account_id, id).await?;
        let changed = self
            .temporal
            .make_photo_permanent(id)
            .await
            .context("Failed to promote photo")?;
        Ok(changed)
    }

    async fn ensure_access(&self, account_id: i64, collection_id: i64) -> Result<(), ContentError> {
        let allowed = account_can_access_collection(
            &self.collections,
            &self.partnerships,
            account_id,
            collection_id,
        )
        .await
        .context("Failed to check access")?;
        if allowed {
            Ok(())
        } else {
            Err(ContentError::Forbidden(format!(
                "No access to collection {}",
                collection_id
            )))
        }
    }
}

fn map_storage_error(e: anyhow::Error) -> ContentError {
    if crate::services::retry::is_transient(&e) {
        ContentError::Retryable(format!("{:#}", e))
    } else {
        ContentError::Internal(e)
    }
}
