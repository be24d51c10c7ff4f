//! Collection service
//!
//! Validation and access control over the collection CRUD, plus the seams
//! into the temporal tracker: collections can be created session-scoped
//! and later promoted to permanent.

use crate::db::repositories::{CollectionRepository, PartnershipRepository, PhotoRepository};
use crate::models::collection::CreateCollectionInput;
use crate::models::{Collection, CollectionKind, Photo, Session};
use crate::services::retry::{with_retries, RetryPolicy};
use crate::services::temporal::TemporalContentService;
use crate::services::{account_can_access_collection, ContentError};
use crate::storage::{delete_blob_best_effort, DynBlobStore};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;

/// Input for updating a collection
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdateCollectionInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<CollectionKind>,
}

/// Collection business logic
pub struct CollectionService {
    collections: Arc<dyn CollectionRepository>,
    photos: Arc<dyn PhotoRepository>,
    partnerships: Arc<dyn PartnershipRepository>,
    temporal: Arc<TemporalContentService>,
    blobs: DynBlobStore,
    retry: RetryPolicy,
}

impl CollectionService {
    /// Create a new collection service
    pub fn new(
        collections: Arc<dyn CollectionRepository>,
        photos: Arc<dyn PhotoRepository>,
        partnerships: Arc<dyn PartnershipRepository>,
        temporal: Arc<TemporalContentService>,
        blobs: DynBlobStore,
    ) -> Self {
        Self {
            collections,
            photos,
            partnerships,
            temporal,
            blobs,
            retry: RetryPolicy::default(),
        }
    }

    /// Create a collection owned by the account.
    ///
    /// With `temporary` set, the collection is bound to the caller's
    /// session and inherits its expiry.
    pub async fn create(
        &self,
        account_id: i64,
        session: &Session,
        input: CreateCollectionInput,
    ) -> Result<Collection, ContentError> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(ContentError::Validation(
                "Collection name cannot be empty".to_string(),
            ));
        }
        if name.len() > 200 {
            return Err(ContentError::Validation(
                "Collection name is too long".to_string(),
            ));
        }

        let collection = Collection {
            id: 0,
            name: name.to_string(),
            description: input.description,
            kind: input.kind,
            is_temporary: input.temporary,
            session_id: input.temporary.then(|| session.id.clone()),
            expires_at: input.temporary.then_some(session.expires_at),
            created_at: Utc::now(),
        };

        let created = with_retries(&self.retry, || {
            let collection = collection.clone();
            async move { self.collections.create(&collection).await }
        })
        .await
        .map_err(map_storage_error)?;

        self.collections
            .add_owner(created.id, account_id)
            .await
            .context("Failed to record ownership")?;

        Ok(created)
    }

    /// All collections the account can see: its own and its partner's
    pub async fn list_accessible(&self, account_id: i64) -> Result<Vec<Collection>, ContentError> {
        let mut collections = self
            .collections
            .list_by_owner(account_id)
            .await
            .context("Failed to list collections")?;

        if let Some(partnership) = self
            .partnerships
            .get_by_account(account_id)
            .await
            .context("Failed to look up partnership")?
        {
            if let Some(partner_id) = partnership.partner_of(account_id) {
                let partner_collections = self
                    .collections
                    .list_by_owner(partner_id)
                    .await
                    .context("Failed to list partner collections")?;
                for collection in partner_collections {
                    if !collections.iter().any(|c| c.id == collection.id) {
                        collections.push(collection);
                    }
                }
            }
        }

        collections.sort_by_key(|c| c.id);
        Ok(collections)
    }

    /// Get a collection the account can access
    pub async fn get(&self, account_id: i64, id: i64) -> Result<Collection, ContentError> {
        let collection = self
            .collections
            .get_by_id(id)
            .await
            .context("Failed to get collection")?
            .ok_or_else(|| ContentError::NotFound(format!("Collection {} not found", id)))?;

        self.ensure_access(account_id, id).await?;
        Ok(collection)
    }

    /// Thumbnail source for a collection: its first photo, if any
    pub async fn thumbnail(&self, collection_id: i64) -> Result<Option<Photo>, ContentError> {
        let photo = self
            .photos
            .first_by_collection(collection_id)
            .await
            .context("Failed to get thumbnail photo")?;
        Ok(photo)
    }

    /// Update a collection's metadata
    pub async fn update(
        &self,
        account_id: i64,
        id: i64,
        input: UpdateCollectionInput,
    ) -> Result<Collection, ContentError> {
        let mut collection = self.get(account_id, id).await?;

        if let Some(name) = input.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ContentError::Validation(
                    "Collection name cannot be empty".to_string(),
                ));
            }
            collection.name = name;
        }
        if let Some(description) = input.description {
            collection.description = if description.trim().is_empty() {
                None
            } else {
                Some(description.trim().to_string())
            };
        }
        if let Some(kind) = input.kind {
            collection.kind = kind;
        }

        let updated = with_retries(&self.retry, || {
            let collection = collection.clone();
            async move { self.collections.update(&collection).await }
        })
        .await
        .map_err(map_storage_error)?;

        Ok(updated)
    }

    /// Delete a collection and everything in it.
    ///
    /// Photo blobs go first (best-effort), then photo rows, ownership rows,
    /// and the collection row.
    pub async fn delete(&self, account_id: i64, id: i64) -> Result<(), ContentError> {
        self.get(account_id, id).await?;

        let photos = self
            .photos
            .list_by_collection(id)
            .await
            .context("Failed to list photos")?;
        for photo in &photos {
            delete_blob_best_effort(self.blobs.as_ref(), &photo.storage_key).await;
        }
        let photo_ids: Vec<i64> = photos.iter().map(|p| p.id).collect();
        self.photos
            .delete_by_ids(&photo_ids)
            .await
            .context("Failed to delete photos")?;

        self.collections
            .remove_owners_for_collections(&[id])
            .await
            .context("Failed to remove ownership")?;
        self.collections
            .delete(id)
            .await
            .context("Failed to delete collection")?;

        Ok(())
    }

    /// Promote a temporary collection (and its photos) to permanent.
    ///
    /// Idempotent; reports whether anything changed.
    pub async fn make_permanent(&self, account_id: i64, id: i64) -> Result<bool, ContentError> {
        self.get(account_id, id).await?;
        let changed = self
            .temporal
            .make_collection_permanent(id)
            .await
            .context("Failed to promote collection")?;
        Ok(changed)
    }

    /// Error unless the account can access the collection
    pub async fn ensure_access(&self, account_id: i64, id: i64) -> Result<(), ContentError> {
        let allowed =
            account_can_access_collection(&self.collections, &self.partnerships, account_id, id)
                .await
                .context("Failed to check access")?;
        if allowed {
            Ok(())
        } else {
            Err(ContentError::Forbidden(format!(
                "No access to collection {}",
                id
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxCollectionRepository, SqlxPartnershipRepository, SqlxPhotoRepository,
    };
    use crate::db::{create_test_pool, migrations, Db};
    use crate::models::Session;
    use crate::storage::{BlobStore, FsBlobStore};
    use chrono::Duration;

    struct Fixture {
        service: CollectionService,
        collections: Arc<dyn CollectionRepository>,
        photos: Arc<dyn PhotoRepository>,
        partnerships: Arc<dyn PartnershipRepository>,
        blobs: DynBlobStore,
        _dir: tempfile::TempDir,
        pool: Db,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blobs: DynBlobStore = FsBlobStore::shared(dir.path().join("blobs"));
        let collections = SqlxCollectionRepository::boxed(pool.clone());
        let photos = SqlxPhotoRepository::boxed(pool.clone());
        let partnerships = SqlxPartnershipRepository::boxed(pool.clone());
        let temporal = Arc::new(TemporalContentService::new(
            collections.clone(),
            photos.clone(),
            blobs.clone(),
        ));

        let service = CollectionService::new(
            collections.clone(),
            photos.clone(),
            partnerships.clone(),
            temporal,
            blobs.clone(),
        );

        Fixture {
            service,
            collections,
            photos,
            partnerships,
            blobs,
            _dir: dir,
            pool,
        }
    }

    async fn seed_account(f: &Fixture, id: i64) {
        sqlx::query(
            "INSERT INTO accounts (id, handle, password_hash, display_name, kind) VALUES (?, ?, 'h', 'A', 'regular')",
        )
        .bind(id)
        .bind(format!("account{}", id))
        .execute(f.pool.as_sqlite().unwrap())
        .await
        .unwrap();
    }

    async fn seed_session(f: &Fixture, id: &str, account_id: i64) -> Session {
        let session = Session {
            id: id.to_string(),
            account_id,
            account_label: "A".to_string(),
            expires_at: Utc::now() + Duration::minutes(10),
            created_at: Utc::now(),
        };
        sqlx::query(
            "INSERT INTO sessions (id, account_id, account_label, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(session.account_id)
        .bind(&session.account_label)
        .bind(session.expires_at)
        .execute(f.pool.as_sqlite().unwrap())
        .await
        .unwrap();
        session
    }

    fn create_input(name: &str, temporary: bool) -> CreateCollectionInput {
        CreateCollectionInput {
            name: name.to_string(),
            description: None,
            kind: CollectionKind::Custom,
            temporary,
        }
    }

    #[tokio::test]
    async fn test_create_permanent_collection() {
        let f = setup().await;
        seed_account(&f, 1).await;
        let session = seed_session(&f, "tok", 1).await;

        let collection = f
            .service
            .create(1, &session, create_input("Alps", false))
            .await
            .expect("create failed");

        assert!(!collection.is_temporary);
        assert!(collection.temporal_fields_consistent());
        assert!(f.collections.is_owner(collection.id, 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_temporary_binds_to_session() {
        let f = setup().await;
        seed_account(&f, 1).await;
        let session = seed_session(&f, "tok", 1).await;

        let collection = f
            .service
            .create(1, &session, create_input("Scratch", true))
            .await
            .unwrap();

        assert!(collection.is_temporary);
        assert_eq!(collection.session_id.as_deref(), Some("tok"));
        assert!(
            (collection.expires_at.unwrap() - session.expires_at)
                .num_seconds()
                .abs()
                < 2
        );
        assert!(collection.temporal_fields_consistent());
    }

    #[tokio::test]
    async fn test_create_validates_name() {
        let f = setup().await;
        seed_account(&f, 1).await;
        let session = seed_session(&f, "tok", 1).await;

        let result = f.service.create(1, &session, create_input("  ", false)).await;
        assert!(matches!(result, Err(ContentError::Validation(_))));
    }

    #[tokio::test]
    async fn test_access_owner_and_partner_only() {
        let f = setup().await;
        for id in [1, 2, 3] {
            seed_account(&f, id).await;
        }
        let session = seed_session(&f, "tok", 1).await;

        let collection = f
            .service
            .create(1, &session, create_input("Alps", false))
            .await
            .unwrap();

        // Owner sees it, strangers do not
        assert!(f.service.get(1, collection.id).await.is_ok());
        assert!(matches!(
            f.service.get(2, collection.id).await,
            Err(ContentError::Forbidden(_))
        ));

        // Partner of the owner gains access to everything
        f.partnerships.create(1, 2).await.unwrap();
        assert!(f.service.get(2, collection.id).await.is_ok());
        assert!(matches!(
            f.service.get(3, collection.id).await,
            Err(ContentError::Forbidden(_))
        ));

        let accessible = f.service.list_accessible(2).await.unwrap();
        assert_eq!(accessible.len(), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let f = setup().await;
        seed_account(&f, 1).await;

        assert!(matches!(
            f.service.get(1, 42).await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_photos_and_blobs() {
        let f = setup().await;
        seed_account(&f, 1).await;
        let session = seed_session(&f, "tok", 1).await;

        let collection = f
            .service
            .create(1, &session, create_input("Alps", false))
            .await
            .unwrap();
        let key = f.blobs.put(b"bytes", "jpg").await.unwrap();
        let photo = f
            .photos
            .create(&crate::models::Photo {
                id: 0,
                collection_id: collection.id,
                title: "p".into(),
                description: None,
                storage_key: key.clone(),
                content_type: "image/jpeg".into(),
                liked: false,
                is_temporary: false,
                session_id: None,
                expires_at: None,
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap();

        f.service.delete(1, collection.id).await.expect("delete failed");

        assert!(f.collections.get_by_id(collection.id).await.unwrap().is_none());
        assert!(f.photos.get_by_id(photo.id).await.unwrap().is_none());
        assert!(!f.blobs.exists(&key).await);
    }

    #[tokio::test]
    async fn test_make_permanent() {
        let f = setup().await;
        seed_account(&f, 1).await;
        let session = seed_session(&f, "tok", 1).await;

        let collection = f
            .service
            .create(1, &session, create_input("Scratch", true))
            .await
            .unwrap();

        assert!(f.service.make_permanent(1, collection.id).await.unwrap());
        assert!(!f.service.make_permanent(1, collection.id).await.unwrap());

        let promoted = f.collections.get_by_id(collection.id).await.unwrap().unwrap();
        assert!(!promoted.is_temporary);
        assert!(promoted.temporal_fields_consistent());
    }

    #[tokio::test]
    async fn test_update_fields() {
        let f = setup().await;
        seed_account(&f, 1).await;
        let session = seed_session(&f, "tok", 1).await;

        let collection = f
            .service
            .create(1, &session, create_input("Alps", false))
            .await
            .unwrap();

        let updated = f
            .service
            .update(
                1,
                collection.id,
                UpdateCollectionInput {
                    name: Some("Dolomites".into()),
                    description: Some("Hiking 2025".into()),
                    kind: Some(CollectionKind::Travels),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Dolomites");
        assert_eq!(updated.description.as_deref(), Some("Hiking 2025"));
        assert_eq!(updated.kind, CollectionKind::Travels);
    }
}
