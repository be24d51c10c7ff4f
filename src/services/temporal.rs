//! Temporal content tracker
//!
//! Collections and photos can be session-scoped: flagged temporary, tied to
//! a session, and bounded by an expiry. This service owns every transition
//! of that state: the expiry sweep, the immediate logout teardown, promotion
//! to permanent, and keeping content expiry in lockstep with session
//! renewal.
//!
//! Two independent reclamation paths exist on purpose: the periodic sweep
//! handles sessions that lapse naturally, while the explicit per-session
//! teardown gives logout synchronous reclamation. Both follow the same
//! ordering: photo blobs are addressed while the rows (and their storage
//! keys) still exist, then photo rows, then collection rows.

use crate::db::repositories::{CollectionRepository, PhotoRepository};
use crate::models::{Collection, Photo};
use crate::storage::{delete_blob_best_effort, DynBlobStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of one cleanup pass.
///
/// Best-effort sub-steps record their failures here instead of aborting, so
/// callers (and tests) can assert partial-failure behavior precisely.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct CleanupReport {
    /// Photo rows removed
    pub photos_deleted: u64,
    /// Collection rows removed
    pub collections_deleted: u64,
    /// Storage keys whose blob could not be deleted
    pub failed_blobs: Vec<String>,
    /// Sub-steps that failed entirely (described, logged, skipped)
    pub failed_steps: Vec<String>,
}

impl CleanupReport {
    /// Whether every sub-step succeeded
    pub fn is_clean(&self) -> bool {
        self.failed_blobs.is_empty() && self.failed_steps.is_empty()
    }

    /// Fold another report into this one
    pub fn merge(&mut self, other: CleanupReport) {
        self.photos_deleted += other.photos_deleted;
        self.collections_deleted += other.collections_deleted;
        self.failed_blobs.extend(other.failed_blobs);
        self.failed_steps.extend(other.failed_steps);
    }
}

/// Temporary content tied to one session
#[derive(Debug, Clone)]
pub struct TemporaryContent {
    pub collections: Vec<Collection>,
    pub photos: Vec<Photo>,
}

/// Tracker for session-scoped collections and photos
pub struct TemporalContentService {
    collections: Arc<dyn CollectionRepository>,
    photos: Arc<dyn PhotoRepository>,
    blobs: DynBlobStore,
}

impl TemporalContentService {
    /// Create a new temporal content service
    pub fn new(
        collections: Arc<dyn CollectionRepository>,
        photos: Arc<dyn PhotoRepository>,
        blobs: DynBlobStore,
    ) -> Self {
        Self {
            collections,
            photos,
            blobs,
        }
    }

    /// Reclaim all temporary content whose expiry has passed.
    ///
    /// Runs on the background sweep; never returns an error. Photo blobs
    /// are deleted (best-effort, sequentially) before their rows. Photos
    /// inside a dying collection are reclaimed along with it, whatever
    /// their own temporal state, so no blob is lost to the row cascade.
    pub async fn clean_expired_temporary_content(&self) -> CleanupReport {
        let now = Utc::now();
        let mut report = CleanupReport::default();

        let expired_collections = match self.collections.list_expired_temporary(now).await {
            Ok(collections) => collections,
            Err(e) => {
                tracing::error!("Failed to list expired collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list expired collections: {}", e));
                Vec::new()
            }
        };
        let collection_ids: Vec<i64> = expired_collections.iter().map(|c| c.id).collect();

        let expired_photos = match self.photos.list_expired_temporary(now).await {
            Ok(photos) => photos,
            Err(e) => {
                tracing::error!("Failed to list expired photos: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list expired photos: {}", e));
                Vec::new()
            }
        };

        let doomed_photos = match self.photos.list_by_collections(&collection_ids).await {
            Ok(contained) => merge_photos(expired_photos, contained),
            Err(e) => {
                tracing::error!("Failed to list photos of expired collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list photos of expired collections: {}", e));
                expired_photos
            }
        };

        report.merge(self.reclaim_photos(&doomed_photos).await);

        match self.collections.delete_by_ids(&collection_ids).await {
            Ok(count) => report.collections_deleted += count,
            Err(e) => {
                tracing::error!("Failed to delete expired collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("delete expired collections: {}", e));
            }
        }

        if report.photos_deleted > 0 || report.collections_deleted > 0 {
            tracing::info!(
                "Expired content sweep removed {} photo(s) and {} collection(s)",
                report.photos_deleted,
                report.collections_deleted
            );
        }

        report
    }

    /// Immediately reclaim all temporary content tied to a session.
    ///
    /// Used on logout and account teardown; does not wait for the sweep.
    pub async fn delete_temporary_content_for_session(&self, session_id: &str) -> CleanupReport {
        let mut report = CleanupReport::default();

        let collections = match self.collections.list_temporary_by_session(session_id).await {
            Ok(collections) => collections,
            Err(e) => {
                tracing::error!("Failed to list temporary collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list temporary collections: {}", e));
                Vec::new()
            }
        };
        let collection_ids: Vec<i64> = collections.iter().map(|c| c.id).collect();

        let session_photos = match self.photos.list_temporary_by_session(session_id).await {
            Ok(photos) => photos,
            Err(e) => {
                tracing::error!("Failed to list temporary photos: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list temporary photos: {}", e));
                Vec::new()
            }
        };

        let doomed_photos = match self.photos.list_by_collections(&collection_ids).await {
            Ok(contained) => merge_photos(session_photos, contained),
            Err(e) => {
                tracing::error!("Failed to list photos of temporary collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list photos of temporary collections: {}", e));
                session_photos
            }
        };

        report.merge(self.reclaim_photos(&doomed_photos).await);

        match self.collections.delete_by_ids(&collection_ids).await {
            Ok(count) => report.collections_deleted += count,
            Err(e) => {
                tracing::error!("Failed to delete temporary collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("delete temporary collections: {}", e));
            }
        }

        report
    }

    /// Promote a collection (and every photo in it) to permanent.
    ///
    /// Idempotent; returns whether the collection row changed.
    pub async fn make_collection_permanent(&self, id: i64) -> Result<bool> {
        let changed = self
            .collections
            .make_permanent(id)
            .await
            .context("Failed to make collection permanent")?;

        // Photos follow their collection out of the temporary set
        self.photos
            .make_permanent_by_collection(id)
            .await
            .context("Failed to make collection photos permanent")?;

        Ok(changed)
    }

    /// Promote a single photo to permanent.
    ///
    /// Idempotent; returns whether the row changed.
    pub async fn make_photo_permanent(&self, id: i64) -> Result<bool> {
        self.photos
            .make_permanent(id)
            .await
            .context("Failed to make photo permanent")
    }

    /// All temporary content tied to a session; no side effects
    pub async fn get_temporary_content_by_session(
        &self,
        session_id: &str,
    ) -> Result<TemporaryContent> {
        let collections = self
            .collections
            .list_temporary_by_session(session_id)
            .await
            .context("Failed to list temporary collections")?;
        let photos = self
            .photos
            .list_temporary_by_session(session_id)
            .await
            .context("Failed to list temporary photos")?;
        Ok(TemporaryContent {
            collections,
            photos,
        })
    }

    /// Push the expiry of every temporary item tied to a session.
    ///
    /// Invoked by the session renewal path so content never drifts from its
    /// session once renewed. Returns (collections, photos) updated.
    pub async fn extend_temporary_content_expiration(
        &self,
        session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let collections = self
            .collections
            .extend_temporary_by_session(session_id, new_expiry)
            .await
            .context("Failed to extend temporary collections")?;
        let photos = self
            .photos
            .extend_temporary_by_session(session_id, new_expiry)
            .await
            .context("Failed to extend temporary photos")?;
        Ok((collections, photos))
    }

    /// Re-bind all temporary content from one session to a fresh one.
    ///
    /// Renewal issues a fresh session id; content must move to the new row
    /// before the old one is deleted, or the cascade would take it along.
    pub async fn transfer_temporary_content(
        &self,
        old_session_id: &str,
        new_session_id: &str,
        new_expiry: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let collections = self
            .collections
            .transfer_temporary(old_session_id, new_session_id, new_expiry)
            .await
            .context("Failed to transfer temporary collections")?;
        let photos = self
            .photos
            .transfer_temporary(old_session_id, new_session_id, new_expiry)
            .await
            .context("Failed to transfer temporary photos")?;
        Ok((collections, photos))
    }

    /// Delete blobs for the given photos (best-effort, sequential), then
    /// their rows in one statement.
    async fn reclaim_photos(&self, photos: &[Photo]) -> CleanupReport {
        let mut report = CleanupReport::default();
        if photos.is_empty() {
            return report;
        }

        for photo in photos {
            if !delete_blob_best_effort(self.blobs.as_ref(), &photo.storage_key).await {
                report.failed_blobs.push(photo.storage_key.clone());
            }
        }

        let ids: Vec<i64> = photos.iter().map(|p| p.id).collect();
        match self.photos.delete_by_ids(&ids).await {
            Ok(count) => report.photos_deleted += count,
            Err(e) => {
                tracing::error!("Failed to delete photo rows: {:#}", e);
                report.failed_steps.push(format!("delete photo rows: {}", e));
            }
        }

        report
    }
}

/// Union of two photo lists, deduplicated by id
fn merge_photos(mut photos: Vec<Photo>, extra: Vec<Photo>) -> Vec<Photo> {
    for photo in extra {
        if !photos.iter().any(|p| p.id == photo.id) {
            photos.push(photo);
        }
    }
    photos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxCollectionRepository, SqlxPhotoRepository};
    use crate::db::{create_test_pool, migrations, Db};
    use crate::models::CollectionKind;
    use crate::storage::{BlobStore, FsBlobStore};
    use chrono::Duration;

    struct Fixture {
        pool: Db,
        service: TemporalContentService,
        collections: Arc<dyn CollectionRepository>,
        photos: Arc<dyn PhotoRepository>,
        blobs: DynBlobStore,
        _dir: tempfile::TempDir,
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
        let service =
            TemporalContentService::new(collections.clone(), photos.clone(), blobs.clone());

        let sqlite = pool.as_sqlite().unwrap();
        sqlx::query(
            "INSERT INTO accounts (id, handle, password_hash, display_name, kind) VALUES (1, 'a', 'h', 'A', 'regular')",
        )
        .execute(sqlite)
        .await
        .unwrap();
        for id in ["tok", "tok2"] {
            sqlx::query(
                "INSERT INTO sessions (id, account_id, account_label, expires_at) VALUES (?, 1, 'A', ?)",
            )
            .bind(id)
            .bind(Utc::now() + Duration::minutes(10))
            .execute(sqlite)
            .await
            .unwrap();
        }

        Fixture {
            pool,
            service,
            collections,
            photos,
            blobs,
            _dir: dir,
        }
    }

    async fn temp_collection(f: &Fixture, session: &str, expires_in_mins: i64) -> Collection {
        f.collections
            .create(&Collection {
                id: 0,
                name: "c".into(),
                description: None,
                kind: CollectionKind::Custom,
                is_temporary: true,
                session_id: Some(session.to_string()),
                expires_at: Some(Utc::now() + Duration::minutes(expires_in_mins)),
                created_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    async fn temp_photo(
        f: &Fixture,
        collection_id: i64,
        session: &str,
        expires_in_mins: i64,
    ) -> Photo {
        let key = f.blobs.put(b"jpeg-bytes", "jpg").await.unwrap();
        f.photos
            .create(&Photo {
                id: 0,
                collection_id,
                title: "p".into(),
                description: None,
                storage_key: key,
                content_type: "image/jpeg".into(),
                liked: false,
                is_temporary: true,
                session_id: Some(session.to_string()),
                expires_at: Some(Utc::now() + Duration::minutes(expires_in_mins)),
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_reclaims_expired_rows_and_blobs() {
        let f = setup().await;

        let expired_c = temp_collection(&f, "tok", -5).await;
        let expired_p = temp_photo(&f, expired_c.id, "tok", -5).await;
        let fresh_c = temp_collection(&f, "tok", 5).await;
        let fresh_p = temp_photo(&f, fresh_c.id, "tok", 5).await;

        let report = f.service.clean_expired_temporary_content().await;

        assert!(report.is_clean());
        assert_eq!(report.photos_deleted, 1);
        assert_eq!(report.collections_deleted, 1);

        // Blob of the expired photo is gone, the fresh one survives
        assert!(!f.blobs.exists(&expired_p.storage_key).await);
        assert!(f.blobs.exists(&fresh_p.storage_key).await);

        assert!(f.collections.get_by_id(expired_c.id).await.unwrap().is_none());
        assert!(f.collections.get_by_id(fresh_c.id).await.unwrap().is_some());
        assert!(f.photos.get_by_id(fresh_p.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_continues_past_missing_blob() {
        let f = setup().await;

        let c = temp_collection(&f, "tok", -5).await;
        let p = temp_photo(&f, c.id, "tok", -5).await;
        // Blob vanishes out from under us
        f.blobs.delete(&p.storage_key).await.unwrap();

        let report = f.service.clean_expired_temporary_content().await;

        // The blob failure is reported but rows are reclaimed anyway
        assert_eq!(report.failed_blobs, vec![p.storage_key.clone()]);
        assert_eq!(report.photos_deleted, 1);
        assert_eq!(report.collections_deleted, 1);
        assert!(f.photos.get_by_id(p.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_teardown_is_immediate() {
        let f = setup().await;

        let c = temp_collection(&f, "tok", 30).await;
        let p = temp_photo(&f, c.id, "tok", 30).await;
        let other = temp_collection(&f, "tok2", 30).await;

        // Nothing has expired, the teardown is explicit
        let report = f.service.delete_temporary_content_for_session("tok").await;

        assert!(report.is_clean());
        assert_eq!(report.photos_deleted, 1);
        assert_eq!(report.collections_deleted, 1);
        assert!(!f.blobs.exists(&p.storage_key).await);

        // Content of other sessions is untouched
        assert!(f.collections.get_by_id(other.id).await.unwrap().is_some());

        // Running it again is a no-op
        let report = f.service.delete_temporary_content_for_session("tok").await;
        assert_eq!(report.photos_deleted, 0);
        assert_eq!(report.collections_deleted, 0);
    }

    #[tokio::test]
    async fn test_make_collection_permanent_promotes_photos() {
        let f = setup().await;

        let c = temp_collection(&f, "tok", 5).await;
        let p = temp_photo(&f, c.id, "tok", 5).await;

        assert!(f.service.make_collection_permanent(c.id).await.unwrap());
        // Second call reports no change
        assert!(!f.service.make_collection_permanent(c.id).await.unwrap());

        let c = f.collections.get_by_id(c.id).await.unwrap().unwrap();
        let p = f.photos.get_by_id(p.id).await.unwrap().unwrap();
        assert!(!c.is_temporary && c.temporal_fields_consistent());
        assert!(!p.is_temporary && p.temporal_fields_consistent());

        // Permanent content survives the sweep and session teardown
        f.service.clean_expired_temporary_content().await;
        f.service.delete_temporary_content_for_session("tok").await;
        assert!(f.collections.get_by_id(c.id).await.unwrap().is_some());
        assert!(f.photos.get_by_id(p.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_extend_roundtrip() {
        let f = setup().await;

        let c = temp_collection(&f, "tok", 5).await;
        temp_photo(&f, c.id, "tok", 5).await;
        temp_photo(&f, c.id, "tok", 5).await;

        let new_expiry = Utc::now() + Duration::minutes(45);
        let (collections, photos) = f
            .service
            .extend_temporary_content_expiration("tok", new_expiry)
            .await
            .unwrap();
        assert_eq!((collections, photos), (1, 2));

        let content = f
            .service
            .get_temporary_content_by_session("tok")
            .await
            .unwrap();
        for expires_at in content
            .collections
            .iter()
            .map(|c| c.expires_at.unwrap())
            .chain(content.photos.iter().map(|p| p.expires_at.unwrap()))
        {
            assert!((expires_at - new_expiry).num_seconds().abs() < 2);
        }
    }

    #[tokio::test]
    async fn test_transfer_rebinds_session() {
        let f = setup().await;

        let c = temp_collection(&f, "tok", 5).await;
        temp_photo(&f, c.id, "tok", 5).await;

        let new_expiry = Utc::now() + Duration::minutes(10);
        let (collections, photos) = f
            .service
            .transfer_temporary_content("tok", "tok2", new_expiry)
            .await
            .unwrap();
        assert_eq!((collections, photos), (1, 1));

        // Deleting the old session row must not cascade the content away
        sqlx::query("DELETE FROM sessions WHERE id = 'tok'")
            .execute(f.pool.as_sqlite().unwrap())
            .await
            .unwrap();

        let content = f
            .service
            .get_temporary_content_by_session("tok2")
            .await
            .unwrap();
        assert_eq!(content.collections.len(), 1);
        assert_eq!(content.photos.len(), 1);
    }
}
