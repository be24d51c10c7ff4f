//! Demo-account cleanup
//!
//! The single permanent demo account carries a fixed set of protected
//! collections (configured by id) that showcase the album. Everything else
//! it owns is fair game for reclamation, either on manual trigger or when
//! one of its sessions ends. Protected ids are never touched by any path
//! in this service.

use crate::db::repositories::{
    AccountRepository, CollectionRepository, PhotoRepository, SessionRepository,
};
use crate::models::AccountKind;
use crate::services::temporal::CleanupReport;
use crate::storage::{delete_blob_best_effort, DynBlobStore};
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// Observability counts for the demo account's content
#[derive(Debug, Clone, Serialize)]
pub struct DemoContentSummary {
    pub total_collections: i64,
    pub protected_collections: i64,
    pub non_protected_collections: i64,
    pub total_photos: i64,
}

/// Cleanup operations scoped to the permanent demo account
pub struct DemoCleanupService {
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionRepository>,
    collections: Arc<dyn CollectionRepository>,
    photos: Arc<dyn PhotoRepository>,
    blobs: DynBlobStore,
    protected_ids: Vec<i64>,
}

impl DemoCleanupService {
    /// Create a new demo cleanup service
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionRepository>,
        collections: Arc<dyn CollectionRepository>,
        photos: Arc<dyn PhotoRepository>,
        blobs: DynBlobStore,
        protected_ids: Vec<i64>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            collections,
            photos,
            blobs,
            protected_ids,
        }
    }

    /// The configured protected collection ids
    pub fn protected_ids(&self) -> &[i64] {
        &self.protected_ids
    }

    /// Reclaim everything the demo account owns outside the protected set.
    ///
    /// Ordering: photo blobs, photo rows, ownership rows, collection rows.
    /// Never returns an error; sub-step failures land in the report.
    pub async fn cleanup_demo_content(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        let demo = match self.resolve_demo_account().await {
            Ok(Some(account)) => account,
            Ok(None) => {
                tracing::warn!("Demo cleanup requested but no demo account exists");
                report.failed_steps.push("demo account missing".to_string());
                return report;
            }
            Err(e) => {
                tracing::error!("Failed to resolve demo account: {:#}", e);
                report
                    .failed_steps
                    .push(format!("resolve demo account: {}", e));
                return report;
            }
        };

        let protected: HashSet<i64> = self.protected_ids.iter().copied().collect();
        let owned = match self.collections.list_by_owner(demo.id).await {
            Ok(collections) => collections,
            Err(e) => {
                tracing::error!("Failed to list demo collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list demo collections: {}", e));
                return report;
            }
        };

        let doomed_ids: Vec<i64> = owned
            .iter()
            .map(|c| c.id)
            .filter(|id| !protected.contains(id))
            .collect();

        if doomed_ids.is_empty() {
            return report;
        }

        // Blobs while the photo rows (and keys) still exist
        let photos = match self.photos.list_by_collections(&doomed_ids).await {
            Ok(photos) => photos,
            Err(e) => {
                tracing::error!("Failed to list demo photos: {:#}", e);
                report.failed_steps.push(format!("list demo photos: {}", e));
                Vec::new()
            }
        };
        for photo in &photos {
            if !delete_blob_best_effort(self.blobs.as_ref(), &photo.storage_key).await {
                report.failed_blobs.push(photo.storage_key.clone());
            }
        }

        let photo_ids: Vec<i64> = photos.iter().map(|p| p.id).collect();
        match self.photos.delete_by_ids(&photo_ids).await {
            Ok(count) => report.photos_deleted += count,
            Err(e) => {
                tracing::error!("Failed to delete demo photo rows: {:#}", e);
                report
                    .failed_steps
                    .push(format!("delete photo rows: {}", e));
            }
        }

        // Ownership rows before collection rows, so no dangling join row is
        // ever observable
        if let Err(e) = self
            .collections
            .remove_owners_for_collections(&doomed_ids)
            .await
        {
            tracing::error!("Failed to remove demo ownership rows: {:#}", e);
            report
                .failed_steps
                .push(format!("remove ownership rows: {}", e));
        }

        match self.collections.delete_by_ids(&doomed_ids).await {
            Ok(count) => report.collections_deleted += count,
            Err(e) => {
                tracing::error!("Failed to delete demo collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("delete collection rows: {}", e));
            }
        }

        tracing::info!(
            "Demo cleanup removed {} collection(s) and {} photo(s)",
            report.collections_deleted,
            report.photos_deleted
        );

        report
    }

    /// Session-scoped variant invoked from session deletion.
    ///
    /// No-ops unless the session belongs to the permanent demo account.
    pub async fn cleanup_demo_content_for_session(&self, session_id: &str) -> CleanupReport {
        let session = match self.sessions.get_by_id(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return CleanupReport::default(),
            Err(e) => {
                tracing::error!("Failed to load session for demo cleanup: {:#}", e);
                let mut report = CleanupReport::default();
                report.failed_steps.push(format!("load session: {}", e));
                return report;
            }
        };

        let is_demo = match self.accounts.get_by_id(session.account_id).await {
            Ok(Some(account)) => account.kind == AccountKind::Demo,
            Ok(None) => false,
            Err(e) => {
                tracing::error!("Failed to load account for demo cleanup: {:#}", e);
                false
            }
        };

        if !is_demo {
            return CleanupReport::default();
        }

        self.cleanup_demo_content().await
    }

    /// Content counts for the demo account; pure read
    pub async fn demo_content_summary(&self) -> Result<DemoContentSummary> {
        let demo = self
            .resolve_demo_account()
            .await?
            .context("No demo account exists")?;

        let protected: HashSet<i64> = self.protected_ids.iter().copied().collect();
        let owned = self
            .collections
            .list_by_owner(demo.id)
            .await
            .context("Failed to list demo collections")?;

        let owned_ids: Vec<i64> = owned.iter().map(|c| c.id).collect();
        let protected_count = owned_ids.iter().filter(|id| protected.contains(id)).count() as i64;
        let total_photos = self
            .photos
            .count_by_collections(&owned_ids)
            .await
            .context("Failed to count demo photos")?;

        Ok(DemoContentSummary {
            total_collections: owned_ids.len() as i64,
            protected_collections: protected_count,
            non_protected_collections: owned_ids.len() as i64 - protected_count,
            total_photos,
        })
    }

    async fn resolve_demo_account(&self) -> Result<Option<crate::models::Account>> {
        let mut demos = self.accounts.list_by_kind(AccountKind::Demo).await?;
        Ok(if demos.is_empty() {
            None
        } else {
            Some(demos.remove(0))
        })
    }
}
