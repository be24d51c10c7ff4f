//! Ephemeral guest accounts
//!
//! Anonymous visitors get a fully disposable account: a generated handle,
//! an unusable credential, co-ownership of the protected showcase
//! collections, and exactly one session. The whole account is torn down
//! when that session ends, whichever path gets there first: explicit
//! logout, the deferred one-shot scheduled at creation, or the periodic
//! safety-net sweep. All three are idempotent, so racing is harmless.

use crate::config::SessionConfig;
use crate::db::repositories::{
    AccountRepository, CollectionRepository, PhotoRepository, SessionRepository,
};
use crate::models::account::GUEST_HANDLE_PREFIX;
use crate::models::{Account, AccountKind, Session};
use crate::scheduler::Scheduler;
use crate::services::password::hash_password;
use crate::services::temporal::CleanupReport;
use crate::storage::{delete_blob_best_effort, DynBlobStore};
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle of disposable guest accounts
pub struct EphemeralAccountService {
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionRepository>,
    collections: Arc<dyn CollectionRepository>,
    photos: Arc<dyn PhotoRepository>,
    blobs: DynBlobStore,
    scheduler: Arc<Scheduler>,
    session_cfg: SessionConfig,
    protected_ids: Vec<i64>,
}

impl EphemeralAccountService {
    /// Create a new ephemeral account service
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionRepository>,
        collections: Arc<dyn CollectionRepository>,
        photos: Arc<dyn PhotoRepository>,
        blobs: DynBlobStore,
        scheduler: Arc<Scheduler>,
        session_cfg: SessionConfig,
        protected_ids: Vec<i64>,
    ) -> Self {
        Self {
            accounts,
            sessions,
            collections,
            photos,
            blobs,
            scheduler,
            session_cfg,
            protected_ids,
        }
    }

    /// Whether a handle belongs to the reserved guest namespace
    pub fn is_guest_handle(handle: &str) -> bool {
        handle.starts_with(GUEST_HANDLE_PREFIX)
    }

    /// Create a disposable guest account with its single session.
    ///
    /// Grants co-ownership of every protected collection that currently
    /// exists (skipping missing ones and existing grants), and schedules a
    /// deferred teardown at session-duration-from-now as a safety net
    /// independent of the sweep and the logout path.
    pub async fn create_guest_account(self: Arc<Self>) -> Result<(Account, Session)> {
        let suffix = Uuid::new_v4().simple().to_string();
        let handle = format!("{}{}", GUEST_HANDLE_PREFIX, &suffix[..12]);

        // Nobody ever logs into a guest account by password; the credential
        // is a hash of a throwaway random value.
        let credential =
            hash_password(&Uuid::new_v4().to_string()).context("Failed to create credential")?;

        let account = self
            .accounts
            .create(&Account::new(
                handle,
                credential,
                "Guest".to_string(),
                AccountKind::Ephemeral,
            ))
            .await
            .context("Failed to create guest account")?;

        for &collection_id in &self.protected_ids {
            match self.collections.get_by_id(collection_id).await {
                Ok(Some(_)) => {
                    if let Err(e) = self.collections.add_owner(collection_id, account.id).await {
                        tracing::warn!(
                            "Failed to grant guest access to collection {}: {:#}",
                            collection_id,
                            e
                        );
                    }
                }
                Ok(None) => {
                    tracing::debug!("Protected collection {} does not exist, skipping", collection_id);
                }
                Err(e) => {
                    tracing::warn!("Failed to look up collection {}: {:#}", collection_id, e);
                }
            }
        }

        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            account_id: account.id,
            account_label: account.display_name.clone(),
            expires_at: now + self.session_cfg.duration(),
            created_at: now,
        };
        let session = self
            .sessions
            .create(&session)
            .await
            .context("Failed to create guest session")?;

        // Deferred teardown fires at exactly session-duration-from-now; it
        // races benignly with logout and the sweep.
        let svc = self.clone();
        let account_id = account.id;
        let session_id = session.id.clone();
        let delay = std::time::Duration::from_secs(self.session_cfg.duration_secs);
        self.scheduler
            .spawn_once("guest-teardown", delay, async move {
                svc.cleanup_guest_account(account_id, Some(&session_id)).await;
            });

        tracing::info!("Created guest account {} ({})", account.id, account.handle);

        Ok((account, session))
    }

    /// Tear down a guest account completely.
    ///
    /// Reclaims its non-protected collections (blobs, photo rows, ownership
    /// rows, collection rows, in that order), drops its ownership of the
    /// protected collections, deletes the session row when one was
    /// supplied, and finally deletes the account row. Idempotent: running
    /// it against an already-deleted account is a quiet no-op.
    pub async fn cleanup_guest_account(
        &self,
        account_id: i64,
        session_id: Option<&str>,
    ) -> CleanupReport {
        let mut report = CleanupReport::default();
        let protected: HashSet<i64> = self.protected_ids.iter().copied().collect();

        let owned = match self.collections.list_by_owner(account_id).await {
            Ok(collections) => collections,
            Err(e) => {
                tracing::error!("Failed to list guest collections: {:#}", e);
                report
                    .failed_steps
                    .push(format!("list guest collections: {}", e));
                Vec::new()
            }
        };

        let doomed_ids: Vec<i64> = owned
            .iter()
            .map(|c| c.id)
            .filter(|id| !protected.contains(id))
            .collect();

        if !doomed_ids.is_empty() {
            let photos = match self.photos.list_by_collections(&doomed_ids).await {
                Ok(photos) => photos,
                Err(e) => {
                    tracing::error!("Failed to list guest photos: {:#}", e);
                    report.failed_steps.push(format!("list guest photos: {}", e));
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
                    tracing::error!("Failed to delete guest photo rows: {:#}", e);
                    report.failed_steps.push(format!("delete photo rows: {}", e));
                }
            }

            if let Err(e) = self
                .collections
                .remove_owners_for_collections(&doomed_ids)
                .await
            {
                tracing::error!("Failed to remove guest ownership rows: {:#}", e);
                report
                    .failed_steps
                    .push(format!("remove ownership rows: {}", e));
            }

            match self.collections.delete_by_ids(&doomed_ids).await {
                Ok(count) => report.collections_deleted += count,
                Err(e) => {
                    tracing::error!("Failed to delete guest collections: {:#}", e);
                    report
                        .failed_steps
                        .push(format!("delete collection rows: {}", e));
                }
            }
        }

        // Protected collections stay; only the guest's ownership rows go
        for &collection_id in &self.protected_ids {
            if let Err(e) = self.collections.remove_owner(collection_id, account_id).await {
                tracing::warn!(
                    "Failed to remove guest ownership of collection {}: {:#}",
                    collection_id,
                    e
                );
            }
        }

        if let Some(session_id) = session_id {
            if let Err(e) = self.sessions.delete(session_id).await {
                tracing::warn!("Failed to delete guest session: {:#}", e);
                report.failed_steps.push(format!("delete session: {}", e));
            }
        }

        // Account row last; storage-level cascades mop up anything missed
        match self.accounts.delete(account_id).await {
            Ok(true) => {
                tracing::info!("Tore down guest account {}", account_id);
            }
            Ok(false) => {
                tracing::debug!("Guest account {} already gone", account_id);
            }
            Err(e) => {
                tracing::error!("Failed to delete guest account row: {:#}", e);
                report.failed_steps.push(format!("delete account: {}", e));
            }
        }

        report
    }

    /// Safety-net sweep: tear down every guest account with no live session.
    ///
    /// Covers guests whose deferred teardown was lost (e.g. process restart
    /// between creation and expiry). Returns the number of accounts torn
    /// down; never returns an error.
    pub async fn cleanup_expired_guest_accounts(&self) -> u64 {
        let guests = match self.accounts.list_by_kind(AccountKind::Ephemeral).await {
            Ok(accounts) => accounts,
            Err(e) => {
                tracing::error!("Failed to list guest accounts: {:#}", e);
                return 0;
            }
        };

        let mut torn_down = 0;
        for guest in guests {
            match self.sessions.count_valid_by_account(guest.id).await {
                Ok(0) => {
                    self.cleanup_guest_account(guest.id, None).await;
                    torn_down += 1;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to check sessions of guest {}: {:#}",
                        guest.id,
                        e
                    );
                }
            }
        }

        if torn_down > 0 {
            tracing::info!("Guest sweep tore down {} account(s)", torn_down);
        }

        torn_down
    }
}
