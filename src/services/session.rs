//! Session store
//!
//! The authoritative lifecycle of sessions: creation on login, lazy expiry
//! and touch-to-renew on every read, explicit renewal with a fresh token,
//! kind-routed deletion, and the periodic expiry sweep.
//!
//! Failure semantics: `create` propagates storage errors so a login can
//! fail loudly; every other operation fails closed, logging the error and
//! treating the session as absent. An unauthenticated answer is always
//! safe, a spuriously authenticated one never is.

use crate::config::SessionConfig;
use crate::db::repositories::{AccountRepository, SessionRepository};
use crate::models::{Account, AccountKind, Session};
use crate::services::demo_cleanup::DemoCleanupService;
use crate::services::ephemeral::EphemeralAccountService;
use crate::services::temporal::TemporalContentService;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

/// Session store with expiry, renewal, and routed deletion
pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    accounts: Arc<dyn AccountRepository>,
    temporal: Arc<TemporalContentService>,
    demo_cleanup: Arc<DemoCleanupService>,
    ephemeral: Arc<EphemeralAccountService>,
    cfg: SessionConfig,
}

impl SessionService {
    /// Create a new session service
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        accounts: Arc<dyn AccountRepository>,
        temporal: Arc<TemporalContentService>,
        demo_cleanup: Arc<DemoCleanupService>,
        ephemeral: Arc<EphemeralAccountService>,
        cfg: SessionConfig,
    ) -> Self {
        Self {
            sessions,
            accounts,
            temporal,
            demo_cleanup,
            ephemeral,
            cfg,
        }
    }

    /// The session configuration (thresholds are part of the client
    /// contract and get echoed in auth responses)
    pub fn config(&self) -> &SessionConfig {
        &self.cfg
    }

    /// Issue a new session for an account.
    ///
    /// Storage errors propagate; the caller surfaces a login failure.
    pub async fn create(&self, account: &Account) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            account_id: account.id,
            account_label: account.display_name.clone(),
            expires_at: now + self.cfg.duration(),
            created_at: now,
        };

        self.sessions
            .create(&session)
            .await
            .context("Failed to create session")
    }

    /// Look up a live session.
    ///
    /// Lazy expiry: a stale row is deleted first and `None` returned.
    /// Touch-to-renew: a read inside the renewal window silently pushes
    /// the expiry forward to a full duration. Storage errors are logged
    /// and mapped to `None` (fail closed).
    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let session = match self.sessions.get_by_id(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Session lookup failed: {:#}", e);
                return None;
            }
        };

        if session.is_expired() {
            // Reclaim content synchronously so blob keys are not lost to
            // the cascade, then drop the row.
            self.temporal
                .delete_temporary_content_for_session(session_id)
                .await;
            if let Err(e) = self.sessions.delete(session_id).await {
                tracing::warn!("Failed to reap expired session: {:#}", e);
            }
            return None;
        }

        if session.remaining() < self.cfg.renewal_threshold() {
            let new_expiry = Utc::now() + self.cfg.duration();
            match self.sessions.update_expiry(session_id, new_expiry).await {
                Ok(true) => {
                    // Temporary content follows the implicit renewal so it
                    // never expires ahead of its session.
                    if let Err(e) = self
                        .temporal
                        .extend_temporary_content_expiration(session_id, new_expiry)
                        .await
                    {
                        tracing::warn!("Failed to extend temporary content: {:#}", e);
                    }
                    return Some(Session {
                        expires_at: new_expiry,
                        ..session
                    });
                }
                Ok(false) => {
                    // Raced with a delete; the row is gone
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Failed to touch session: {:#}", e);
                    // The un-touched session is still valid
                }
            }
        }

        Some(session)
    }

    /// Delete a session, routed by the owning account's kind.
    ///
    /// Guest sessions tear down the whole account; demo sessions trigger
    /// the demo content cleanup first; regular sessions reclaim their
    /// temporary content and drop the row. Errors are logged and reported
    /// as `false`.
    pub async fn delete(&self, session_id: &str) -> bool {
        let session = match self.sessions.get_by_id(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!("Session lookup for delete failed: {:#}", e);
                return false;
            }
        };

        let kind = match self.accounts.get_by_id(session.account_id).await {
            Ok(Some(account)) => account.kind,
            Ok(None) => AccountKind::Regular,
            Err(e) => {
                tracing::error!("Account lookup for session delete failed: {:#}", e);
                AccountKind::Regular
            }
        };

        match kind {
            AccountKind::Ephemeral => {
                // Account teardown cascades the session row as a backstop
                // and deletes it explicitly anyway.
                self.ephemeral
                    .cleanup_guest_account(session.account_id, Some(session_id))
                    .await;
                true
            }
            AccountKind::Demo => {
                self.demo_cleanup
                    .cleanup_demo_content_for_session(session_id)
                    .await;
                self.temporal
                    .delete_temporary_content_for_session(session_id)
                    .await;
                self.delete_row(session_id).await
            }
            AccountKind::Regular => {
                self.temporal
                    .delete_temporary_content_for_session(session_id)
                    .await;
                self.delete_row(session_id).await
            }
        }
    }

    /// Renew a session: issue a fresh token and carry the temporary content
    /// over to it.
    ///
    /// The old row is deleted bare, never routed, so renewal can't tear
    /// down an account. Returns the fresh session, or `None` when the old
    /// one is already gone.
    pub async fn renew(&self, session_id: &str) -> Option<Session> {
        let old = self.get(session_id).await?;

        let account = match self.accounts.get_by_id(old.account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return None,
            Err(e) => {
                tracing::error!("Account lookup for renewal failed: {:#}", e);
                return None;
            }
        };

        let fresh = match self.create(&account).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to create renewed session: {:#}", e);
                return None;
            }
        };

        // Content moves to the fresh row before the old one goes away;
        // otherwise the cascade would reclaim it mid-renewal.
        if let Err(e) = self
            .temporal
            .transfer_temporary_content(session_id, &fresh.id, fresh.expires_at)
            .await
        {
            tracing::error!("Failed to carry temporary content over: {:#}", e);
        }

        self.delete_row(session_id).await;

        Some(fresh)
    }

    /// Bulk-delete expired session rows.
    ///
    /// Runs on the sweep (after temporary-content cleanup) and once at
    /// startup. Never returns an error.
    pub async fn clean_expired_sessions(&self) -> u64 {
        match self.sessions.delete_expired().await {
            Ok(count) => {
                if count > 0 {
                    tracing::info!("Session sweep removed {} row(s)", count);
                }
                count
            }
            Err(e) => {
                tracing::error!("Session sweep failed: {:#}", e);
                0
            }
        }
    }

    async fn delete_row(&self, session_id: &str) -> bool {
        match self.sessions.delete(session_id).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::error!("Failed to delete session row: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CollectionRepository, PhotoRepository, SqlxAccountRepository, SqlxCollectionRepository,
        SqlxPhotoRepository, SqlxSessionRepository,
    };
    use crate::db::{create_test_pool, migrations, Db};
    use crate::models::{Collection, CollectionKind, Photo};
    use crate::scheduler::Scheduler;
    use crate::storage::{BlobStore, DynBlobStore, FsBlobStore};
    use chrono::Duration;

    struct Fixture {
        service: SessionService,
        ephemeral: Arc<EphemeralAccountService>,
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionRepository>,
        collections: Arc<dyn CollectionRepository>,
        photos: Arc<dyn PhotoRepository>,
        blobs: DynBlobStore,
        _dir: tempfile::TempDir,
        _pool: Db,
    }

    fn short_session_cfg() -> SessionConfig {
        SessionConfig {
            duration_secs: 600,
            renewal_threshold_secs: 180,
            warning_secs: 120,
            critical_secs: 30,
            sweep_interval_secs: 60,
        }
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blobs: DynBlobStore = FsBlobStore::shared(dir.path().join("blobs"));
        let accounts = SqlxAccountRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let collections = SqlxCollectionRepository::boxed(pool.clone());
        let photos = SqlxPhotoRepository::boxed(pool.clone());

        // Only collection id 1 is protected in these tests
        let protected_ids = vec![1];
        let temporal = Arc::new(TemporalContentService::new(
            collections.clone(),
            photos.clone(),
            blobs.clone(),
        ));
        let demo_cleanup = Arc::new(DemoCleanupService::new(
            accounts.clone(),
            sessions.clone(),
            collections.clone(),
            photos.clone(),
            blobs.clone(),
            protected_ids.clone(),
        ));
        let ephemeral = Arc::new(EphemeralAccountService::new(
            accounts.clone(),
            sessions.clone(),
            collections.clone(),
            photos.clone(),
            blobs.clone(),
            Arc::new(Scheduler::new()),
            short_session_cfg(),
            protected_ids,
        ));

        let service = SessionService::new(
            sessions.clone(),
            accounts.clone(),
            temporal,
            demo_cleanup,
            ephemeral.clone(),
            short_session_cfg(),
        );

        Fixture {
            service,
            ephemeral,
            accounts,
            sessions,
            collections,
            photos,
            blobs,
            _dir: dir,
            _pool: pool,
        }
    }

    async fn seed_account(f: &Fixture, handle: &str, kind: AccountKind) -> Account {
        f.accounts
            .create(&Account::new(
                handle.to_string(),
                "hash".to_string(),
                handle.to_uppercase(),
                kind,
            ))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let f = setup().await;
        let account = seed_account(&f, "alice", AccountKind::Regular).await;

        let session = f.service.create(&account).await.expect("create failed");
        assert_eq!(session.account_id, account.id);
        assert_eq!(session.account_label, "ALICE");

        let found = f.service.get(&session.id).await.expect("session missing");
        assert_eq!(found.id, session.id);
        // Far from expiry, the read does not touch
        assert_eq!(found.expires_at, session.expires_at);

        assert!(f.service.get("missing-token").await.is_none());
    }

    #[tokio::test]
    async fn test_lazy_expiry_reaps_row() {
        let f = setup().await;
        let account = seed_account(&f, "alice", AccountKind::Regular).await;

        let session = f.service.create(&account).await.unwrap();
        f.sessions
            .update_expiry(&session.id, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        // The stale row is deleted on read, not just hidden
        assert!(f.service.get(&session.id).await.is_none());
        assert!(f.sessions.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_to_renew_inside_window() {
        let f = setup().await;
        let account = seed_account(&f, "alice", AccountKind::Regular).await;

        let session = f.service.create(&account).await.unwrap();
        let c = f
            .collections
            .create(&Collection {
                id: 0,
                name: "Scratch".into(),
                description: None,
                kind: CollectionKind::Custom,
                is_temporary: true,
                session_id: Some(session.id.clone()),
                expires_at: Some(session.expires_at),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        // Push the session deep into the renewal window (2 min left of 10)
        let near_expiry = Utc::now() + Duration::seconds(120);
        f.sessions
            .update_expiry(&session.id, near_expiry)
            .await
            .unwrap();

        let touched = f.service.get(&session.id).await.expect("session missing");

        // Expiry bounced back to a full duration, not the original value
        let expected = Utc::now() + f.service.config().duration();
        assert!((touched.expires_at - expected).num_seconds().abs() < 2);
        assert!(touched.expires_at > near_expiry);

        // The row itself was updated
        let row = f.sessions.get_by_id(&session.id).await.unwrap().unwrap();
        assert!((row.expires_at - expected).num_seconds().abs() < 2);

        // Temporary content moved in lockstep
        let content = f.collections.get_by_id(c.id).await.unwrap().unwrap();
        assert!((content.expires_at.unwrap() - touched.expires_at)
            .num_seconds()
            .abs()
            < 2);
    }

    #[tokio::test]
    async fn test_delete_regular_reclaims_temporary_content() {
        let f = setup().await;
        let account = seed_account(&f, "alice", AccountKind::Regular).await;
        let session = f.service.create(&account).await.unwrap();

        let c = f
            .collections
            .create(&Collection {
                id: 0,
                name: "Scratch".into(),
                description: None,
                kind: CollectionKind::Custom,
                is_temporary: true,
                session_id: Some(session.id.clone()),
                expires_at: Some(session.expires_at),
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        let key = f.blobs.put(b"bytes", "jpg").await.unwrap();
        f.photos
            .create(&Photo {
                id: 0,
                collection_id: c.id,
                title: "p".into(),
                description: None,
                storage_key: key.clone(),
                content_type: "image/jpeg".into(),
                liked: false,
                is_temporary: true,
                session_id: Some(session.id.clone()),
                expires_at: Some(session.expires_at),
                uploaded_at: Utc::now(),
            })
            .await
            .unwrap();

        assert!(f.service.delete(&session.id).await);

        assert!(f.sessions.get_by_id(&session.id).await.unwrap().is_none());
        assert!(f.collections.get_by_id(c.id).await.unwrap().is_none());
        assert!(!f.blobs.exists(&key).await);
        // Account itself is untouched
        assert!(f.accounts.get_by_id(account.id).await.unwrap().is_some());

        // Double delete reports false
        assert!(!f.service.delete(&session.id).await);
    }

    #[tokio::test]
    async fn test_delete_routes_guest_to_full_teardown() {
        let f = setup().await;

        let (guest, session) = f.ephemeral.clone().create_guest_account().await.unwrap();

        assert!(f.service.delete(&session.id).await);

        assert!(f.accounts.get_by_id(guest.id).await.unwrap().is_none());
        assert!(f.sessions.get_by_id(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_routes_demo_to_scoped_cleanup() {
        let f = setup().await;
        let demo = seed_account(&f, "demo", AccountKind::Demo).await;
        let session = f.service.create(&demo).await.unwrap();

        // Protected collection (id 1) and a scratch one created mid-session
        let protected = f
            .collections
            .create(&Collection {
                id: 0,
                name: "Showcase".into(),
                description: None,
                kind: CollectionKind::Favorites,
                is_temporary: false,
                session_id: None,
                expires_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(protected.id, 1);
        f.collections.add_owner(protected.id, demo.id).await.unwrap();

        let scratch = f
            .collections
            .create(&Collection {
                id: 0,
                name: "Scratch".into(),
                description: None,
                kind: CollectionKind::Custom,
                is_temporary: false,
                session_id: None,
                expires_at: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        f.collections.add_owner(scratch.id, demo.id).await.unwrap();

        assert!(f.service.delete(&session.id).await);

        // Scratch content is gone, the protected collection remains owned
        assert!(f.collections.get_by_id(scratch.id).await.unwrap().is_none());
        assert!(f.collections.get_by_id(protected.id).await.unwrap().is_some());
        assert!(f.collections.is_owner(protected.id, demo.id).await.unwrap());
        // Demo account survives its sessions
        assert!(f.accounts.get_by_id(demo.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_renew_issues_fresh_token_and_moves_content() {
        let f = setup().await;
        let account = seed_account(&f, "alice", AccountKind::Regular).await;
        let session = f.service.create(&account).await.unwrap();

        let c = f
            .collections
            .create(&Collection {
                id: 0,
                name: "Trip".into(),
                description: None,
                kind: CollectionKind::Travels,
                is_temporary: true,
                session_id: Some(session.id.clone()),
                expires_at: Some(session.expires_at),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let fresh = f.service.renew(&session.id).await.expect("renew failed");

        assert_ne!(fresh.id, session.id);
        assert_eq!(fresh.account_id, account.id);
        assert!(fresh.expires_at >= session.expires_at);

        // Old token is dead, account survived (bare delete, not routed)
        assert!(f.service.get(&session.id).await.is_none());
        assert!(f.accounts.get_by_id(account.id).await.unwrap().is_some());

        // Content followed the fresh session and carries its expiry
        let moved = f.collections.get_by_id(c.id).await.unwrap().unwrap();
        assert_eq!(moved.session_id.as_deref(), Some(fresh.id.as_str()));
        assert!((moved.expires_at.unwrap() - fresh.expires_at).num_seconds().abs() < 2);

        // Renewing a dead token yields nothing
        assert!(f.service.renew(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let f = setup().await;
        let account = seed_account(&f, "alice", AccountKind::Regular).await;

        let dead = f.service.create(&account).await.unwrap();
        let live = f.service.create(&account).await.unwrap();
        f.sessions
            .update_expiry(&dead.id, Utc::now() - Duration::seconds(1))
            .await
            .unwrap();

        assert_eq!(f.service.clean_expired_sessions().await, 1);
        assert!(f.sessions.get_by_id(&dead.id).await.unwrap().is_none());
        assert!(f.sessions.get_by_id(&live.id).await.unwrap().is_some());
    }
}
