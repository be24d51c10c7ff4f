//! Account service
//!
//! Registration, login, logout, and session validation for regular
//! accounts. Session lifecycle itself lives in the session service; this
//! layer owns credentials and account records.

use crate::db::repositories::AccountRepository;
use crate::models::account::GUEST_HANDLE_PREFIX;
use crate::models::{Account, AccountKind, Session};
use crate::services::password::{hash_password, verify_password};
use crate::services::session::SessionService;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Error types for account operations
#[derive(Debug, thiserror::Error)]
pub enum AccountServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Handle already taken
    #[error("Account already exists: {0}")]
    AccountExists(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Input for account registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub handle: String,
    pub password: String,
    pub display_name: String,
}

impl RegisterInput {
    /// Create a new registration input
    pub fn new(
        handle: impl Into<String>,
        password: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            handle: handle.into(),
            password: password.into(),
            display_name: display_name.into(),
        }
    }
}

/// Input for login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub handle: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(handle: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            password: password.into(),
        }
    }
}

/// Account management and authentication
pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<SessionService>,
}

impl AccountService {
    /// Create a new account service
    pub fn new(accounts: Arc<dyn AccountRepository>, sessions: Arc<SessionService>) -> Self {
        Self { accounts, sessions }
    }

    /// Register a new regular account
    pub async fn register(&self, input: RegisterInput) -> Result<Account, AccountServiceError> {
        self.validate_register_input(&input)?;

        if self
            .accounts
            .get_by_handle(&input.handle)
            .await
            .context("Failed to check handle")?
            .is_some()
        {
            return Err(AccountServiceError::AccountExists(format!(
                "Handle '{}' is already taken",
                input.handle
            )));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let display_name = if input.display_name.trim().is_empty() {
            input.handle.clone()
        } else {
            input.display_name.trim().to_string()
        };

        let account = Account::new(
            input.handle,
            password_hash,
            display_name,
            AccountKind::Regular,
        );

        let created = self
            .accounts
            .create(&account)
            .await
            .context("Failed to create account")?;

        Ok(created)
    }

    /// Login with credentials; returns a fresh session
    pub async fn login(&self, input: LoginInput) -> Result<Session, AccountServiceError> {
        let account = self
            .accounts
            .get_by_handle(&input.handle)
            .await
            .context("Failed to look up account")?
            .ok_or_else(|| {
                AccountServiceError::AuthenticationError(
                    "Invalid handle or password".to_string(),
                )
            })?;

        let password_valid = verify_password(&input.password, &account.password_hash)
            .context("Failed to verify password")?;

        if !password_valid {
            return Err(AccountServiceError::AuthenticationError(
                "Invalid handle or password".to_string(),
            ));
        }

        let session = self
            .sessions
            .create(&account)
            .await
            .context("Failed to create session")?;

        Ok(session)
    }

    /// Logout: delete the session (routed teardown applies for demo and
    /// guest sessions)
    pub async fn logout(&self, session_id: &str) {
        self.sessions.delete(session_id).await;
    }

    /// Resolve a session token to its account and (possibly touched)
    /// session. `None` for missing, expired, or orphaned sessions.
    pub async fn authenticate(&self, session_id: &str) -> Option<(Account, Session)> {
        let session = self.sessions.get(session_id).await?;
        match self.accounts.get_by_id(session.account_id).await {
            Ok(Some(account)) => Some((account, session)),
            Ok(None) => None,
            Err(e) => {
                tracing::error!("Account lookup failed: {:#}", e);
                None
            }
        }
    }

    /// Get an account by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Account>, AccountServiceError> {
        let account = self
            .accounts
            .get_by_id(id)
            .await
            .context("Failed to get account")?;
        Ok(account)
    }

    /// Update display name and avatar
    pub async fn update_account(&self, account: Account) -> Result<Account, AccountServiceError> {
        let updated = self
            .accounts
            .update(&account)
            .await
            .context("Failed to update account")?;
        Ok(updated)
    }

    fn validate_register_input(&self, input: &RegisterInput) -> Result<(), AccountServiceError> {
        let handle = input.handle.trim();
        if handle.is_empty() {
            return Err(AccountServiceError::ValidationError(
                "Handle cannot be empty".to_string(),
            ));
        }
        if handle.len() > 64 {
            return Err(AccountServiceError::ValidationError(
                "Handle is too long".to_string(),
            ));
        }
        if !handle
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AccountServiceError::ValidationError(
                "Handle may only contain letters, digits, '-' and '_'".to_string(),
            ));
        }
        if handle.starts_with(GUEST_HANDLE_PREFIX) {
            return Err(AccountServiceError::ValidationError(
                "This handle prefix is reserved".to_string(),
            ));
        }
        if input.password.len() < 8 {
            return Err(AccountServiceError::ValidationError(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        SqlxAccountRepository, SqlxCollectionRepository, SqlxPhotoRepository,
        SqlxSessionRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::scheduler::Scheduler;
    use crate::services::demo_cleanup::DemoCleanupService;
    use crate::services::ephemeral::EphemeralAccountService;
    use crate::services::temporal::TemporalContentService;
    use crate::storage::FsBlobStore;
    use crate::config::SessionConfig;

    async fn setup() -> (tempfile::TempDir, AccountService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let blobs = FsBlobStore::shared(dir.path().join("blobs"));
        let accounts = SqlxAccountRepository::boxed(pool.clone());
        let sessions = SqlxSessionRepository::boxed(pool.clone());
        let collections = SqlxCollectionRepository::boxed(pool.clone());
        let photos = SqlxPhotoRepository::boxed(pool.clone());

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
            vec![1],
        ));
        let ephemeral = Arc::new(EphemeralAccountService::new(
            accounts.clone(),
            sessions.clone(),
            collections.clone(),
            photos.clone(),
            blobs,
            Arc::new(Scheduler::new()),
            SessionConfig::default(),
            vec![1],
        ));
        let session_service = Arc::new(SessionService::new(
            sessions,
            accounts.clone(),
            temporal,
            demo_cleanup,
            ephemeral,
            SessionConfig::default(),
        ));

        (dir, AccountService::new(accounts, session_service))
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let (_dir, service) = setup().await;

        let account = service
            .register(RegisterInput::new("alice", "password123", "Alice"))
            .await
            .expect("register failed");
        assert_eq!(account.handle, "alice");
        assert_eq!(account.kind, AccountKind::Regular);
        assert!(account.password_hash.starts_with("$argon2id$"));

        let session = service
            .login(LoginInput::new("alice", "password123"))
            .await
            .expect("login failed");
        assert!(!session.is_expired());

        let (auth_account, auth_session) = service
            .authenticate(&session.id)
            .await
            .expect("authenticate failed");
        assert_eq!(auth_account.id, account.id);
        assert_eq!(auth_session.id, session.id);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let (_dir, service) = setup().await;

        for (handle, password) in [
            ("", "password123"),
            ("has spaces", "password123"),
            ("alice", "short"),
            ("guest-abc", "password123"),
        ] {
            let result = service
                .register(RegisterInput::new(handle, password, ""))
                .await;
            assert!(
                matches!(result, Err(AccountServiceError::ValidationError(_))),
                "expected validation error for {:?}",
                handle
            );
        }
    }

    #[tokio::test]
    async fn test_register_duplicate_handle() {
        let (_dir, service) = setup().await;

        service
            .register(RegisterInput::new("alice", "password123", "Alice"))
            .await
            .unwrap();
        let result = service
            .register(RegisterInput::new("alice", "password456", "Other"))
            .await;
        assert!(matches!(result, Err(AccountServiceError::AccountExists(_))));
    }

    #[tokio::test]
    async fn test_login_failures() {
        let (_dir, service) = setup().await;

        service
            .register(RegisterInput::new("alice", "password123", "Alice"))
            .await
            .unwrap();

        let result = service.login(LoginInput::new("alice", "wrong-password")).await;
        assert!(matches!(
            result,
            Err(AccountServiceError::AuthenticationError(_))
        ));

        let result = service.login(LoginInput::new("nobody", "password123")).await;
        assert!(matches!(
            result,
            Err(AccountServiceError::AuthenticationError(_))
        ));
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_dir, service) = setup().await;

        service
            .register(RegisterInput::new("alice", "password123", "Alice"))
            .await
            .unwrap();
        let session = service
            .login(LoginInput::new("alice", "password123"))
            .await
            .unwrap();

        service.logout(&session.id).await;
        assert!(service.authenticate(&session.id).await.is_none());

        // Logging out a dead session is harmless
        service.logout(&session.id).await;
    }

    #[tokio::test]
    async fn test_empty_display_name_falls_back_to_handle() {
        let (_dir, service) = setup().await;

        let account = service
            .register(RegisterInput::new("alice", "password123", "  "))
            .await
            .unwrap();
        assert_eq!(account.display_name, "alice");
    }
}
