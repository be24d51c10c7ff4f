//! Service layer
//!
//! Business logic on top of the repositories. The session, temporal,
//! demo-cleanup, and ephemeral services form the session-lifecycle core;
//! the rest are thin validation layers over single-table CRUD.

pub mod account;
pub mod collection;
pub mod comment;
pub mod demo_cleanup;
pub mod ephemeral;
pub mod partnership;
pub mod password;
pub mod photo;
pub mod retry;
pub mod session;
pub mod temporal;

pub use account::{AccountService, AccountServiceError, LoginInput, RegisterInput};
pub use collection::CollectionService;
pub use comment::CommentService;
pub use demo_cleanup::{DemoCleanupService, DemoContentSummary};
pub use ephemeral::EphemeralAccountService;
pub use partnership::PartnershipService;
pub use photo::PhotoService;
pub use session::SessionService;
pub use temporal::{CleanupReport, TemporalContentService, TemporaryContent};

use crate::db::repositories::{CollectionRepository, PartnershipRepository};
use anyhow::Result;
use std::sync::Arc;

/// Error type shared by the content services (collections, photos,
/// comments, partnerships).
///
/// Authorization failures are distinct from authentication failures: a
/// `Forbidden` presupposes a valid session whose account simply lacks
/// ownership of the resource.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// Bad input shape; fail fast, no retry
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Identity is known but lacks access
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// State conflict (e.g. already partnered)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient storage failure after bounded retries; the caller may retry
    #[error("Storage temporarily unavailable: {0}")]
    Retryable(String),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Whether the account may read and write a collection: it owns the
/// collection itself, or its partner does (a partnership shares all
/// collections).
pub(crate) async fn account_can_access_collection(
    collections: &Arc<dyn CollectionRepository>,
    partnerships: &Arc<dyn PartnershipRepository>,
    account_id: i64,
    collection_id: i64,
) -> Result<bool> {
    if collections.is_owner(collection_id, account_id).await? {
        return Ok(true);
    }
    if let Some(partnership) = partnerships.get_by_account(account_id).await? {
        if let Some(partner_id) = partnership.partner_of(account_id) {
            return collections.is_owner(collection_id, partner_id).await;
        }
    }
    Ok(false)
}
