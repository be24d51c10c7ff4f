//! Partnership service
//!
//! Token-based invitations pairing two accounts into a symmetric
//! partnership. An account holds at most one partnership; while partnered
//! it can neither issue nor accept invitations. Acceptance checks both
//! sides before any write, so a conflicting accept has no side effects.

use crate::db::repositories::{AccountRepository, PartnershipRepository};
use crate::models::{InvitationStatus, Partnership, PartnershipInvitation};
use crate::services::ContentError;
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Invitation lifetime
const INVITATION_TTL_DAYS: i64 = 7;

/// Partnerships and invitations
pub struct PartnershipService {
    partnerships: Arc<dyn PartnershipRepository>,
    accounts: Arc<dyn AccountRepository>,
}

impl PartnershipService {
    /// Create a new partnership service
    pub fn new(
        partnerships: Arc<dyn PartnershipRepository>,
        accounts: Arc<dyn AccountRepository>,
    ) -> Self {
        Self {
            partnerships,
            accounts,
        }
    }

    /// Issue an invitation link token.
    ///
    /// Rejected while partnered. An unexpired pending invitation is
    /// returned as-is instead of minting a second token.
    pub async fn invite(&self, account_id: i64) -> Result<PartnershipInvitation, ContentError> {
        if self.partnership_of(account_id).await?.is_some() {
            return Err(ContentError::Conflict(
                "Already in a partnership".to_string(),
            ));
        }

        if let Some(pending) = self
            .partnerships
            .pending_invitation_from(account_id)
            .await
            .context("Failed to check pending invitation")?
        {
            if !pending.is_expired() {
                return Ok(pending);
            }
            // Lazily retire the stale one before issuing a fresh token
            self.partnerships
                .update_invitation_status(pending.id, InvitationStatus::Expired, None)
                .await
                .context("Failed to expire invitation")?;
        }

        let now = Utc::now();
        let invitation = PartnershipInvitation {
            id: 0,
            token: Uuid::new_v4().to_string(),
            from_account_id: account_id,
            to_account_id: None,
            status: InvitationStatus::Pending,
            expires_at: now + Duration::days(INVITATION_TTL_DAYS),
            created_at: now,
        };

        let created = self
            .partnerships
            .create_invitation(&invitation)
            .await
            .context("Failed to create invitation")?;
        Ok(created)
    }

    /// Look up an invitation by token, lazily expiring it when overdue
    pub async fn peek(&self, token: &str) -> Result<PartnershipInvitation, ContentError> {
        let mut invitation = self
            .partnerships
            .get_invitation_by_token(token)
            .await
            .context("Failed to get invitation")?
            .ok_or_else(|| ContentError::NotFound("Invitation not found".to_string()))?;

        if invitation.status == InvitationStatus::Pending && invitation.is_expired() {
            self.partnerships
                .update_invitation_status(invitation.id, InvitationStatus::Expired, None)
                .await
                .context("Failed to expire invitation")?;
            invitation.status = InvitationStatus::Expired;
        }

        Ok(invitation)
    }

    /// Accept an invitation, forming the partnership.
    ///
    /// Fails with no side effects when the invitation is not pending, is
    /// expired, is self-issued, or when either account is already
    /// partnered.
    pub async fn accept(
        &self,
        token: &str,
        account_id: i64,
    ) -> Result<Partnership, ContentError> {
        let invitation = self.peek(token).await?;

        if invitation.status != InvitationStatus::Pending {
            return Err(ContentError::Conflict(format!(
                "Invitation is {}",
                invitation.status
            )));
        }
        if invitation.from_account_id == account_id {
            return Err(ContentError::Validation(
                "Cannot accept your own invitation".to_string(),
            ));
        }
        if self
            .accounts
            .get_by_id(invitation.from_account_id)
            .await
            .context("Failed to look up inviter")?
            .is_none()
        {
            return Err(ContentError::NotFound(
                "Inviting account no longer exists".to_string(),
            ));
        }

        // Both sides must be free before anything is written
        if self.partnership_of(invitation.from_account_id).await?.is_some() {
            return Err(ContentError::Conflict(
                "Inviter is already in a partnership".to_string(),
            ));
        }
        if self.partnership_of(account_id).await?.is_some() {
            return Err(ContentError::Conflict(
                "Already in a partnership".to_string(),
            ));
        }

        // The UNIQUE constraints are the backstop for races between the
        // checks above and this insert.
        let partnership = self
            .partnerships
            .create(invitation.from_account_id, account_id)
            .await
            .context("Failed to create partnership")?;

        self.partnerships
            .update_invitation_status(invitation.id, InvitationStatus::Accepted, Some(account_id))
            .await
            .context("Failed to mark invitation accepted")?;

        Ok(partnership)
    }

    /// Reject an invitation
    pub async fn reject(&self, token: &str, account_id: i64) -> Result<(), ContentError> {
        let invitation = self.peek(token).await?;

        if invitation.status != InvitationStatus::Pending {
            return Err(ContentError::Conflict(format!(
                "Invitation is {}",
                invitation.status
            )));
        }

        self.partnerships
            .update_invitation_status(invitation.id, InvitationStatus::Rejected, Some(account_id))
            .await
            .context("Failed to mark invitation rejected")?;
        Ok(())
    }

    /// The account's partnership, if any
    pub async fn partnership_of(
        &self,
        account_id: i64,
    ) -> Result<Option<Partnership>, ContentError> {
        let partnership = self
            .partnerships
            .get_by_account(account_id)
            .await
            .context("Failed to get partnership")?;
        Ok(partnership)
    }

    /// Dissolve the account's partnership; returns whether one existed
    pub async fn dissolve(&self, account_id: i64) -> Result<bool, ContentError> {
        let existed = self
            .partnerships
            .delete_by_account(account_id)
            .await
            .context("Failed to dissolve partnership")?;
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxAccountRepository, SqlxPartnershipRepository};
    use crate::db::{create_test_pool, migrations, Db};
    use crate::models::{Account, AccountKind};

    struct Fixture {
        service: PartnershipService,
        _pool: Db,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let accounts = SqlxAccountRepository::boxed(pool.clone());
        let partnerships = SqlxPartnershipRepository::boxed(pool.clone());

        for handle in ["alice", "bob", "carol"] {
            accounts
                .create(&Account::new(
                    handle.to_string(),
                    "hash".to_string(),
                    handle.to_uppercase(),
                    AccountKind::Regular,
                ))
                .await
                .unwrap();
        }

        Fixture {
            service: PartnershipService::new(partnerships, accounts),
            _pool: pool,
        }
    }

    #[tokio::test]
    async fn test_invite_accept_roundtrip() {
        let f = setup().await;

        let invitation = f.service.invite(1).await.expect("invite failed");
        assert_eq!(invitation.status, InvitationStatus::Pending);
        assert!(!invitation.is_expired());

        let partnership = f.service.accept(&invitation.token, 2).await.expect("accept failed");
        assert_eq!(partnership.partner_of(1), Some(2));

        // Both sides now see the partnership
        assert!(f.service.partnership_of(1).await.unwrap().is_some());
        assert!(f.service.partnership_of(2).await.unwrap().is_some());

        // The invitation is marked accepted with the claiming account
        let peeked = f.service.peek(&invitation.token).await.unwrap();
        assert_eq!(peeked.status, InvitationStatus::Accepted);
        assert_eq!(peeked.to_account_id, Some(2));
    }

    #[tokio::test]
    async fn test_invite_while_partnered_rejected() {
        let f = setup().await;

        let invitation = f.service.invite(1).await.unwrap();
        f.service.accept(&invitation.token, 2).await.unwrap();

        assert!(matches!(
            f.service.invite(1).await,
            Err(ContentError::Conflict(_))
        ));
        assert!(matches!(
            f.service.invite(2).await,
            Err(ContentError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_invite_is_idempotent_while_pending() {
        let f = setup().await;

        let first = f.service.invite(1).await.unwrap();
        let second = f.service.invite(1).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.token, second.token);
    }

    #[tokio::test]
    async fn test_accept_with_partnered_party_has_no_side_effects() {
        let f = setup().await;

        // Carol issues an invitation while Alice and Bob pair up
        let carols = f.service.invite(3).await.unwrap();
        let alices = f.service.invite(1).await.unwrap();
        f.service.accept(&alices.token, 2).await.unwrap();

        // Bob, already partnered, tries to accept Carol's invitation
        let result = f.service.accept(&carols.token, 2).await;
        assert!(matches!(result, Err(ContentError::Conflict(_))));

        // No partnership row was created for Carol, invitation untouched
        assert!(f.service.partnership_of(3).await.unwrap().is_none());
        let peeked = f.service.peek(&carols.token).await.unwrap();
        assert_eq!(peeked.status, InvitationStatus::Pending);
        assert!(peeked.to_account_id.is_none());
    }

    #[tokio::test]
    async fn test_accept_own_invitation_rejected() {
        let f = setup().await;

        let invitation = f.service.invite(1).await.unwrap();
        assert!(matches!(
            f.service.accept(&invitation.token, 1).await,
            Err(ContentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_invitation_not_acceptable() {
        let f = setup().await;

        let invitation = f.service.invite(1).await.unwrap();
        // Push the expiry into the past
        sqlx::query("UPDATE partnership_invitations SET expires_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::seconds(1))
            .bind(invitation.id)
            .execute(f._pool.as_sqlite().unwrap())
            .await
            .unwrap();

        let peeked = f.service.peek(&invitation.token).await.unwrap();
        assert_eq!(peeked.status, InvitationStatus::Expired);

        assert!(matches!(
            f.service.accept(&invitation.token, 2).await,
            Err(ContentError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_reject_and_dissolve() {
        let f = setup().await;

        let invitation = f.service.invite(1).await.unwrap();
        f.service.reject(&invitation.token, 2).await.expect("reject failed");

        let peeked = f.service.peek(&invitation.token).await.unwrap();
        assert_eq!(peeked.status, InvitationStatus::Rejected);

        // Rejecting again conflicts
        assert!(matches!(
            f.service.reject(&invitation.token, 2).await,
            Err(ContentError::Conflict(_))
        ));

        // A fresh invitation can now be issued and accepted
        let invitation = f.service.invite(1).await.unwrap();
        f.service.accept(&invitation.token, 2).await.unwrap();

        assert!(f.service.dissolve(1).await.unwrap());
        assert!(!f.service.dissolve(1).await.unwrap());
        assert!(f.service.partnership_of(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let f = setup().await;
        assert!(matches!(
            f.service.peek("no-such-token").await,
            Err(ContentError::NotFound(_))
        ));
    }
}
