//! Partnership repository
//!
//! Database operations for partnerships and their token-based invitations.

use crate::config::DatabaseDriver;
use crate::db::Db;
use crate::models::{InvitationStatus, Partnership, PartnershipInvitation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;
use std::sync::Arc;

/// Partnership repository trait
#[async_trait]
pub trait PartnershipRepository: Send + Sync {
    /// Insert a partnership row; fails if either account is already paired
    async fn create(&self, account_a: i64, account_b: i64) -> Result<Partnership>;

    /// The partnership an account belongs to, if any
    async fn get_by_account(&self, account_id: i64) -> Result<Option<Partnership>>;

    /// Dissolve an account's partnership; returns whether a row existed
    async fn delete_by_account(&self, account_id: i64) -> Result<bool>;

    /// Insert a new invitation
    async fn create_invitation(
        &self,
        invitation: &PartnershipInvitation,
    ) -> Result<PartnershipInvitation>;

    /// Get an invitation by its token
    async fn get_invitation_by_token(&self, token: &str)
        -> Result<Option<PartnershipInvitation>>;

    /// Update an invitation's status (and claiming account); returns whether
    /// a row changed
    async fn update_invitation_status(
        &self,
        id: i64,
        status: InvitationStatus,
        to_account_id: Option<i64>,
    ) -> Result<bool>;

    /// The pending invitation issued by an account, if any
    async fn pending_invitation_from(
        &self,
        account_id: i64,
    ) -> Result<Option<PartnershipInvitation>>;
}

/// SQLx-based partnership repository supporting SQLite and MySQL
pub struct SqlxPartnershipRepository {
    pool: Db,
}

impl SqlxPartnershipRepository {
    /// Create a new SQLx partnership repository
    pub fn new(pool: Db) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for dependency injection
    pub fn boxed(pool: Db) -> Arc<dyn PartnershipRepository> {
        Arc::new(Self::new(pool))
    }
}

fn row_to_partnership_sqlite(row: &sqlx::sqlite::SqliteRow) -> Partnership {
    Partnership {
        id: row.get("id"),
        account_a: row.get("account_a"),
        account_b: row.get("account_b"),
        created_at: row.get("created_at"),
    }
}

fn row_to_partnership_mysql(row: &sqlx::mysql::MySqlRow) -> Partnership {
    let created_at: DateTime<Utc> = row.get("created_at");
    Partnership {
        id: row.get("id"),
        account_a: row.get("account_a"),
        account_b: row.get("account_b"),
        created_at,
    }
}

fn row_to_invitation_sqlite(row: &sqlx::sqlite::SqliteRow) -> Result<PartnershipInvitation> {
    let status: String = row.get("status");
    Ok(PartnershipInvitation {
        id: row.get("id"),
        token: row.get("token"),
        from_account_id: row.get("from_account_id"),
        to_account_id: row.get("to_account_id"),
        status: InvitationStatus::from_str(&status)?,
        expires_at: row.get("expires_at"),
        created_at: row.get("created_at"),
    })
}

fn row_to_invitation_mysql(row: &sqlx::mysql::MySqlRow) -> Result<PartnershipInvitation> {
    let status: String = row.get("status");
    let expires_at: DateTime<Utc> = row.get("expires_at");
    let created_at: DateTime<Utc> = row.get("created_at");
    Ok(PartnershipInvitation {
        id: row.get("id"),
        token: row.get("token"),
        from_account_id: row.get("from_account_id"),
        to_account_id: row.get("to_account_id"),
        status: InvitationStatus::from_str(&status)?,
        expires_at,
        created_at,
    })
}

const INVITATION_COLUMNS: &str =
    "id, token, from_account_id, to_account_id, status, expires_at, created_at";

#[async_trait]
impl PartnershipRepository for SqlxPartnershipRepository {
    async fn create(&self, account_a: i64, account_b: i64) -> Result<Partnership> {
        let now = Utc::now();
        let sql = "INSERT INTO partnerships (account_a, account_b, created_at) VALUES (?, ?, ?)";
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(account_a)
                .bind(account_b)
                .bind(now)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to create partnership")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(account_a)
                .bind(account_b)
                .bind(now)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to create partnership")?
                .last_insert_id() as i64,
        };

        Ok(Partnership {
            id,
            account_a,
            account_b,
            created_at: now,
        })
    }

    async fn get_by_account(&self, account_id: i64) -> Result<Option<Partnership>> {
        let sql = r#"
            SELECT id, account_a, account_b, created_at
            FROM partnerships
            WHERE account_a = ? OR account_b = ?
        "#;
        let partnership = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(account_id)
                .bind(account_id)
                .fetch_optional(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to get partnership")?
                .map(|row| row_to_partnership_sqlite(&row)),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(account_id)
                .bind(account_id)
                .fetch_optional(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to get partnership")?
                .map(|row| row_to_partnership_mysql(&row)),
        };
        Ok(partnership)
    }

    async fn delete_by_account(&self, account_id: i64) -> Result<bool> {
        let sql = "DELETE FROM partnerships WHERE account_a = ? OR account_b = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(account_id)
                .bind(account_id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to delete partnership")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(account_id)
                .bind(account_id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to delete partnership")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn create_invitation(
        &self,
        invitation: &PartnershipInvitation,
    ) -> Result<PartnershipInvitation> {
        let sql = r#"
            INSERT INTO partnership_invitations (token, from_account_id, to_account_id, status, expires_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
        "#;
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&invitation.token)
                .bind(invitation.from_account_id)
                .bind(invitation.to_account_id)
                .bind(invitation.status.to_string())
                .bind(invitation.expires_at)
                .bind(invitation.created_at)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to create invitation")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&invitation.token)
                .bind(invitation.from_account_id)
                .bind(invitation.to_account_id)
                .bind(invitation.status.to_string())
                .bind(invitation.expires_at)
                .bind(invitation.created_at)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to create invitation")?
                .last_insert_id() as i64,
        };

        Ok(PartnershipInvitation {
            id,
            ..invitation.clone()
        })
    }

    async fn get_invitation_by_token(
        &self,
        token: &str,
    ) -> Result<Option<PartnershipInvitation>> {
        let sql = format!(
            "SELECT {} FROM partnership_invitations WHERE token = ?",
            INVITATION_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(token)
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get invitation")?;
                row.as_ref().map(row_to_invitation_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(token)
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get invitation")?;
                row.as_ref().map(row_to_invitation_mysql).transpose()
            }
        }
    }

    async fn update_invitation_status(
        &self,
        id: i64,
        status: InvitationStatus,
        to_account_id: Option<i64>,
    ) -> Result<bool> {
        let sql = r#"
            UPDATE partnership_invitations
            SET status = ?, to_account_id = COALESCE(?, to_account_id)
            WHERE id = ?
        "#;
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(status.to_string())
                .bind(to_account_id)
                .bind(id)
                .execute(self.pool.as_sqlite().unwrap())
                .await
                .context("Failed to update invitation")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(status.to_string())
                .bind(to_account_id)
                .bind(id)
                .execute(self.pool.as_mysql().unwrap())
                .await
                .context("Failed to update invitation")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn pending_invitation_from(
        &self,
        account_id: i64,
    ) -> Result<Option<PartnershipInvitation>> {
        let sql = format!(
            "SELECT {} FROM partnership_invitations WHERE from_account_id = ? AND status = ? ORDER BY id DESC LIMIT 1",
            INVITATION_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&sql)
                    .bind(account_id)
                    .bind(InvitationStatus::Pending.to_string())
                    .fetch_optional(self.pool.as_sqlite().unwrap())
                    .await
                    .context("Failed to get pending invitation")?;
                row.as_ref().map(row_to_invitation_sqlite).transpose()
            }
            DatabaseDriver::Mysql => {
                let row = sqlx::query(&sql)
                    .bind(account_id)
                    .bind(InvitationStatus::Pending.to_string())
                    .fetch_optional(self.pool.as_mysql().unwrap())
                    .await
                    .context("Failed to get pending invitation")?;
                row.as_ref().map(row_to_invitation_mysql).transpose()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::Duration;

    async fn setup() -> (Db, SqlxPartnershipRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxPartnershipRepository::new(pool.clone());
        (pool, repo)
    }

    async fn seed_accounts(pool: &Db, count: i64) {
        for id in 1..=count {
            sqlx::query(
                "INSERT INTO accounts (id, handle, password_hash, display_name, kind) VALUES (?, ?, 'h', 'A', 'regular')",
            )
            .bind(id)
            .bind(format!("account{}", id))
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        }
    }

    fn test_invitation(from: i64) -> PartnershipInvitation {
        PartnershipInvitation {
            id: 0,
            token: uuid::Uuid::new_v4().to_string(),
            from_account_id: from,
            to_account_id: None,
            status: InvitationStatus::Pending,
            expires_at: Utc::now() + Duration::days(7),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_lookup_partnership() {
        let (pool, repo) = setup().await;
        seed_accounts(&pool, 3).await;

        let p = repo.create(1, 2).await.expect("Failed to create");

        assert_eq!(repo.get_by_account(1).await.unwrap().unwrap().id, p.id);
        assert_eq!(repo.get_by_account(2).await.unwrap().unwrap().id, p.id);
        assert!(repo.get_by_account(3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_account_cannot_be_in_two_partnerships() {
        let (pool, repo) = setup().await;
        seed_accounts(&pool, 3).await;

        repo.create(1, 2).await.unwrap();
        // The UNIQUE constraints reject a second pairing of account 1
        assert!(repo.create(1, 3).await.is_err());
        assert!(repo.create(3, 2).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_by_account() {
        let (pool, repo) = setup().await;
        seed_accounts(&pool, 2).await;

        repo.create(1, 2).await.unwrap();
        assert!(repo.delete_by_account(2).await.unwrap());
        assert!(!repo.delete_by_account(2).await.unwrap());
        assert!(repo.get_by_account(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invitation_lifecycle() {
        let (pool, repo) = setup().await;
        seed_accounts(&pool, 2).await;

        let invitation = repo
            .create_invitation(&test_invitation(1))
            .await
            .expect("Failed to create invitation");
        assert!(invitation.id > 0);

        let found = repo
            .get_invitation_by_token(&invitation.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, InvitationStatus::Pending);
        assert!(found.to_account_id.is_none());

        let pending = repo.pending_invitation_from(1).await.unwrap().unwrap();
        assert_eq!(pending.id, invitation.id);

        assert!(repo
            .update_invitation_status(invitation.id, InvitationStatus::Accepted, Some(2))
            .await
            .unwrap());

        let found = repo
            .get_invitation_by_token(&invitation.token)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.status, InvitationStatus::Accepted);
        assert_eq!(found.to_account_id, Some(2));

        assert!(repo.pending_invitation_from(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_token_rejected() {
        let (pool, repo) = setup().await;
        seed_accounts(&pool, 1).await;

        let invitation = test_invitation(1);
        repo.create_invitation(&invitation).await.unwrap();
        assert!(repo.create_invitation(&invitation).await.is_err());
    }
}
