//! Account model
//!
//! Defines the Account entity and the account-kind tag used to route
//! session teardown.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved handle prefix for disposable guest accounts.
///
/// The prefix keeps generated handles from colliding with registered ones;
/// all lifecycle routing decisions read [`Account::kind`], never the handle.
pub const GUEST_HANDLE_PREFIX: &str = "guest-";

/// Account entity representing a registered user of the album.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: i64,
    /// Handle (unique)
    pub handle: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Display label shown in the UI
    pub display_name: String,
    /// Optional avatar reference
    pub avatar: Option<String>,
    /// Account kind (lifecycle routing tag)
    pub kind: AccountKind,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Create a new Account with the given parameters.
    ///
    /// The password must already be hashed; use
    /// `services::password::hash_password()`.
    pub fn new(
        handle: String,
        password_hash: String,
        display_name: String,
        kind: AccountKind,
    ) -> Self {
        Self {
            id: 0, // Set by the database
            handle,
            password_hash,
            display_name,
            avatar: None,
            kind,
            created_at: Utc::now(),
        }
    }

    /// Check if this is the permanent demo account
    pub fn is_demo(&self) -> bool {
        self.kind == AccountKind::Demo
    }

    /// Check if this is a disposable guest account
    pub fn is_guest(&self) -> bool {
        self.kind == AccountKind::Ephemeral
    }
}

/// Account kind, stored as a column and used for lifecycle routing.
///
/// - `Regular`: a normal registered account
/// - `Demo`: the single permanent demo account with protected content
/// - `Ephemeral`: a disposable guest account torn down with its session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    /// Normal registered account
    Regular,
    /// The permanent demo account
    Demo,
    /// Disposable guest account
    Ephemeral,
}

impl Default for AccountKind {
    fn default() -> Self {
        Self::Regular
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountKind::Regular => write!(f, "regular"),
            AccountKind::Demo => write!(f, "demo"),
            AccountKind::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

impl FromStr for AccountKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "regular" => Ok(AccountKind::Regular),
            "demo" => Ok(AccountKind::Demo),
            "ephemeral" => Ok(AccountKind::Ephemeral),
            _ => Err(anyhow::anyhow!("Invalid account kind: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_new() {
        let account = Account::new(
            "alice".to_string(),
            "hashed".to_string(),
            "Alice".to_string(),
            AccountKind::Regular,
        );

        assert_eq!(account.id, 0);
        assert_eq!(account.handle, "alice");
        assert_eq!(account.kind, AccountKind::Regular);
        assert!(account.avatar.is_none());
    }

    #[test]
    fn test_kind_predicates() {
        let demo = Account::new("demo".into(), "hash".into(), "Demo".into(), AccountKind::Demo);
        let guest = Account::new(
            "guest-abc".into(),
            "hash".into(),
            "Guest".into(),
            AccountKind::Ephemeral,
        );
        let regular = Account::new("bob".into(), "hash".into(), "Bob".into(), AccountKind::Regular);

        assert!(demo.is_demo() && !demo.is_guest());
        assert!(guest.is_guest() && !guest.is_demo());
        assert!(!regular.is_demo() && !regular.is_guest());
    }

    #[test]
    fn test_kind_display_roundtrip() {
        for kind in [AccountKind::Regular, AccountKind::Demo, AccountKind::Ephemeral] {
            assert_eq!(AccountKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert!(AccountKind::from_str("superuser").is_err());
    }

    #[test]
    fn test_kind_default() {
        assert_eq!(AccountKind::default(), AccountKind::Regular);
    }
}
