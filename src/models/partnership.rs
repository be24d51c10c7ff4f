//! Partnership and invitation models
//!
//! A partnership is a symmetric 1:1 relation: each account appears in at
//! most one partnership row. Invitations are token-based with a 7-day
//! expiry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Symmetric 1:1 partnership between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partnership {
    pub id: i64,
    pub account_a: i64,
    pub account_b: i64,
    pub created_at: DateTime<Utc>,
}

impl Partnership {
    /// The other side of the partnership, if `account_id` is a member
    pub fn partner_of(&self, account_id: i64) -> Option<i64> {
        if self.account_a == account_id {
            Some(self.account_b)
        } else if self.account_b == account_id {
            Some(self.account_a)
        } else {
            None
        }
    }
}

/// Invitation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl fmt::Display for InvitationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

impl FromStr for InvitationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            _ => Err(anyhow::anyhow!("Invalid invitation status: {}", s)),
        }
    }
}

/// Token-based partnership invitation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnershipInvitation {
    pub id: i64,
    /// Opaque token shared out-of-band as the invitation link
    pub token: String,
    pub from_account_id: i64,
    /// Set when a specific account claims or accepts the invitation
    pub to_account_id: Option<i64>,
    pub status: InvitationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PartnershipInvitation {
    /// A pending invitation past its expiry is no longer acceptable
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }
}
