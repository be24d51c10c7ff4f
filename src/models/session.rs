//! Session model
//!
//! The session row is the sole source of truth for "is this client logged
//! in". [`SessionPhase`] encodes the countdown contract the web client runs
//! against `expires_at`.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Session entity binding an opaque token to an account and an expiry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session ID (opaque token)
    pub id: String,
    /// Owning account ID
    pub account_id: i64,
    /// Denormalized display label of the owning account
    pub account_label: String,
    /// Expiration timestamp
    pub expires_at: DateTime<Utc>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Check if the session has expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Time left until expiry (zero if already expired)
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }
}

/// Client-observable countdown phase of a session.
///
/// The client computes this locally from `expires_at` once per second; the
/// server only re-enters the picture on renewal. Thresholds come from the
/// session configuration and are strictly smaller than the total duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    /// Plenty of time left
    Active,
    /// Renewal dialog becomes visible
    Warning,
    /// Last stretch before expiry
    Critical,
    /// Countdown reached zero
    Expired,
}

impl SessionPhase {
    /// Classify a remaining duration against the warning/critical thresholds.
    pub fn classify(remaining: Duration, warning: Duration, critical: Duration) -> Self {
        if remaining <= Duration::zero() {
            SessionPhase::Expired
        } else if remaining <= critical {
            SessionPhase::Critical
        } else if remaining <= warning {
            SessionPhase::Warning
        } else {
            SessionPhase::Active
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phase(secs: i64) -> SessionPhase {
        SessionPhase::classify(
            Duration::seconds(secs),
            Duration::seconds(120),
            Duration::seconds(30),
        )
    }

    #[test]
    fn test_session_expiration_check() {
        let now = Utc::now();
        let expired = Session {
            id: "expired".to_string(),
            account_id: 1,
            account_label: "Alice".to_string(),
            expires_at: now - Duration::hours(1),
            created_at: now - Duration::hours(2),
        };
        let valid = Session {
            id: "valid".to_string(),
            account_id: 1,
            account_label: "Alice".to_string(),
            expires_at: now + Duration::hours(1),
            created_at: now,
        };

        assert!(expired.is_expired());
        assert!(!valid.is_expired());
        assert_eq!(expired.remaining(), Duration::zero());
        assert!(valid.remaining() > Duration::zero());
    }

    #[test]
    fn test_phase_transitions() {
        assert_eq!(phase(600), SessionPhase::Active);
        assert_eq!(phase(121), SessionPhase::Active);
        assert_eq!(phase(120), SessionPhase::Warning);
        assert_eq!(phase(31), SessionPhase::Warning);
        assert_eq!(phase(30), SessionPhase::Critical);
        assert_eq!(phase(1), SessionPhase::Critical);
        assert_eq!(phase(0), SessionPhase::Expired);
        assert_eq!(phase(-5), SessionPhase::Expired);
    }
}
