//! Collection model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Collection kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Nature,
    Travels,
    Favorites,
    Custom,
}

impl Default for CollectionKind {
    fn default() -> Self {
        Self::Custom
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nature => write!(f, "nature"),
            Self::Travels => write!(f, "travels"),
            Self::Favorites => write!(f, "favorites"),
            Self::Custom => write!(f, "custom"),
        }
    }
}

impl FromStr for CollectionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nature" => Ok(Self::Nature),
            "travels" => Ok(Self::Travels),
            "favorites" => Ok(Self::Favorites),
            "custom" => Ok(Self::Custom),
            _ => Err(anyhow::anyhow!("Invalid collection kind: {}", s)),
        }
    }
}

/// Collection entity grouping photos.
///
/// Temporal invariant: `is_temporary = true` implies both `session_id` and
/// `expires_at` are set; `is_temporary = false` implies both are `None`.
/// A temporary collection lives until the earlier of its own `expires_at`
/// and the end of its owning session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub kind: CollectionKind,
    /// Session-scoped content flag
    pub is_temporary: bool,
    /// Owning session when temporary
    pub session_id: Option<String>,
    /// Expiry when temporary
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Collection {
    /// Check the temporal-flag invariant
    pub fn temporal_fields_consistent(&self) -> bool {
        if self.is_temporary {
            self.session_id.is_some() && self.expires_at.is_some()
        } else {
            self.session_id.is_none() && self.expires_at.is_none()
        }
    }
}

/// Input for creating a collection
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCollectionInput {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub kind: CollectionKind,
    /// Bind the collection lifetime to the caller's session
    #[serde(default)]
    pub temporary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_kind_roundtrip() {
        for kind in [
            CollectionKind::Nature,
            CollectionKind::Travels,
            CollectionKind::Favorites,
            CollectionKind::Custom,
        ] {
            assert_eq!(CollectionKind::from_str(&kind.to_string()).unwrap(), kind);
        }
        assert!(CollectionKind::from_str("holiday").is_err());
    }

    #[test]
    fn test_temporal_fields_consistent() {
        let now = Utc::now();
        let permanent = Collection {
            id: 1,
            name: "Alps".into(),
            description: None,
            kind: CollectionKind::Travels,
            is_temporary: false,
            session_id: None,
            expires_at: None,
            created_at: now,
        };
        assert!(permanent.temporal_fields_consistent());

        let temporary = Collection {
            session_id: Some("tok".into()),
            expires_at: Some(now),
            is_temporary: true,
            ..permanent.clone()
        };
        assert!(temporary.temporal_fields_consistent());

        let broken = Collection {
            is_temporary: true,
            session_id: None,
            expires_at: Some(now),
            ..permanent
        };
        assert!(!broken.temporal_fields_consistent());
    }
}
