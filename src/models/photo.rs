//! Photo model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Photo entity.
///
/// `storage_key` points at the binary in the blob store; deleting a photo
/// addresses the blob before (or regardless of) removing the row. The
/// temporal fields follow the same invariant as collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub collection_id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Key of the stored binary in the blob store
    pub storage_key: String,
    pub content_type: String,
    pub liked: bool,
    /// Session-scoped content flag
    pub is_temporary: bool,
    /// Owning session when temporary
    pub session_id: Option<String>,
    /// Expiry when temporary
    pub expires_at: Option<DateTime<Utc>>,
    pub uploaded_at: DateTime<Utc>,
}

impl Photo {
    /// Check the temporal-flag invariant
    pub fn temporal_fields_consistent(&self) -> bool {
        if self.is_temporary {
            self.session_id.is_some() && self.expires_at.is_some()
        } else {
            self.session_id.is_none() && self.expires_at.is_none()
        }
    }
}

/// Input for updating photo metadata
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePhotoInput {
    pub title: Option<String>,
    pub description: Option<String>,
}
