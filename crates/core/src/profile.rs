//! Profile store trait — durable per-user attributes.
//!
//! The store is an external collaborator. The core only reads and writes
//! individual fields through narrow accessors and never holds a whole
//! profile across requests.

use crate::error::ProfileError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fields of a user profile fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProfileField {
    /// String.
    Name,
    /// Location tag string.
    PreferredVenue,
    /// Array of strings, most recent last.
    FavoriteItems,
    /// Unsigned integer.
    VisitCount,
    /// RFC 3339 timestamp string.
    LastVisit,
    /// Array of strings, ring buffer of the last 10.
    Notes,
}

impl ProfileField {
    pub const ALL: [ProfileField; 6] = [
        Self::Name,
        Self::PreferredVenue,
        Self::FavoriteItems,
        Self::VisitCount,
        Self::LastVisit,
        Self::Notes,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::PreferredVenue => "preferredVenue",
            Self::FavoriteItems => "favoriteItems",
            Self::VisitCount => "visitCount",
            Self::LastVisit => "lastVisit",
            Self::Notes => "notes",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == s)
    }
}

impl std::fmt::Display for ProfileField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-level key/value access to user profiles.
///
/// Implementations: in-memory, JSON file, SQLite, no-op.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "file", "none").
    fn name(&self) -> &str;

    /// Read one field; `None` when never written.
    async fn get(
        &self,
        user_id: &str,
        field: ProfileField,
    ) -> std::result::Result<Option<serde_json::Value>, ProfileError>;

    /// Overwrite one field.
    async fn put(
        &self,
        user_id: &str,
        field: ProfileField,
        value: serde_json::Value,
    ) -> std::result::Result<(), ProfileError>;
}
