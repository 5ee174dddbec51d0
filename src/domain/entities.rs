//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

/// A registered keyword in one source, with the user that created it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeywordEntry {
    pub source: String,
    pub keyword: String,
    pub description: String,
    pub creator: String,
    pub created_at: OffsetDateTime,
}

/// One increment of a keyword counter. Rows are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageEvent {
    pub source: String,
    pub keyword: String,
    pub created_at: OffsetDateTime,
}

/// Public profile data returned by the messaging platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub display_name: String,
    pub status_message: Option<String>,
}
