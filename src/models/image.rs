//! Uploaded photos

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A subject photo and its background-removed cutout.
///
/// Paths are relative to the static root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: i64,
    pub user_id: i64,
    pub original_path: String,
    pub cutout_path: String,
    pub created_at: DateTime<Utc>,
}

/// A background photo a cutout can be composited onto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Background {
    pub id: i64,
    pub user_id: Option<i64>,
    pub bg_path: String,
    pub created_at: DateTime<Utc>,
}
