//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Admins may view, edit and delete anything
    pub is_admin: bool,
    /// Composition chosen as profile picture
    pub profile_image_id: Option<i64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new, non-admin user.
    ///
    /// The password must already be hashed; see `services::password::hash_password()`.
    pub fn new(username: String, email: String, password_hash: String) -> Self {
        Self {
            id: 0, // Will be set by the database
            username,
            email,
            password_hash,
            is_admin: false,
            profile_image_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Whether `user` may modify something owned by `owner_id`.
///
/// Anonymous visitors never may; admins always may; everyone else only for
/// their own things.
pub fn can_edit(owner_id: i64, user: Option<&User>) -> bool {
    match user {
        None => false,
        Some(user) => user.is_admin || user.id == owner_id,
    }
}
