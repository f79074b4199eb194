//! Composition model and visibility rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::User;

/// The published result of one upload: a cutout, optionally over a background.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Composition {
    pub id: i64,
    pub image_id: i64,
    pub background_id: Option<i64>,
    /// Final artifact, relative to the static root
    pub output_path: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
}

/// A composition joined with what the gallery and detail pages display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionView {
    pub id: i64,
    pub image_id: i64,
    pub background_id: Option<i64>,
    pub output_path: String,
    pub cutout_path: String,
    pub is_public: bool,
    pub created_at: DateTime<Utc>,
    /// Owner of the underlying image
    pub owner_id: i64,
    pub owner_username: String,
    pub like_count: i64,
    pub comment_count: i64,
}

impl CompositionView {
    /// Whether `viewer` may see this composition.
    pub fn is_visible_to(&self, viewer: Option<&User>) -> bool {
        can_view(self.is_public, self.owner_id, viewer)
    }
}

/// Public compositions are visible to everyone; private ones only to their
/// owner and admins.
pub fn can_view(is_public: bool, owner_id: i64, viewer: Option<&User>) -> bool {
    is_public || super::user::can_edit(owner_id, viewer)
}

/// Which compositions a gallery listing includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryScope {
    /// Public compositions only
    Public,
    /// Everything, regardless of visibility
    Everything,
    /// Public compositions plus the given user's own
    PublicAndOwnedBy(i64),
}

impl GalleryScope {
    /// Scope for the given viewer.
    pub fn for_viewer(viewer: Option<&User>) -> Self {
        match viewer {
            None => Self::Public,
            Some(user) if user.is_admin => Self::Everything,
            Some(user) => Self::PublicAndOwnedBy(user.id),
        }
    }
}

/// Everything needed to persist one finished upload.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub user_id: i64,
    pub original_path: String,
    pub cutout_path: String,
    pub background_path: Option<String>,
    pub output_path: String,
    pub is_public: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer(id: i64, is_admin: bool) -> User {
        let mut user = User::new(
            format!("user{}", id),
            format!("user{}@example.com", id),
            "hash".to_string(),
        );
        user.id = id;
        user.is_admin = is_admin;
        user
    }

    #[test]
    fn test_scope_for_viewer() {
        assert_eq!(GalleryScope::for_viewer(None), GalleryScope::Public);
        assert_eq!(
            GalleryScope::for_viewer(Some(&viewer(1, true))),
            GalleryScope::Everything
        );
        assert_eq!(
            GalleryScope::for_viewer(Some(&viewer(7, false))),
            GalleryScope::PublicAndOwnedBy(7)
        );
    }

    #[test]
    fn test_public_visible_to_everyone() {
        assert!(can_view(true, 1, None));
        assert!(can_view(true, 1, Some(&viewer(2, false))));
    }

    #[test]
    fn test_private_visible_to_owner_and_admin_only() {
        assert!(!can_view(false, 1, None));
        assert!(!can_view(false, 1, Some(&viewer(2, false))));
        assert!(can_view(false, 1, Some(&viewer(1, false))));
        assert!(can_view(false, 1, Some(&viewer(3, true))));
    }
}
