//! Data models
//!
//! Database entities plus the joined views the pages render.

mod comment;
mod composition;
mod image;
mod session;
pub mod user;

pub use comment::{Comment, CommentWithAuthor};
pub use composition::{can_view, Composition, CompositionView, GalleryScope, NewUpload};
pub use image::{Background, Image};
pub use session::Session;
pub use user::{can_edit, User};
