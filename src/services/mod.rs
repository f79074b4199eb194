//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories:
//! - enforcing validation and permission rules
//! - driving the upload pipeline (storage, segmentation, compositing)
//! - translating failures into typed errors the handlers can flash

pub mod comment;
pub mod composition;
pub mod password;
pub mod segmentation;
pub mod storage;
pub mod user;

pub use comment::{CommentService, CommentServiceError};
pub use composition::{
    CompositionDetail, CompositionService, CompositionServiceError, UploadInput, UploadedFile,
};
pub use password::{hash_password, verify_password};
pub use segmentation::{CommandSegmenter, Segmenter};
#[cfg(feature = "imgly")]
pub use segmentation::ImglySegmenter;
pub use storage::{allowed_file, ArtifactKind, UploadStore};
pub use user::{LoginInput, RegisterInput, UserService, UserServiceError};
