//! Comment service
//!
//! Comments can be posted on any composition the author can see. Only the
//! author or an admin may edit or delete one.

use anyhow::Context;
use std::sync::Arc;

use crate::db::repositories::{CommentRepository, CompositionRepository};
use crate::models::{can_edit, Comment, CommentWithAuthor, User};

/// Error types for comment operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    #[error("Comment cannot be empty.")]
    EmptyText,

    #[error("Comment not found")]
    NotFound,

    #[error("Composition not found")]
    CompositionNotFound,

    #[error("This image is private.")]
    Private,

    /// Not the author and not an admin; carries where to send the user back to
    #[error("Not allowed to modify comment on composition {composition_id}")]
    Forbidden { composition_id: i64 },

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, CommentServiceError>;

/// Comment service
pub struct CommentService {
    comments: Arc<dyn CommentRepository>,
    compositions: Arc<dyn CompositionRepository>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentRepository>,
        compositions: Arc<dyn CompositionRepository>,
    ) -> Self {
        Self {
            comments,
            compositions,
        }
    }

    /// Post a comment as `user`. The text is trimmed first.
    pub async fn create(&self, composition_id: i64, user: &User, text: &str) -> Result<Comment> {
        let view = self
            .compositions
            .get_view(composition_id)
            .await?
            .ok_or(CommentServiceError::CompositionNotFound)?;
        if !view.is_visible_to(Some(user)) {
            return Err(CommentServiceError::Private);
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(CommentServiceError::EmptyText);
        }

        let comment = self
            .comments
            .create(user.id, view.id, text)
            .await
            .context("Failed to post comment")?;
        tracing::debug!(comment_id = comment.id, composition_id, "Comment posted");
        Ok(comment)
    }

    /// Comments on a composition, oldest first
    pub async fn list_for(&self, composition_id: i64) -> Result<Vec<CommentWithAuthor>> {
        let comments = self.comments.list_by_composition(composition_id).await?;
        Ok(comments)
    }

    /// A comment `user` is allowed to modify
    pub async fn get_editable(&self, id: i64, user: &User) -> Result<Comment> {
        let comment = self
            .comments
            .get_by_id(id)
            .await?
            .ok_or(CommentServiceError::NotFound)?;
        if !can_edit(comment.user_id, Some(user)) {
            return Err(CommentServiceError::Forbidden {
                composition_id: comment.composition_id,
            });
        }
        Ok(comment)
    }

    /// Replace the text with its trimmed form and mark the comment edited.
    pub async fn update(&self, id: i64, user: &User, text: &str) -> Result<Comment> {
        let comment = self.get_editable(id, user).await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(CommentServiceError::EmptyText);
        }

        self.comments
            .update_text(comment.id, text)
            .await?
            .ok_or(CommentServiceError::NotFound)
    }

    /// Delete a comment, returning it so the caller knows where it lived.
    pub async fn delete(&self, id: i64, user: &User) -> Result<Comment> {
        let comment = self.get_editable(id, user).await?;
        self.comments.delete(comment.id).await?;
        tracing::debug!(comment_id = comment.id, user_id = user.id, "Comment deleted");
        Ok(comment)
    }
}
