//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::{Comment, CommentWithAuthor};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a new comment
    async fn create(&self, user_id: i64, composition_id: i64, text: &str) -> Result<Comment>;

    /// Get a comment by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Get comments for a composition, oldest first
    async fn list_by_composition(&self, composition_id: i64) -> Result<Vec<CommentWithAuthor>>;

    /// Replace the text, mark the comment edited and stamp `updated_at`
    async fn update_text(&self, id: i64, text: &str) -> Result<Option<Comment>>;

    /// Delete a comment
    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based comment repository implementation
pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, user_id: i64, composition_id: i64, text: &str) -> Result<Comment> {
        create_sqlite(self.pool.sqlite(), user_id, composition_id, text).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        get_by_id_sqlite(self.pool.sqlite(), id).await
    }

    async fn list_by_composition(&self, composition_id: i64) -> Result<Vec<CommentWithAuthor>> {
        list_by_composition_sqlite(self.pool.sqlite(), composition_id).await
    }

    async fn update_text(&self, id: i64, text: &str) -> Result<Option<Comment>> {
        let result = sqlx::query(
            "UPDATE comments SET text = ?, is_edited = 1, updated_at = ? WHERE id = ?",
        )
        .bind(text)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool.sqlite())
        .await
        .context("Failed to update comment")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        get_by_id_sqlite(self.pool.sqlite(), id).await
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to delete comment")?;

        Ok(result.rows_affected() > 0)
    }
}

// SQLite implementations

async fn create_sqlite(
    pool: &SqlitePool,
    user_id: i64,
    composition_id: i64,
    text: &str,
) -> Result<Comment> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO comments (user_id, composition_id, text, is_edited, created_at)
        VALUES (?, ?, ?, 0, ?)
        "#,
    )
    .bind(user_id)
    .bind(composition_id)
    .bind(text)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create comment")?;

    Ok(Comment {
        id: result.last_insert_rowid(),
        user_id,
        composition_id,
        text: text.to_string(),
        is_edited: false,
        created_at: now,
        updated_at: None,
    })
}

async fn get_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Comment>> {
    let row = sqlx::query(
        r#"
        SELECT id, user_id, composition_id, text, is_edited, created_at, updated_at
        FROM comments
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("Failed to get comment")?;

    Ok(row.as_ref().map(row_to_comment))
}

async fn list_by_composition_sqlite(
    pool: &SqlitePool,
    composition_id: i64,
) -> Result<Vec<CommentWithAuthor>> {
    let rows = sqlx::query(
        r#"
        SELECT c.id, c.user_id, c.composition_id, c.text, c.is_edited, c.created_at,
               c.updated_at, u.username AS author_username
        FROM comments c
        JOIN users u ON u.id = c.user_id
        WHERE c.composition_id = ?
        ORDER BY c.created_at ASC, c.id ASC
        "#,
    )
    .bind(composition_id)
    .fetch_all(pool)
    .await
    .context("Failed to list comments")?;

    Ok(rows
        .iter()
        .map(|row| CommentWithAuthor {
            comment: row_to_comment(row),
            author_username: row.get("author_username"),
        })
        .collect())
}

fn row_to_comment(row: &sqlx::sqlite::SqliteRow) -> Comment {
    Comment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        composition_id: row.get("composition_id"),
        text: row.get("text"),
        is_edited: row.get("is_edited"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
