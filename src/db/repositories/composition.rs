//! Composition repository
//!
//! Database operations for compositions, the images and backgrounds they are
//! built from, and the likes they collect.
//!
//! An upload touches three tables; `create_upload` writes them in a single
//! transaction so a failed insert never leaves an image without its
//! composition.

use crate::db::DynDatabasePool;
use crate::models::{Composition, CompositionView, GalleryScope, NewUpload};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Composition repository trait
#[async_trait]
pub trait CompositionRepository: Send + Sync {
    /// Persist the background (if any), image and composition of one upload
    async fn create_upload(&self, upload: &NewUpload) -> Result<Composition>;

    /// Get a composition with its owner and counters
    async fn get_view(&self, id: i64) -> Result<Option<CompositionView>>;

    /// List compositions in scope, newest first
    async fn list(&self, scope: GalleryScope) -> Result<Vec<CompositionView>>;

    /// Attach a new background and output to an existing composition
    async fn replace_background(
        &self,
        composition_id: i64,
        user_id: i64,
        bg_path: &str,
        output_path: &str,
    ) -> Result<i64>;

    /// Add a like. Returns false if the user already liked it.
    async fn add_like(&self, user_id: i64, composition_id: i64) -> Result<bool>;

    /// Remove a like. Returns false if there was none.
    async fn remove_like(&self, user_id: i64, composition_id: i64) -> Result<bool>;

    /// Check if liked
    async fn is_liked(&self, user_id: i64, composition_id: i64) -> Result<bool>;
}

/// SQLx-based composition repository implementation
pub struct SqlxCompositionRepository {
    pool: DynDatabasePool,
}

impl SqlxCompositionRepository {
    /// Create a new SQLx composition repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CompositionRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CompositionRepository for SqlxCompositionRepository {
    async fn create_upload(&self, upload: &NewUpload) -> Result<Composition> {
        create_upload_sqlite(self.pool.sqlite(), upload).await
    }

    async fn get_view(&self, id: i64) -> Result<Option<CompositionView>> {
        let sql = format!("{} WHERE c.id = ?", VIEW_SELECT);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.sqlite())
            .await
            .context("Failed to get composition")?;

        Ok(row.as_ref().map(row_to_view_sqlite))
    }

    async fn list(&self, scope: GalleryScope) -> Result<Vec<CompositionView>> {
        list_sqlite(self.pool.sqlite(), scope).await
    }

    async fn replace_background(
        &self,
        composition_id: i64,
        user_id: i64,
        bg_path: &str,
        output_path: &str,
    ) -> Result<i64> {
        replace_background_sqlite(
            self.pool.sqlite(),
            composition_id,
            user_id,
            bg_path,
            output_path,
        )
        .await
    }

    async fn add_like(&self, user_id: i64, composition_id: i64) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO user_likes (user_id, composition_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(composition_id)
        .bind(Utc::now())
        .execute(self.pool.sqlite())
        .await
        .context("Failed to add like")?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_like(&self, user_id: i64, composition_id: i64) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM user_likes WHERE user_id = ? AND composition_id = ?")
                .bind(user_id)
                .bind(composition_id)
                .execute(self.pool.sqlite())
                .await
                .context("Failed to remove like")?;

        Ok(result.rows_affected() > 0)
    }

    async fn is_liked(&self, user_id: i64, composition_id: i64) -> Result<bool> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM user_likes WHERE user_id = ? AND composition_id = ?",
        )
        .bind(user_id)
        .bind(composition_id)
        .fetch_one(self.pool.sqlite())
        .await
        .context("Failed to check like")?;

        let count: i64 = row.get("cnt");
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const VIEW_SELECT: &str = r#"
    SELECT c.id, c.image_id, c.background_id, c.output_path, c.is_public, c.created_at,
           i.cutout_path, i.user_id AS owner_id, u.username AS owner_username,
           (SELECT COUNT(*) FROM user_likes l WHERE l.composition_id = c.id) AS like_count,
           (SELECT COUNT(*) FROM comments m WHERE m.composition_id = c.id) AS comment_count
    FROM compositions c
    JOIN images i ON i.id = c.image_id
    JOIN users u ON u.id = i.user_id
"#;

async fn create_upload_sqlite(pool: &SqlitePool, upload: &NewUpload) -> Result<Composition> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let background_id = match &upload.background_path {
        Some(bg_path) => Some(insert_background(&mut tx, upload.user_id, bg_path).await?),
        None => None,
    };

    let image_id = sqlx::query(
        r#"
        INSERT INTO images (user_id, original_path, cutout_path, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(upload.user_id)
    .bind(&upload.original_path)
    .bind(&upload.cutout_path)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create image")?
    .last_insert_rowid();

    let composition_id = sqlx::query(
        r#"
        INSERT INTO compositions (image_id, background_id, output_path, is_public, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(image_id)
    .bind(background_id)
    .bind(&upload.output_path)
    .bind(upload.is_public)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create composition")?
    .last_insert_rowid();

    tx.commit().await.context("Failed to commit upload")?;

    Ok(Composition {
        id: composition_id,
        image_id,
        background_id,
        output_path: upload.output_path.clone(),
        is_public: upload.is_public,
        created_at: now,
    })
}

async fn insert_background(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    user_id: i64,
    bg_path: &str,
) -> Result<i64> {
    let result =
        sqlx::query("INSERT INTO backgrounds (user_id, bg_path, created_at) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(bg_path)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await
            .context("Failed to create background")?;

    Ok(result.last_insert_rowid())
}

async fn replace_background_sqlite(
    pool: &SqlitePool,
    composition_id: i64,
    user_id: i64,
    bg_path: &str,
    output_path: &str,
) -> Result<i64> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    let background_id = insert_background(&mut tx, user_id, bg_path).await?;

    let result =
        sqlx::query("UPDATE compositions SET background_id = ?, output_path = ? WHERE id = ?")
            .bind(background_id)
            .bind(output_path)
            .bind(composition_id)
            .execute(&mut *tx)
            .await
            .context("Failed to update composition")?;

    if result.rows_affected() == 0 {
        anyhow::bail!("Composition {} does not exist", composition_id);
    }

    tx.commit().await.context("Failed to commit recompose")?;

    Ok(background_id)
}

async fn list_sqlite(pool: &SqlitePool, scope: GalleryScope) -> Result<Vec<CompositionView>> {
    const ORDER: &str = "ORDER BY c.created_at DESC, c.id DESC";

    let rows = match scope {
        GalleryScope::Everything => {
            let sql = format!("{} {}", VIEW_SELECT, ORDER);
            sqlx::query(&sql).fetch_all(pool).await
        }
        GalleryScope::Public => {
            let sql = format!("{} WHERE c.is_public = 1 {}", VIEW_SELECT, ORDER);
            sqlx::query(&sql).fetch_all(pool).await
        }
        GalleryScope::PublicAndOwnedBy(user_id) => {
            let sql = format!(
                "{} WHERE c.is_public = 1 OR i.user_id = ? {}",
                VIEW_SELECT, ORDER
            );
            sqlx::query(&sql).bind(user_id).fetch_all(pool).await
        }
    }
    .context("Failed to list compositions")?;

    Ok(rows.iter().map(row_to_view_sqlite).collect())
}

fn row_to_view_sqlite(row: &sqlx::sqlite::SqliteRow) -> CompositionView {
    CompositionView {
        id: row.get("id"),
        image_id: row.get("image_id"),
        background_id: row.get("background_id"),
        output_path: row.get("output_path"),
        cutout_path: row.get("cutout_path"),
        is_public: row.get("is_public"),
        created_at: row.get("created_at"),
        owner_id: row.get("owner_id"),
        owner_username: row.get("owner_username"),
        like_count: row.get("like_count"),
        comment_count: row.get("comment_count"),
    }
}
