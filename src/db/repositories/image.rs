//! Image and background repository
//!
//! Read access to uploaded subjects and backgrounds. Rows are written by
//! the composition repository as part of an upload transaction.

use crate::db::DynDatabasePool;
use crate::models::{Background, Image};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Row;
use std::sync::Arc;

/// Image repository trait
#[async_trait]
pub trait ImageRepository: Send + Sync {
    /// Get image by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Image>>;

    /// Get background by ID
    async fn get_background(&self, id: i64) -> Result<Option<Background>>;
}

/// SQLx-based image repository implementation
pub struct SqlxImageRepository {
    pool: DynDatabasePool,
}

impl SqlxImageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ImageRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ImageRepository for SqlxImageRepository {
    async fn get_by_id(&self, id: i64) -> Result<Option<Image>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, original_path, cutout_path, created_at
            FROM images
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get image by ID")?;

        Ok(row.as_ref().map(row_to_image_sqlite))
    }

    async fn get_background(&self, id: i64) -> Result<Option<Background>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, bg_path, created_at
            FROM backgrounds
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool.sqlite())
        .await
        .context("Failed to get background by ID")?;

        Ok(row.map(|row| Background {
            id: row.get("id"),
            user_id: row.get("user_id"),
            bg_path: row.get("bg_path"),
            created_at: row.get("created_at"),
        }))
    }
}

fn row_to_image_sqlite(row: &sqlx::sqlite::SqliteRow) -> Image {
    Image {
        id: row.get("id"),
        user_id: row.get("user_id"),
        original_path: row.get("original_path"),
        cutout_path: row.get("cutout_path"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        CompositionRepository, SqlxCompositionRepository, SqlxUserRepository, UserRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::{NewUpload, User};

    async fn setup() -> (DynDatabasePool, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let user = SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                "owner".to_string(),
                "owner@example.com".to_string(),
                "hash".to_string(),
            ))
            .await
            .expect("Failed to create user");
        (pool, user.id)
    }

    fn upload(user_id: i64, name: &str, background: Option<&str>) -> NewUpload {
        NewUpload {
            user_id,
            original_path: format!("uploads/original/{}.jpg", name),
            cutout_path: format!("uploads/cutout/{}.png", name),
            background_path: background.map(String::from),
            output_path: format!("uploads/composed/{}.png", name),
            is_public: true,
        }
    }

    #[tokio::test]
    async fn test_get_image_and_background() {
        let (pool, user_id) = setup().await;
        let compositions = SqlxCompositionRepository::new(pool.clone());
        let composition = compositions
            .create_upload(&upload(user_id, "a", Some("uploads/backgrounds/a.png")))
            .await
            .expect("Failed to create upload");

        let repo = SqlxImageRepository::new(pool);
        let image = repo
            .get_by_id(composition.image_id)
            .await
            .expect("Failed to get image")
            .expect("Image not found");
        assert_eq!(image.user_id, user_id);
        assert_eq!(image.cutout_path, "uploads/cutout/a.png");

        let background = repo
            .get_background(composition.background_id.expect("No background"))
            .await
            .expect("Failed to get background")
            .expect("Background not found");
        assert_eq!(background.bg_path, "uploads/backgrounds/a.png");
        assert_eq!(background.user_id, Some(user_id));
    }

    #[tokio::test]
    async fn test_missing_rows() {
        let (pool, _) = setup().await;
        let repo = SqlxImageRepository::new(pool);
        assert!(repo.get_by_id(42).await.unwrap().is_none());
        assert!(repo.get_background(42).await.unwrap().is_none());
    }
}
