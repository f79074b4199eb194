//! Backdrop - a small portrait gallery
//!
//! Users upload a photo of a subject, the background is cut away by an
//! external segmentation command, and the cutout is optionally placed over a
//! background of their choice before it lands in the gallery.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;

#[cfg(test)]
pub mod test_utils {
    //! Fixtures shared by tests across modules

    use std::sync::Arc;
    use tempfile::TempDir;

    use crate::api::{AppState, CookieSigner};
    use crate::config::UploadConfig;
    use crate::db::repositories::{
        SqlxCommentRepository, SqlxCompositionRepository, SqlxImageRepository,
        SqlxSessionRepository, SqlxUserRepository,
    };
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use crate::services::segmentation::testing::MockSegmenter;
    use crate::services::{CommentService, CompositionService, UploadStore, UserService};
    use crate::theme::ThemeEngine;

    /// A solid-colour PNG
    pub fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .expect("Failed to encode PNG");
        bytes
    }

    /// A fully wired application over an in-memory database and a
    /// temporary static root
    pub struct TestApp {
        pub state: AppState,
        pub upload: UploadConfig,
        pub pool: DynDatabasePool,
        _dir: TempDir,
    }

    pub async fn test_app() -> TestApp {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let upload = UploadConfig {
            static_root: dir.path().to_path_buf(),
            ..UploadConfig::default()
        };
        let store = UploadStore::new(&upload);
        store.ensure_dirs().await.expect("Failed to create dirs");

        let users = SqlxUserRepository::boxed(pool.clone());
        let compositions = SqlxCompositionRepository::boxed(pool.clone());

        let state = AppState {
            user_service: Arc::new(UserService::new(
                users.clone(),
                SqlxSessionRepository::boxed(pool.clone()),
            )),
            composition_service: Arc::new(CompositionService::new(
                compositions.clone(),
                SqlxImageRepository::boxed(pool.clone()),
                users,
                store,
                Arc::new(MockSegmenter::new()),
            )),
            comment_service: Arc::new(CommentService::new(
                SqlxCommentRepository::boxed(pool.clone()),
                compositions,
            )),
            theme_engine: Arc::new(ThemeEngine::new().expect("Failed to load templates")),
            signer: Arc::new(CookieSigner::new(b"test-secret").expect("Failed to create signer")),
            session_ttl_days: 7,
            max_file_size: upload.max_file_size,
        };

        TestApp {
            state,
            upload,
            pool,
            _dir: dir,
        }
    }
}
