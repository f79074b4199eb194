//! User repository
//!
//! Database operations for users.
//!
//! This module provides:
//! - `UserRepository` trait defining the interface for user data access
//! - `SqlxUserRepository` implementing the trait on SQLite

use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create(&self, user: &User) -> Result<User>;

    /// Get user by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    /// Get user by username
    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Get user by email
    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Grant or revoke admin rights. Returns false if no such user.
    async fn set_admin(&self, id: i64, is_admin: bool) -> Result<bool>;

    /// Point the user's profile picture at a composition
    async fn set_profile_image(&self, id: i64, composition_id: i64) -> Result<()>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    /// Create a new SQLx user repository
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        create_user_sqlite(self.pool.sqlite(), user).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        get_user_by_id_sqlite(self.pool.sqlite(), id)
            .await
            .context("Failed to get user by ID")
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        get_user_by_text_sqlite(self.pool.sqlite(), UniqueColumn::Username, username)
            .await
            .context("Failed to get user by username")
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        get_user_by_text_sqlite(self.pool.sqlite(), UniqueColumn::Email, email)
            .await
            .context("Failed to get user by email")
    }

    async fn set_admin(&self, id: i64, is_admin: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
            .bind(is_admin)
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update admin flag")?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_profile_image(&self, id: i64, composition_id: i64) -> Result<()> {
        sqlx::query("UPDATE users SET profile_image_id = ? WHERE id = ?")
            .bind(composition_id)
            .bind(id)
            .execute(self.pool.sqlite())
            .await
            .context("Failed to update profile image")?;

        Ok(())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_user_sqlite(pool: &SqlitePool, user: &User) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, is_admin, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.is_admin)
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        created_at: now,
        profile_image_id: None,
        ..user.clone()
    })
}

const USER_SELECT: &str = r#"
    SELECT id, username, email, password_hash, is_admin, profile_image_id, created_at
    FROM users
"#;

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let sql = format!("{} WHERE id = ?", USER_SELECT);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

/// Lookup on a unique text column (`username` or `email`)
async fn get_user_by_text_sqlite(
    pool: &SqlitePool,
    column: UniqueColumn,
    value: &str,
) -> Result<Option<User>> {
    let sql = format!("{} WHERE {} = ?", USER_SELECT, column.as_str());
    let row = sqlx::query(&sql).bind(value).fetch_optional(pool).await?;

    Ok(row.as_ref().map(row_to_user_sqlite))
}

#[derive(Debug, Clone, Copy)]
enum UniqueColumn {
    Username,
    Email,
}

impl UniqueColumn {
    fn as_str(self) -> &'static str {
        match self {
            UniqueColumn::Username => "username",
            UniqueColumn::Email => "email",
        }
    }
}

fn row_to_user_sqlite(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        is_admin: row.get("is_admin"),
        profile_image_id: row.get("profile_image_id"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_user(username: &str, email: &str) -> User {
        User::new(username.to_string(), email.to_string(), "hash".to_string())
    }

    #[tokio::test]
    async fn test_create_user() {
        let (_pool, repo) = setup_test_repo().await;

        let created = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        assert!(created.id > 0);
        assert_eq!(created.username, "testuser");
        assert_eq!(created.email, "test@example.com");
        assert!(!created.is_admin);
    }

    #[tokio::test]
    async fn test_get_user_by_id() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("testuser", "test@example.com"))
            .await
            .expect("Failed to create user");

        let found = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get user")
            .expect("User not found");

        assert_eq!(found.id, created.id);
        assert_eq!(found.password_hash, "hash");
        assert!(repo.get_by_id(999).await.expect("Failed to get user").is_none());
    }

    #[tokio::test]
    async fn test_get_user_by_username_and_email() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_user("findme", "findme@example.com"))
            .await
            .expect("Failed to create user");

        let by_name = repo
            .get_by_username("findme")
            .await
            .expect("Failed to get user")
            .expect("User not found");
        let by_email = repo
            .get_by_email("findme@example.com")
            .await
            .expect("Failed to get user")
            .expect("User not found");

        assert_eq!(by_name.id, by_email.id);
        assert!(repo
            .get_by_username("nobody")
            .await
            .expect("Failed to get user")
            .is_none());
    }

    #[tokio::test]
    async fn test_unique_username_constraint() {
        let (_pool, repo) = setup_test_repo().await;

        repo.create(&create_test_user("duplicate", "user1@example.com"))
            .await
            .expect("Failed to create first user");
        let result = repo
            .create(&create_test_user("duplicate", "user2@example.com"))
            .await;

        assert!(result.is_err(), "Should fail due to duplicate username");
    }

    #[tokio::test]
    async fn test_set_admin() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("promote", "promote@example.com"))
            .await
            .expect("Failed to create user");

        assert!(repo.set_admin(created.id, true).await.expect("Failed to promote"));
        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(found.is_admin);

        assert!(repo.set_admin(created.id, false).await.expect("Failed to demote"));
        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(!found.is_admin);

        assert!(!repo.set_admin(999, true).await.expect("Failed to update"));
    }

    #[tokio::test]
    async fn test_set_profile_image() {
        let (pool, repo) = setup_test_repo().await;
        let created = repo
            .create(&create_test_user("profile", "profile@example.com"))
            .await
            .expect("Failed to create user");

        let image_id = sqlx::query(
            "INSERT INTO images (user_id, original_path, cutout_path) VALUES (?, ?, ?)",
        )
        .bind(created.id)
        .bind("uploads/original/a.jpg")
        .bind("uploads/cutout/a.png")
        .execute(pool.sqlite())
        .await
        .expect("Failed to insert image")
        .last_insert_rowid();
        let composition_id =
            sqlx::query("INSERT INTO compositions (image_id, output_path) VALUES (?, ?)")
                .bind(image_id)
                .bind("uploads/cutout/a.png")
                .execute(pool.sqlite())
                .await
                .expect("Failed to insert composition")
                .last_insert_rowid();

        repo.set_profile_image(created.id, composition_id)
            .await
            .expect("Failed to set profile image");

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.profile_image_id, Some(composition_id));
    }
}
