//! User service
//!
//! Registration, login/logout and session resolution. The session token is
//! the only thing the browser holds; `validate_session` turns it back into a
//! user on every request.

use crate::db::repositories::{SessionRepository, UserRepository};
use crate::models::{Session, User};
use crate::services::password::{hash_password, verify_password};
use anyhow::Context;
use std::sync::Arc;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

pub const MSG_FIELDS_REQUIRED: &str = "All fields are required.";
pub const MSG_USER_EXISTS: &str = "Username or email already exists.";
pub const MSG_BAD_CREDENTIALS: &str = "Username or password is incorrect.";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// User already exists
    #[error("User already exists: {0}")]
    UserExists(String),

    /// No user with that name
    #[error("User not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing users and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl UserService {
    /// Create a new user service with the given repositories
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
    ) -> Self {
        Self::with_session_expiration(user_repo, session_repo, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    /// Create a new user service with custom session expiration
    pub fn with_session_expiration(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            session_expiration_days,
        }
    }

    /// Register a new user.
    ///
    /// Username and email are trimmed before validation and storage; the
    /// password is taken verbatim. Every account starts as a regular user.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if any field is blank
    /// - `UserExists` if the username or email is taken
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let username = input.username.trim();
        let email = input.email.trim();

        if username.is_empty() || email.is_empty() || input.password.is_empty() {
            return Err(UserServiceError::ValidationError(
                MSG_FIELDS_REQUIRED.to_string(),
            ));
        }

        let username_taken = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to check username")?
            .is_some();
        let email_taken = self
            .user_repo
            .get_by_email(email)
            .await
            .context("Failed to check email")?
            .is_some();
        if username_taken || email_taken {
            return Err(UserServiceError::UserExists(MSG_USER_EXISTS.to_string()));
        }

        let password_hash = hash_password(&input.password)?;
        let user = User::new(username.to_string(), email.to_string(), password_hash);

        // A concurrent registration can win between the check and the insert.
        let created = match self.user_repo.create(&user).await {
            Ok(created) => created,
            Err(e) if is_unique_violation(&e) => {
                return Err(UserServiceError::UserExists(MSG_USER_EXISTS.to_string()));
            }
            Err(e) => return Err(e.context("Failed to create user").into()),
        };

        tracing::info!(user_id = created.id, username = %created.username, "User registered");
        Ok(created)
    }

    /// Verify credentials and open a session.
    ///
    /// Unknown usernames and wrong passwords fail with the same message.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(input.username.trim())
            .await
            .context("Failed to get user by username")?;

        let user = match user {
            Some(user) if verify_password(&input.password, &user.password_hash)? => user,
            _ => {
                tracing::debug!(username = %input.username, "Rejected login");
                return Err(UserServiceError::AuthenticationError(
                    MSG_BAD_CREDENTIALS.to_string(),
                ));
            }
        };

        let session = Session::start(user.id, self.session_expiration_days);
        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        tracing::info!(user_id = user.id, "User logged in");
        Ok(created)
    }

    /// Logout (invalidate session)
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;

        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Expired sessions are deleted and resolve to `None`.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            if let Err(e) = self.session_repo.delete(token).await {
                tracing::warn!("Failed to delete expired session: {:#}", e);
            }
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Grant or revoke admin rights by username
    pub async fn set_admin(&self, username: &str, is_admin: bool) -> Result<User, UserServiceError> {
        let user = self
            .user_repo
            .get_by_username(username)
            .await
            .context("Failed to get user by username")?
            .ok_or_else(|| UserServiceError::NotFound(username.to_string()))?;

        self.user_repo
            .set_admin(user.id, is_admin)
            .await
            .context("Failed to update admin flag")?;

        tracing::info!(user_id = user.id, is_admin, "Admin flag changed");
        Ok(User { is_admin, ..user })
    }

    /// Remove expired sessions, returning how many were deleted
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;

        Ok(count)
    }
}

fn is_unique_violation(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

/// Input for user registration
#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterInput {
    /// Create a new registration input
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for user login
#[derive(Debug, Clone)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxSessionRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations, DynDatabasePool};
    use sqlx::Row;

    async fn setup_test_service() -> (DynDatabasePool, UserService) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let user_repo = SqlxUserRepository::boxed(pool.clone());
        let session_repo = SqlxSessionRepository::boxed(pool.clone());
        let service = UserService::new(user_repo, session_repo);

        (pool, service)
    }

    async fn user_count(pool: &DynDatabasePool) -> i64 {
        sqlx::query("SELECT COUNT(*) AS cnt FROM users")
            .fetch_one(pool.sqlite())
            .await
            .expect("Failed to count users")
            .get("cnt")
    }

    // ========================================================================
    // Registration tests
    // ========================================================================

    #[tokio::test]
    async fn test_register_trims_and_hashes() {
        let (_pool, service) = setup_test_service().await;

        let user = service
            .register(RegisterInput::new("  alice ", " alice@example.com ", "pw"))
            .await
            .expect("Failed to register");

        assert_eq!(user.username, "alice");
        assert_eq!(user.email, "alice@example.com");
        assert!(!user.is_admin);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_blank_fields_fail() {
        let (pool, service) = setup_test_service().await;

        for input in [
            RegisterInput::new("   ", "a@example.com", "pw"),
            RegisterInput::new("a", "  ", "pw"),
            RegisterInput::new("a", "a@example.com", ""),
        ] {
            let result = service.register(input).await;
            assert!(
                matches!(result, Err(UserServiceError::ValidationError(ref m)) if m == MSG_FIELDS_REQUIRED)
            );
        }
        assert_eq!(user_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_register_duplicate_username_fails() {
        let (pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("taken", "one@example.com", "pw"))
            .await
            .expect("Failed to register first user");

        let result = service
            .register(RegisterInput::new("taken", "two@example.com", "pw"))
            .await;

        assert!(matches!(result, Err(UserServiceError::UserExists(ref m)) if m == MSG_USER_EXISTS));
        assert_eq!(user_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_register_duplicate_email_fails() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("one", "same@example.com", "pw"))
            .await
            .expect("Failed to register first user");

        let result = service
            .register(RegisterInput::new("two", "same@example.com", "pw"))
            .await;

        assert!(matches!(result, Err(UserServiceError::UserExists(_))));
    }

    // ========================================================================
    // Login / session tests
    // ========================================================================

    /// Username lookups that always miss, as if another request had not
    /// committed yet when the duplicate check ran.
    struct StaleLookups(Arc<dyn UserRepository>);

    #[async_trait::async_trait]
    impl UserRepository for StaleLookups {
        async fn create(&self, user: &User) -> anyhow::Result<User> {
            self.0.create(user).await
        }

        async fn get_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
            self.0.get_by_id(id).await
        }

        async fn get_by_username(&self, _username: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn get_by_email(&self, _email: &str) -> anyhow::Result<Option<User>> {
            Ok(None)
        }

        async fn set_admin(&self, id: i64, is_admin: bool) -> anyhow::Result<bool> {
            self.0.set_admin(id, is_admin).await
        }

        async fn set_profile_image(&self, id: i64, composition_id: i64) -> anyhow::Result<()> {
            self.0.set_profile_image(id, composition_id).await
        }
    }

    #[tokio::test]
    async fn test_register_race_reports_duplicate() {
        let (pool, _) = setup_test_service().await;
        let service = UserService::new(
            Arc::new(StaleLookups(SqlxUserRepository::boxed(pool.clone()))),
            SqlxSessionRepository::boxed(pool.clone()),
        );

        service
            .register(RegisterInput::new("alice", "alice@example.com", "pw"))
            .await
            .expect("Failed to register");

        let result = service
            .register(RegisterInput::new("alice", "alice2@example.com", "pw"))
            .await;

        match result {
            Err(UserServiceError::UserExists(message)) => assert_eq!(message, MSG_USER_EXISTS),
            other => panic!("expected UserExists, got {:?}", other.map(|u| u.id)),
        }
        assert_eq!(user_count(&pool).await, 1);
    }

    #[tokio::test]
    async fn test_login_and_validate_session() {
        let (_pool, service) = setup_test_service().await;
        let user = service
            .register(RegisterInput::new("bob", "bob@example.com", "hunter2"))
            .await
            .expect("Failed to register");

        let session = service
            .login(LoginInput::new("bob", "hunter2"))
            .await
            .expect("Failed to login");

        let resolved = service
            .validate_session(&session.id)
            .await
            .expect("Failed to validate")
            .expect("Session should resolve");
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_login_errors_are_generic() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("bob", "bob@example.com", "hunter2"))
            .await
            .expect("Failed to register");

        let wrong_password = service.login(LoginInput::new("bob", "nope")).await;
        let unknown_user = service.login(LoginInput::new("carol", "hunter2")).await;

        for result in [wrong_password, unknown_user] {
            assert!(
                matches!(result, Err(UserServiceError::AuthenticationError(ref m)) if m == MSG_BAD_CREDENTIALS)
            );
        }
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("bob", "bob@example.com", "hunter2"))
            .await
            .unwrap();
        let session = service.login(LoginInput::new("bob", "hunter2")).await.unwrap();

        service.logout(&session.id).await.expect("Failed to logout");

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_resolves_to_none() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.unwrap();
        let service = UserService::with_session_expiration(
            SqlxUserRepository::boxed(pool.clone()),
            SqlxSessionRepository::boxed(pool.clone()),
            -1,
        );
        service
            .register(RegisterInput::new("bob", "bob@example.com", "hunter2"))
            .await
            .unwrap();
        let session = service.login(LoginInput::new("bob", "hunter2")).await.unwrap();

        assert!(service.validate_session(&session.id).await.unwrap().is_none());
        assert_eq!(service.cleanup_expired_sessions().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let (_pool, service) = setup_test_service().await;
        assert!(service.validate_session("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_admin_by_username() {
        let (_pool, service) = setup_test_service().await;
        service
            .register(RegisterInput::new("root", "root@example.com", "pw"))
            .await
            .unwrap();

        let promoted = service.set_admin("root", true).await.expect("Failed to promote");
        assert!(promoted.is_admin);

        let missing = service.set_admin("ghost", true).await;
        assert!(matches!(missing, Err(UserServiceError::NotFound(_))));
    }
}
