//! Backdrop - portrait gallery server

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use backdrop::{
    api::{self, AppState, CookieSigner},
    config::Config,
    db::{
        self,
        repositories::{
            SqlxCommentRepository, SqlxCompositionRepository, SqlxImageRepository,
            SqlxSessionRepository, SqlxUserRepository,
        },
    },
    services::{segmentation, CommentService, CompositionService, UploadStore, UserService},
    theme::ThemeEngine,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "backdrop=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Backdrop...");

    // Load configuration
    let config = Config::load_with_env(Path::new("config.yml"))?;
    tracing::info!("Configuration loaded");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {}", config.database.url);

    // Run migrations
    db::migrations::run_migrations(&pool).await?;
    tracing::info!("Database migrations completed");

    // Artifact directories
    let store = UploadStore::new(&config.upload);
    store.ensure_dirs().await?;
    tracing::info!("Artifacts stored under {}", store.root().display());

    // Create repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let composition_repo = SqlxCompositionRepository::boxed(pool.clone());
    let image_repo = SqlxImageRepository::boxed(pool.clone());
    let comment_repo = SqlxCommentRepository::boxed(pool.clone());

    // Initialize services
    let user_service = Arc::new(UserService::with_session_expiration(
        user_repo.clone(),
        session_repo,
        config.session.ttl_days,
    ));
    match user_service.cleanup_expired_sessions().await {
        Ok(0) => {}
        Ok(count) => tracing::info!("Removed {} expired sessions", count),
        Err(e) => tracing::warn!("Failed to clean up sessions: {}", e),
    }

    let segmenter = segmentation::from_config(&config.segmentation)?;
    tracing::info!("Segmentation backend: {:?}", config.segmentation.backend);
    let composition_service = Arc::new(CompositionService::new(
        composition_repo.clone(),
        image_repo,
        user_repo,
        store,
        segmenter,
    ));
    let comment_service = Arc::new(CommentService::new(comment_repo, composition_repo));

    // Initialize theme engine
    let theme_engine = ThemeEngine::new()?;
    tracing::info!("Page templates loaded");

    // Build application state
    let state = AppState {
        user_service,
        composition_service,
        comment_service,
        theme_engine: Arc::new(theme_engine),
        signer: Arc::new(CookieSigner::new(&config.session.signing_key())?),
        session_ttl_days: config.session.ttl_days,
        max_file_size: config.upload.max_file_size,
    };

    // Build router
    let app = api::build_router(state, &config.upload);

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
