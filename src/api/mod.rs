//! HTTP layer - page handlers and routing
//!
//! Server-rendered pages only:
//! - gallery, upload and composition detail
//! - comment editing and deletion
//! - registration, login and logout
//! - uploaded artifacts under `/static`, embedded assets under `/assets`

pub mod auth;
pub mod comments;
pub mod cookies;
pub mod gallery;
pub mod middleware;
pub mod static_files;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::config::UploadConfig;

pub use cookies::CookieSigner;
pub use middleware::{AppState, PageError, RequestContext};

/// Build the application router
pub fn build_router(state: AppState, upload: &UploadConfig) -> Router {
    let body_limit = usize::try_from(upload.max_request_size()).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(gallery::gallery).post(gallery::upload))
        .route(
            "/composition/{id}",
            get(gallery::composition_detail).post(gallery::post_comment),
        )
        .route("/composition/{id}/set_profile", post(gallery::set_profile))
        .route("/composition/{id}/like", post(gallery::toggle_like))
        .route("/composition/{id}/recompose", post(gallery::recompose))
        .route(
            "/comment/{id}/edit",
            get(comments::edit_page).post(comments::update),
        )
        .route("/comment/{id}/delete", post(comments::delete))
        .route("/register", get(auth::register_page).post(auth::register))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout))
        .route("/ping", get(ping))
        .route("/assets/{*path}", get(static_files::serve_asset))
        .nest_service("/static", ServeDir::new(&upload.static_root))
        .fallback(middleware::not_found)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::load_request_context,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check
async fn ping() -> &'static str {
    "OK"
}
