//! Embedded stylesheet and other site assets
//!
//! Uploaded artifacts live on disk and are served from `/static`; the files
//! here ship inside the binary and are served from `/assets`.

use axum::{
    extract::Path,
    http::header,
    response::{IntoResponse, Response},
};
use rust_embed::RustEmbed;

use crate::api::middleware::PageError;

/// Site assets
#[derive(RustEmbed)]
#[folder = "assets/"]
struct SiteAssets;

/// GET /assets/{*path}
pub async fn serve_asset(Path(path): Path<String>) -> Response {
    let decoded = urlencoding::decode(&path).unwrap_or_else(|_| path.as_str().into());
    match SiteAssets::get(decoded.trim_start_matches('/')) {
        Some(file) => build_response(&decoded, file.data.into_owned()),
        None => PageError::NotFound.into_response(),
    }
}

fn build_response(path: &str, data: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, get_content_type(path)),
            (header::CACHE_CONTROL, "public, max-age=3600"),
        ],
        data,
    )
        .into_response()
}

/// Get content type from file extension
fn get_content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or("") {
        "css" => "text/css",
        "js" => "application/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "webp" => "image/webp",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}
