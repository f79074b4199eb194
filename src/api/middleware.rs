//! Shared state, per-request context and page errors
//!
//! `load_request_context` runs on every request: it resolves the signed
//! session cookie into a user, picks up pending flash messages and hands both
//! to handlers as a `RequestContext`. It also renders error pages on the way
//! out, since only it has both the theme and the viewer at hand.

use axum::{
    body::Body,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::convert::Infallible;
use std::sync::Arc;

use crate::api::cookies::{self, CookieSigner, FLASH_COOKIE, SESSION_COOKIE};
use crate::models::User;
use crate::services::{CommentService, CompositionService, UserService};
use crate::theme::{StandardTemplateVars, ThemeEngine};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub composition_service: Arc<CompositionService>,
    pub comment_service: Arc<CommentService>,
    pub theme_engine: Arc<ThemeEngine>,
    pub signer: Arc<CookieSigner>,
    /// Session lifetime, for the cookie's Max-Age
    pub session_ttl_days: i64,
    /// Largest single uploaded file, in bytes
    pub max_file_size: u64,
}

/// Who is asking, and what they still need to be told
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<User>,
    /// Flash messages left by the previous response
    pub flashes: Vec<String>,
    /// Verified session token, if the cookie carried one
    pub session_token: Option<String>,
}

impl RequestContext {
    /// The logged-in user, or a redirect to the login page with `message`.
    pub fn require_user(&self, message: &str) -> Result<&User, PageError> {
        self.user.as_ref().ok_or_else(|| PageError::Redirect {
            location: "/login".to_string(),
            message: message.to_string(),
        })
    }

    /// Template variables for a page rendered in this request
    pub fn template_vars(&self) -> StandardTemplateVars {
        StandardTemplateVars::new(self.user.as_ref(), self.flashes.clone())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolve the current user and pending flashes for every request.
pub async fn load_request_context(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let session_token = cookies::read_cookie(headers, SESSION_COOKIE)
        .and_then(|signed| state.signer.verify(signed));
    let flashes = cookies::read_cookie(headers, FLASH_COOKIE)
        .map(cookies::decode_flashes)
        .unwrap_or_default();

    let user = match &session_token {
        Some(token) => match state.user_service.validate_session(token).await {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!("Failed to resolve session: {:#}", e);
                None
            }
        },
        None => None,
    };

    let context = RequestContext {
        user,
        flashes,
        session_token,
    };
    request.extensions_mut().insert(context.clone());

    let mut response = next.run(request).await;

    if let Some(ErrorPage(message)) = response.extensions_mut().remove::<ErrorPage>() {
        let html = state
            .theme_engine
            .error_page(&message, &context.template_vars());
        response.headers_mut().remove(header::CONTENT_LENGTH);
        *response.body_mut() = Body::from(html);
    }

    // Shown on this page; a redirect passes them on instead.
    if !context.flashes.is_empty()
        && !response.status().is_redirection()
        && !sets_cookie(&response, FLASH_COOKIE)
    {
        if let Ok(value) = HeaderValue::from_str(&cookies::clear_cookie(FLASH_COOKIE)) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }

    response
}

fn sets_cookie(response: &Response, name: &str) -> bool {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.starts_with(&prefix))
}

/// Redirect to `location`, showing `message` there.
pub fn flash_redirect(location: &str, message: &str) -> Response {
    flash_redirect_with(location, message, None)
}

/// Like `flash_redirect`, with one more cookie to set.
pub fn flash_redirect_with(location: &str, message: &str, extra_cookie: Option<String>) -> Response {
    let mut response = Redirect::to(location).into_response();
    let set_cookies =
        std::iter::once(cookies::flash_cookie(&[message.to_string()])).chain(extra_cookie);
    for cookie in set_cookies {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::warn!("Dropped invalid cookie: {}", e),
        }
    }
    response
}

/// Marker asking `load_request_context` to render the themed error page
#[derive(Debug, Clone)]
struct ErrorPage(String);

/// Errors a page handler can end with
#[derive(Debug, thiserror::Error)]
pub enum PageError {
    /// Send the user elsewhere with a flash message
    #[error("Redirect to {location}: {message}")]
    Redirect { location: String, message: String },

    #[error("Page not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl PageError {
    pub fn redirect(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            PageError::Redirect { location, message } => {
                return flash_redirect(&location, &message);
            }
            PageError::NotFound => (StatusCode::NOT_FOUND, "Page not found.".to_string()),
            PageError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            PageError::Internal(e) => {
                tracing::error!("Request failed: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Something went wrong.".to_string(),
                )
            }
        };

        let mut response = (status, Html(message.clone())).into_response();
        response.extensions_mut().insert(ErrorPage(message));
        response
    }
}

/// Router fallback
pub async fn not_found() -> PageError {
    PageError::NotFound
}
