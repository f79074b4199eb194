//! Registration, login and logout pages

use axum::{
    extract::{Form, State},
    response::{Html, Response},
};
use serde::Deserialize;
use tera::Context as TeraContext;

use crate::api::cookies::{self, SESSION_COOKIE};
use crate::api::middleware::{flash_redirect, flash_redirect_with, AppState, PageError, RequestContext};
use crate::services::{LoginInput, RegisterInput, UserServiceError};

/// Registration form
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login form
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// GET /register
pub async fn register_page(State(state): State<AppState>, ctx: RequestContext) -> Html<String> {
    Html(state.theme_engine.render_with_fallback(
        "register.html",
        &TeraContext::new(),
        &ctx.template_vars(),
    ))
}

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<Response, PageError> {
    let input = RegisterInput::new(form.username, form.email, form.password);
    match state.user_service.register(input).await {
        Ok(_) => Ok(flash_redirect("/login", "Successfully registered.")),
        Err(UserServiceError::ValidationError(message))
        | Err(UserServiceError::UserExists(message)) => Ok(flash_redirect("/register", &message)),
        Err(e) => Err(PageError::Internal(e.into())),
    }
}

/// GET /login
pub async fn login_page(State(state): State<AppState>, ctx: RequestContext) -> Html<String> {
    Html(state.theme_engine.render_with_fallback(
        "login.html",
        &TeraContext::new(),
        &ctx.template_vars(),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    let input = LoginInput::new(form.username, form.password);
    match state.user_service.login(input).await {
        Ok(session) => {
            let cookie = cookies::session_cookie(
                &state.signer.sign(&session.id),
                state.session_ttl_days,
            );
            Ok(flash_redirect_with("/", "Successfully logged in.", Some(cookie)))
        }
        Err(UserServiceError::AuthenticationError(message)) => {
            Ok(flash_redirect("/login", &message))
        }
        Err(e) => Err(PageError::Internal(e.into())),
    }
}

/// GET /logout
pub async fn logout(State(state): State<AppState>, ctx: RequestContext) -> Response {
    if let Some(token) = &ctx.session_token {
        if let Err(e) = state.user_service.logout(token).await {
            tracing::warn!("Failed to delete session on logout: {:#}", e);
        }
    }

    flash_redirect_with(
        "/",
        "Successfully logged out.",
        Some(cookies::clear_cookie(SESSION_COOKIE)),
    )
}
