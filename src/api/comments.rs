//! Comment editing and deletion

use axum::{
    extract::{Form, Path, State},
    response::{Html, Response},
};
use tera::Context as TeraContext;

use crate::api::gallery::{CommentForm, MSG_SIGN_IN};
use crate::api::middleware::{flash_redirect, AppState, PageError, RequestContext};
use crate::services::CommentServiceError;

fn comment_error(e: CommentServiceError, denied: &str) -> PageError {
    match e {
        CommentServiceError::NotFound => PageError::NotFound,
        CommentServiceError::Forbidden { composition_id } => {
            PageError::redirect(format!("/composition/{}", composition_id), denied)
        }
        e => PageError::Internal(e.into()),
    }
}

/// GET /comment/{id}/edit
pub async fn edit_page(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    let user = ctx.require_user(MSG_SIGN_IN)?;
    let comment = state
        .comment_service
        .get_editable(id, user)
        .await
        .map_err(|e| comment_error(e, "You have no permission to edit this comment."))?;

    let mut context = TeraContext::new();
    context.insert("comment", &comment);

    Ok(Html(state.theme_engine.render_with_fallback(
        "edit_comment.html",
        &context,
        &ctx.template_vars(),
    )))
}

/// POST /comment/{id}/edit
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let user = ctx.require_user(MSG_SIGN_IN)?;

    match state.comment_service.update(id, user, &form.text).await {
        Ok(comment) => Ok(flash_redirect(
            &format!("/composition/{}", comment.composition_id),
            "Comment updated.",
        )),
        Err(e @ CommentServiceError::EmptyText) => Ok(flash_redirect(
            &format!("/comment/{}/edit", id),
            &e.to_string(),
        )),
        Err(e) => Err(comment_error(e, "You have no permission to edit this comment.")),
    }
}

/// POST /comment/{id}/delete
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    let user = ctx.require_user(MSG_SIGN_IN)?;

    let comment = state
        .comment_service
        .delete(id, user)
        .await
        .map_err(|e| comment_error(e, "You have no permission to delete this comment."))?;

    Ok(flash_redirect(
        &format!("/composition/{}", comment.composition_id),
        "Comment successfully deleted.",
    ))
}
