//! Gallery, upload and composition pages

use axum::{
    extract::{multipart::MultipartError, Form, Multipart, Path, State},
    http::StatusCode,
    response::{Html, Response},
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::middleware::{flash_redirect, AppState, PageError, RequestContext};
use crate::models::{can_edit, CommentWithAuthor};
use crate::services::{
    CommentServiceError, CompositionServiceError, UploadInput, UploadedFile,
};

/// Message for routes that need a login but say nothing more specific
pub const MSG_SIGN_IN: &str = "Sign in first.";

/// Flashed when one uploaded file, or the whole body, is over the limit
pub const MSG_FILE_TOO_LARGE: &str = "File is too large.";

/// Fields of the upload and recompose forms
#[derive(Debug, Default)]
pub struct UploadForm {
    pub subject: Option<UploadedFile>,
    pub background: Option<UploadedFile>,
    pub visibility: Option<String>,
}

impl UploadForm {
    /// Anything other than "public" makes the upload private; no choice at
    /// all means public.
    pub fn is_public(&self) -> bool {
        self.visibility.as_deref().unwrap_or("public") == "public"
    }
}

/// Read `subject`, `background` and `visibility` from a multipart body.
///
/// A file over `max_file_size` bytes, or a body over the router's limit,
/// becomes a flash redirect to `back_to`.
pub async fn read_upload_form(
    mut multipart: Multipart,
    max_file_size: u64,
    back_to: &str,
) -> Result<UploadForm, PageError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, back_to))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "subject" | "background" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let mut bytes = Vec::new();
                while let Some(chunk) = field
                    .chunk()
                    .await
                    .map_err(|e| multipart_error(e, back_to))?
                {
                    bytes.extend_from_slice(&chunk);
                    if bytes.len() as u64 > max_file_size {
                        tracing::debug!(field = %name, limit = max_file_size, "Upload too large");
                        return Err(PageError::redirect(back_to, MSG_FILE_TOO_LARGE));
                    }
                }
                let file = Some(UploadedFile::new(filename, bytes));
                if name == "subject" {
                    form.subject = file;
                } else {
                    form.background = file;
                }
            }
            "visibility" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(e, back_to))?;
                form.visibility = Some(value);
            }
            _ => {}
        }
    }

    Ok(form)
}

fn multipart_error(e: MultipartError, back_to: &str) -> PageError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        PageError::redirect(back_to, MSG_FILE_TOO_LARGE)
    } else {
        PageError::BadRequest(e.body_text())
    }
}

/// Map a composition error to a page outcome. Validation failures go back
/// to `back_to`; private compositions always send the viewer to the gallery.
fn composition_error(e: CompositionServiceError, back_to: &str) -> PageError {
    match e {
        CompositionServiceError::NotFound => PageError::NotFound,
        CompositionServiceError::Private => PageError::redirect("/", e.to_string()),
        CompositionServiceError::Internal(e) => PageError::Internal(e),
        other => PageError::redirect(back_to, other.to_string()),
    }
}

/// GET /
pub async fn gallery(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    let compositions = state
        .composition_service
        .list_visible(ctx.user.as_ref())
        .await
        .map_err(|e| composition_error(e, "/"))?;

    let mut context = TeraContext::new();
    context.insert("compositions", &compositions);

    Ok(Html(state.theme_engine.render_with_fallback(
        "gallery.html",
        &context,
        &ctx.template_vars(),
    )))
}

/// POST /
pub async fn upload(
    State(state): State<AppState>,
    ctx: RequestContext,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let user = ctx.require_user("You need to be logged in to upload images.")?;
    let form = read_upload_form(multipart, state.max_file_size, "/").await?;

    let input = UploadInput {
        user_id: user.id,
        is_public: form.is_public(),
        subject: form.subject,
        background: form.background,
    };
    let composition = state
        .composition_service
        .process_upload(input)
        .await
        .map_err(|e| composition_error(e, "/"))?;

    Ok(flash_redirect(
        &format!("/composition/{}", composition.id),
        "Finished",
    ))
}

/// A comment as the detail page lists it
#[derive(Debug, Serialize)]
struct CommentRow {
    #[serde(flatten)]
    comment: CommentWithAuthor,
    /// Viewer may edit or delete it
    can_modify: bool,
}

/// GET /composition/{id}
pub async fn composition_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
) -> Result<Html<String>, PageError> {
    let viewer = ctx.user.as_ref();
    let detail = state
        .composition_service
        .get_detail(id, viewer)
        .await
        .map_err(|e| composition_error(e, "/"))?;

    let comments: Vec<CommentRow> = state
        .comment_service
        .list_for(detail.view.id)
        .await
        .map_err(|e| PageError::Internal(e.into()))?
        .into_iter()
        .map(|comment| CommentRow {
            can_modify: can_edit(comment.comment.user_id, viewer),
            comment,
        })
        .collect();

    let mut context = TeraContext::new();
    context.insert("composition", &detail.view);
    context.insert("image", &detail.image);
    context.insert("background", &detail.background);
    context.insert("liked", &detail.liked);
    context.insert("can_edit", &can_edit(detail.view.owner_id, viewer));
    context.insert("comments", &comments);

    Ok(Html(state.theme_engine.render_with_fallback(
        "composition_detail.html",
        &context,
        &ctx.template_vars(),
    )))
}

/// Comment form on the detail page
#[derive(Debug, Deserialize)]
pub struct CommentForm {
    #[serde(default)]
    pub text: String,
}

/// POST /composition/{id}
pub async fn post_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let detail_url = format!("/composition/{}", id);

    let Some(user) = ctx.user.as_ref() else {
        // A private image is reported before the missing login.
        state
            .composition_service
            .get_visible(id, None)
            .await
            .map_err(|e| composition_error(e, "/"))?;
        return Err(PageError::redirect(
            "/login",
            "You need to be logged in to post comments.",
        ));
    };

    match state.comment_service.create(id, user, &form.text).await {
        Ok(_) => Ok(flash_redirect(&detail_url, "Comment successfully posted.")),
        Err(CommentServiceError::EmptyText) => Ok(flash_redirect(
            &detail_url,
            &CommentServiceError::EmptyText.to_string(),
        )),
        Err(CommentServiceError::CompositionNotFound) => Err(PageError::NotFound),
        Err(e @ CommentServiceError::Private) => Ok(flash_redirect("/", &e.to_string())),
        Err(e) => Err(PageError::Internal(e.into())),
    }
}

/// POST /composition/{id}/set_profile
pub async fn set_profile(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    let user = ctx.require_user(MSG_SIGN_IN)?;
    let detail_url = format!("/composition/{}", id);

    match state.composition_service.set_profile(id, user).await {
        Ok(()) => Ok(flash_redirect(
            &detail_url,
            "Profile picture successfully updated.",
        )),
        Err(CompositionServiceError::Private) => Ok(flash_redirect(
            &detail_url,
            "This image is private, you may not set it as profile picture",
        )),
        Err(e) => Err(composition_error(e, &detail_url)),
    }
}

/// POST /composition/{id}/like
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
) -> Result<Response, PageError> {
    let user = ctx.require_user(MSG_SIGN_IN)?;
    let detail_url = format!("/composition/{}", id);

    let liked = state
        .composition_service
        .toggle_like(id, user)
        .await
        .map_err(|e| composition_error(e, &detail_url))?;

    let message = if liked { "Liked." } else { "Like removed." };
    Ok(flash_redirect(&detail_url, message))
}

/// POST /composition/{id}/recompose
pub async fn recompose(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    ctx: RequestContext,
    multipart: Multipart,
) -> Result<Response, PageError> {
    let user = ctx.require_user(MSG_SIGN_IN)?;
    let detail_url = format!("/composition/{}", id);
    let form = read_upload_form(multipart, state.max_file_size, &detail_url).await?;

    state
        .composition_service
        .recompose(id, user, form.background)
        .await
        .map_err(|e| composition_error(e, &detail_url))?;

    Ok(flash_redirect(&detail_url, "Background replaced."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_visibility_defaults_to_public() {
        let mut form = UploadForm::default();
        assert!(form.is_public());

        form.visibility = Some("public".to_string());
        assert!(form.is_public());

        form.visibility = Some("private".to_string());
        assert!(!form.is_public());
    }

    #[test]
    fn test_composition_error_mapping() {
        assert!(matches!(
            composition_error(CompositionServiceError::NotFound, "/x"),
            PageError::NotFound
        ));

        match composition_error(CompositionServiceError::Private, "/composition/3") {
            PageError::Redirect { location, message } => {
                assert_eq!(location, "/");
                assert_eq!(message, "This image is private.");
            }
            other => panic!("unexpected: {:?}", other),
        }

        match composition_error(CompositionServiceError::UnsupportedSubjectType, "/") {
            PageError::Redirect { location, message } => {
                assert_eq!(location, "/");
                assert_eq!(message, "Frontal image type not supported.");
            }
            other => panic!("unexpected: {:?}", other),
        }

        assert!(matches!(
            composition_error(anyhow::anyhow!("disk full").into(), "/"),
            PageError::Internal(_)
        ));
    }

    proptest! {
        #[test]
        fn only_public_is_public(value in "[a-z]{0,10}") {
            let form = UploadForm {
                visibility: Some(value.clone()),
                ..Default::default()
            };
            prop_assert_eq!(form.is_public(), value == "public");
        }
    }
}
