//! Composition service
//!
//! The upload pipeline and everything done to a composition afterwards:
//! - validate, store, segment and optionally composite an upload
//! - swap the background of an existing composition
//! - visibility-filtered listing and lookup
//! - likes and profile pictures
//!
//! Validation happens before anything is written. Image decoding, resizing
//! and encoding run on the blocking pool.

use anyhow::Context;
use image::{imageops, imageops::FilterType, RgbaImage};
use std::path::Path;
use std::sync::Arc;

use crate::db::repositories::{CompositionRepository, ImageRepository, UserRepository};
use crate::models::{
    can_edit, Background, Composition, CompositionView, GalleryScope, Image, NewUpload, User,
};
use crate::services::segmentation::Segmenter;
use crate::services::storage::{allowed_file, file_extension, ArtifactKind, UploadStore};

/// Error types for composition operations
#[derive(Debug, thiserror::Error)]
pub enum CompositionServiceError {
    #[error("Frontal image not found.")]
    MissingSubject,

    #[error("Frontal image type not supported.")]
    UnsupportedSubjectType,

    #[error("Background image not found.")]
    MissingBackground,

    #[error("Background image type not supported.")]
    UnsupportedBackgroundType,

    #[error("Composition not found")]
    NotFound,

    /// The viewer may not see this composition
    #[error("This image is private.")]
    Private,

    /// The user may not modify this composition
    #[error("You have no permission to change this image.")]
    Forbidden,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

type Result<T> = std::result::Result<T, CompositionServiceError>;

/// A file taken from a multipart form
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied name; only its extension is used
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Input for a new upload
#[derive(Debug, Clone)]
pub struct UploadInput {
    pub user_id: i64,
    pub subject: Option<UploadedFile>,
    pub background: Option<UploadedFile>,
    pub is_public: bool,
}

/// Everything the detail page shows about a composition
#[derive(Debug, Clone)]
pub struct CompositionDetail {
    pub view: CompositionView,
    pub image: Option<Image>,
    pub background: Option<Background>,
    /// Whether the viewer has liked it (false when anonymous)
    pub liked: bool,
}

/// Composition service
pub struct CompositionService {
    compositions: Arc<dyn CompositionRepository>,
    images: Arc<dyn ImageRepository>,
    users: Arc<dyn UserRepository>,
    store: UploadStore,
    segmenter: Arc<dyn Segmenter>,
}

impl CompositionService {
    pub fn new(
        compositions: Arc<dyn CompositionRepository>,
        images: Arc<dyn ImageRepository>,
        users: Arc<dyn UserRepository>,
        store: UploadStore,
        segmenter: Arc<dyn Segmenter>,
    ) -> Self {
        Self {
            compositions,
            images,
            users,
            store,
            segmenter,
        }
    }

    /// Run the full upload pipeline and persist the result.
    pub async fn process_upload(&self, input: UploadInput) -> Result<Composition> {
        let subject = match input.subject {
            Some(file) if !file.filename.is_empty() => file,
            _ => return Err(CompositionServiceError::MissingSubject),
        };
        let subject_ext = checked_extension(&subject.filename)
            .ok_or(CompositionServiceError::UnsupportedSubjectType)?;

        let background = match input.background {
            Some(file) if !file.filename.is_empty() => {
                let ext = checked_extension(&file.filename)
                    .ok_or(CompositionServiceError::UnsupportedBackgroundType)?;
                Some((file, ext))
            }
            _ => None,
        };

        let original_path = self
            .store
            .save(ArtifactKind::Original, &subject_ext, &subject.bytes)
            .await?;
        let background_path = match &background {
            Some((file, ext)) => Some(
                self.store
                    .save(ArtifactKind::Background, ext, &file.bytes)
                    .await?,
            ),
            None => None,
        };

        let cutout = self
            .segmenter
            .remove_background(&self.store.absolute(&original_path))
            .await
            .context("Background removal failed")?;

        let cutout_path = self.store.new_relative_path(ArtifactKind::Cutout, "png");
        let output_path = match &background_path {
            Some(_) => self.store.new_relative_path(ArtifactKind::Composed, "png"),
            None => cutout_path.clone(),
        };

        let cutout_file = self.store.absolute(&cutout_path);
        let composed = background_path
            .as_deref()
            .map(|bg| (self.store.absolute(bg), self.store.absolute(&output_path)));
        run_blocking(move || {
            save_png(&cutout, &cutout_file)?;
            if let Some((bg_file, out_file)) = composed {
                compose_onto(&cutout, &bg_file, &out_file)?;
            }
            Ok(())
        })
        .await?;

        let composition = self
            .compositions
            .create_upload(&NewUpload {
                user_id: input.user_id,
                original_path,
                cutout_path,
                background_path,
                output_path,
                is_public: input.is_public,
            })
            .await?;

        tracing::info!(
            composition_id = composition.id,
            user_id = input.user_id,
            with_background = composition.background_id.is_some(),
            "Upload processed"
        );
        Ok(composition)
    }

    /// Put an existing cutout over a new background.
    ///
    /// The previous output is deleted afterwards unless it is the cutout.
    pub async fn recompose(
        &self,
        composition_id: i64,
        user: &User,
        background: Option<UploadedFile>,
    ) -> Result<CompositionView> {
        let view = self.get_view(composition_id).await?;
        if !can_edit(view.owner_id, Some(user)) {
            return Err(CompositionServiceError::Forbidden);
        }

        let background = match background {
            Some(file) if !file.filename.is_empty() => file,
            _ => return Err(CompositionServiceError::MissingBackground),
        };
        let ext = checked_extension(&background.filename)
            .ok_or(CompositionServiceError::UnsupportedBackgroundType)?;

        let bg_path = self
            .store
            .save(ArtifactKind::Background, &ext, &background.bytes)
            .await?;
        let output_path = self.store.new_relative_path(ArtifactKind::Composed, "png");

        let cutout_file = self.store.absolute(&view.cutout_path);
        let bg_file = self.store.absolute(&bg_path);
        let out_file = self.store.absolute(&output_path);
        run_blocking(move || {
            let cutout = open_rgba(&cutout_file)?;
            compose_onto(&cutout, &bg_file, &out_file)
        })
        .await?;

        self.compositions
            .replace_background(view.id, user.id, &bg_path, &output_path)
            .await?;

        if view.output_path != view.cutout_path {
            self.store.remove(&view.output_path).await;
        }

        tracing::info!(composition_id = view.id, user_id = user.id, "Background replaced");
        self.get_view(view.id).await
    }

    /// Gallery listing for a viewer, newest first
    pub async fn list_visible(&self, viewer: Option<&User>) -> Result<Vec<CompositionView>> {
        let views = self
            .compositions
            .list(GalleryScope::for_viewer(viewer))
            .await?;
        Ok(views)
    }

    /// A composition the viewer is allowed to see
    pub async fn get_visible(&self, id: i64, viewer: Option<&User>) -> Result<CompositionView> {
        let view = self.get_view(id).await?;
        if !view.is_visible_to(viewer) {
            return Err(CompositionServiceError::Private);
        }
        Ok(view)
    }

    /// Detail page data
    pub async fn get_detail(&self, id: i64, viewer: Option<&User>) -> Result<CompositionDetail> {
        let view = self.get_visible(id, viewer).await?;

        let image = self.images.get_by_id(view.image_id).await?;
        let background = match view.background_id {
            Some(background_id) => self.images.get_background(background_id).await?,
            None => None,
        };
        let liked = match viewer {
            Some(user) => self.compositions.is_liked(user.id, view.id).await?,
            None => false,
        };

        Ok(CompositionDetail {
            view,
            image,
            background,
            liked,
        })
    }

    /// Use a composition as the user's profile picture
    pub async fn set_profile(&self, id: i64, user: &User) -> Result<()> {
        let view = self.get_visible(id, Some(user)).await?;
        self.users
            .set_profile_image(user.id, view.id)
            .await
            .context("Failed to set profile image")?;
        Ok(())
    }

    /// Like or unlike. Returns whether the composition is now liked.
    pub async fn toggle_like(&self, id: i64, user: &User) -> Result<bool> {
        let view = self.get_visible(id, Some(user)).await?;
        if self.compositions.remove_like(user.id, view.id).await? {
            return Ok(false);
        }
        self.compositions.add_like(user.id, view.id).await?;
        Ok(true)
    }

    async fn get_view(&self, id: i64) -> Result<CompositionView> {
        self.compositions
            .get_view(id)
            .await?
            .ok_or(CompositionServiceError::NotFound)
    }
}

fn checked_extension(filename: &str) -> Option<String> {
    if allowed_file(filename) {
        file_extension(filename)
    } else {
        None
    }
}

async fn run_blocking<F>(work: F) -> anyhow::Result<()>
where
    F: FnOnce() -> anyhow::Result<()> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .context("Image task panicked")?
}

/// Decode by content rather than by extension; clients misname files.
fn open_rgba(path: &Path) -> anyhow::Result<RgbaImage> {
    let decoded = image::ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .with_context(|| format!("Failed to open {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    Ok(decoded.into_rgba8())
}

fn save_png(image: &RgbaImage, path: &Path) -> anyhow::Result<()> {
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Resize the background to the cutout's size and lay the cutout over it.
fn compose_onto(cutout: &RgbaImage, background: &Path, output: &Path) -> anyhow::Result<()> {
    let bg = open_rgba(background)?;

    let (width, height) = cutout.dimensions();
    let mut canvas = imageops::resize(&bg, width, height, FilterType::Lanczos3);
    imageops::overlay(&mut canvas, cutout, 0, 0);

    save_png(&canvas, output)
}
