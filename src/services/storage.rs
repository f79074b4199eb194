//! Artifact storage
//!
//! Every file the gallery produces lives under one static root, split into
//! four directories (originals, cutouts, backgrounds, composed outputs).
//! Paths handed to the database are relative to that root and always use
//! `/` separators so they can be dropped straight into a `/static/` URL.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

use crate::config::UploadConfig;

/// File extensions accepted for subject and background uploads
pub const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Lowercased text after the last `.` of a filename, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    let (_, ext) = filename.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Whether `filename` carries one of the allowed image extensions.
pub fn allowed_file(filename: &str) -> bool {
    file_extension(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Which storage directory an artifact belongs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Original,
    Cutout,
    Background,
    Composed,
}

/// Maps artifacts between their stored relative paths and the filesystem.
#[derive(Debug, Clone)]
pub struct UploadStore {
    root: PathBuf,
    original_dir: String,
    cutout_dir: String,
    background_dir: String,
    composed_dir: String,
}

impl UploadStore {
    pub fn new(config: &UploadConfig) -> Self {
        let clean = |dir: &str| dir.trim_matches('/').to_string();
        Self {
            root: config.static_root.clone(),
            original_dir: clean(&config.original_dir),
            cutout_dir: clean(&config.cutout_dir),
            background_dir: clean(&config.background_dir),
            composed_dir: clean(&config.composed_dir),
        }
    }

    /// The static root everything is stored under
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir(&self, kind: ArtifactKind) -> &str {
        match kind {
            ArtifactKind::Original => &self.original_dir,
            ArtifactKind::Cutout => &self.cutout_dir,
            ArtifactKind::Background => &self.background_dir,
            ArtifactKind::Composed => &self.composed_dir,
        }
    }

    /// Create the four artifact directories if missing
    pub async fn ensure_dirs(&self) -> Result<()> {
        for kind in [
            ArtifactKind::Original,
            ArtifactKind::Cutout,
            ArtifactKind::Background,
            ArtifactKind::Composed,
        ] {
            let dir = self.absolute(self.dir(kind));
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// A fresh `<dir>/<uuid>.<ext>` path for a new artifact
    pub fn new_relative_path(&self, kind: ArtifactKind, ext: &str) -> String {
        format!("{}/{}.{}", self.dir(kind), Uuid::new_v4().simple(), ext)
    }

    /// Filesystem location of a stored relative path
    pub fn absolute(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    /// Write uploaded bytes under a generated name, returning the relative path
    pub async fn save(&self, kind: ArtifactKind, ext: &str, bytes: &[u8]) -> Result<String> {
        let relative = self.new_relative_path(kind, ext);
        let path = self.absolute(&relative);

        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to save {}", path.display()))?;

        tracing::debug!(path = %relative, size = bytes.len(), "Stored upload");
        Ok(relative)
    }

    /// Delete a stored artifact. Failures are logged, never returned.
    pub async fn remove(&self, relative: &str) {
        let path = self.absolute(relative);
        if let Err(e) = fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), "Could not delete artifact: {}", e);
        }
    }
}
