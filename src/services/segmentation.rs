//! Background removal
//!
//! The `Segmenter` trait is the seam. The server runs either an external
//! program (`CommandSegmenter`) or, with the `imgly` feature, an ONNX model
//! in-process (`ImglySegmenter`). Tests plug in their own.

use anyhow::{Context, Result};
use async_trait::async_trait;
use image::RgbaImage;
use std::path::Path;
use std::sync::Arc;
use tokio::process::Command;

use crate::config::{SegmentationBackend, SegmentationConfig};

/// Removes the background from a photo.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Return `source` with its background made transparent.
    async fn remove_background(&self, source: &Path) -> Result<RgbaImage>;
}

/// Build the segmenter selected by `config.backend`.
pub fn from_config(config: &SegmentationConfig) -> Result<Arc<dyn Segmenter>> {
    match config.backend {
        SegmentationBackend::Command => Ok(Arc::new(CommandSegmenter::new(config))),
        #[cfg(feature = "imgly")]
        SegmentationBackend::Imgly => Ok(Arc::new(imgly::ImglySegmenter::new(config)?)),
        #[cfg(not(feature = "imgly"))]
        SegmentationBackend::Imgly => {
            anyhow::bail!("the imgly segmentation backend needs a build with `--features imgly`")
        }
    }
}

/// Runs a configured command that reads `{input}` and writes a PNG to `{output}`.
#[derive(Debug, Clone)]
pub struct CommandSegmenter {
    command: String,
    args: Vec<String>,
}

impl CommandSegmenter {
    pub fn new(config: &SegmentationConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

#[async_trait]
impl Segmenter for CommandSegmenter {
    async fn remove_background(&self, source: &Path) -> Result<RgbaImage> {
        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
        let output_path = scratch.path().join("cutout.png");
        let args = self.render_args(source, &output_path);

        tracing::debug!(command = %self.command, ?args, "Running segmentation");
        let output = Command::new(&self.command)
            .args(&args)
            .output()
            .await
            .with_context(|| format!("Failed to run segmentation command `{}`", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "`{}` exited with status {}: {}",
                self.command,
                output.status,
                stderr.trim()
            );
        }

        let cutout = tokio::task::spawn_blocking(move || -> Result<RgbaImage> {
            let decoded = image::open(&output_path)
                .with_context(|| format!("Failed to read {}", output_path.display()))?;
            Ok(decoded.into_rgba8())
        })
        .await
        .context("Segmentation decode task panicked")??;

        // The scratch dir must outlive the decode above.
        drop(scratch);
        Ok(cutout)
    }
}

#[cfg(feature = "imgly")]
pub use imgly::ImglySegmenter;

#[cfg(feature = "imgly")]
mod imgly {
    use super::*;
    use imgly_bgremove::{
        BackendType, BackgroundRemovalProcessor, ExecutionProvider, ModelSource, ModelSpec,
        ProcessorConfig, ProcessorConfigBuilder,
    };

    /// Runs an ONNX segmentation model on the Tract backend.
    #[derive(Debug, Clone)]
    pub struct ImglySegmenter {
        config: ProcessorConfig,
    }

    impl ImglySegmenter {
        pub fn new(config: &SegmentationConfig) -> Result<Self> {
            let source = match &config.model_path {
                Some(path) => ModelSource::External(path.clone()),
                None => ModelSource::Downloaded(config.model.clone()),
            };
            let config = ProcessorConfigBuilder::new()
                .model_spec(ModelSpec {
                    source,
                    variant: None,
                })
                .backend_type(BackendType::Tract)
                .execution_provider(ExecutionProvider::Cpu)
                .build()
                .context("Invalid segmentation model settings")?;
            Ok(Self { config })
        }
    }

    #[async_trait]
    impl Segmenter for ImglySegmenter {
        async fn remove_background(&self, source: &Path) -> Result<RgbaImage> {
            let source = source.to_path_buf();
            let config = self.config.clone();

            tracing::debug!(path = %source.display(), "Running in-process segmentation");
            tokio::task::spawn_blocking(move || -> Result<RgbaImage> {
                let photo = image::ImageReader::open(&source)
                    .and_then(|reader| reader.with_guessed_format())
                    .with_context(|| format!("Failed to open {}", source.display()))?
                    .decode()
                    .with_context(|| format!("Failed to decode {}", source.display()))?;
                // The processor is not Send, so it lives and dies on this thread.
                let mut processor = BackgroundRemovalProcessor::new(config)
                    .context("Failed to initialise segmentation model")?;
                let result = processor
                    .process_image(&photo)
                    .with_context(|| format!("Segmentation failed for {}", source.display()))?;
                Ok(result.image.into_rgba8())
            })
            .await
            .context("Segmentation task panicked")?
        }
    }
}
