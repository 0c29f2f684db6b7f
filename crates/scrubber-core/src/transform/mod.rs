//! Per-type transforms and the extension-keyed dispatcher.
//!
//! A transform turns one staged input file into one metadata-free output
//! file. The ingest pipeline never names a concrete transform: it asks the
//! [`TransformRegistry`] for whatever is registered under the submission's
//! lowercase extension. Adding a media type means registering another
//! entry.

#[cfg(feature = "heic")]
pub mod heif;
pub mod image;
pub mod orientation;
pub mod video;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{PipelineError, PipelineResult};
use crate::types::extension_of;

pub use self::image::{ImageCodec, ImageTransform, StandardCodec};
pub use orientation::Orientation;
pub use video::VideoTransform;

/// Broad media category of a transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Trait that every media transform implements.
///
/// Uses `async_trait` because the registry stores `Arc<dyn Transform>`.
#[async_trait]
pub trait Transform: Send + Sync {
    /// Transform name for logging (e.g., "image", "video").
    fn name(&self) -> &str;

    fn kind(&self) -> MediaKind;

    /// Extension of produced files, without the dot.
    fn output_extension(&self) -> &str;

    /// Read `input`, write the stripped result to `output`.
    ///
    /// `output` may already exist as an empty placeholder and must be
    /// overwritten. Errors leave no usable output behind.
    async fn apply(&self, input: &Path, output: &Path) -> PipelineResult<()>;
}

/// Maps lowercase file extensions to transforms.
#[derive(Clone, Default)]
pub struct TransformRegistry {
    by_extension: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in image and video transforms.
    ///
    /// In image-only mode video extensions are left unregistered, so they
    /// classify as unsupported.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();

        let image: Arc<dyn Transform> = Arc::new(ImageTransform::new(
            StandardCodec,
            config.image.quality,
            config.limits.decode_timeout_ms,
        ));
        registry.register_all(&config.image.extensions, image);

        if !config.processing.image_only {
            let video: Arc<dyn Transform> = Arc::new(VideoTransform::new(
                config.video.clone(),
                config.limits.transcode_timeout_ms,
            ));
            registry.register_all(&config.video.extensions, video);
        }

        registry
    }

    /// Register `transform` for one extension, replacing any previous entry.
    pub fn register(&mut self, extension: &str, transform: Arc<dyn Transform>) {
        let key = extension.trim_start_matches('.').to_lowercase();
        if let Some(previous) = self.by_extension.insert(key.clone(), transform) {
            tracing::debug!(extension = %key, previous = previous.name(), "Replaced transform");
        }
    }

    pub fn register_all(&mut self, extensions: &[String], transform: Arc<dyn Transform>) {
        for ext in extensions {
            self.register(ext, transform.clone());
        }
    }

    /// Transform registered for an extension (case-insensitive).
    pub fn resolve(&self, extension: &str) -> Option<Arc<dyn Transform>> {
        self.by_extension
            .get(&extension.trim_start_matches('.').to_lowercase())
            .cloned()
    }

    /// Transform for a file name or path, classified by its extension.
    pub fn resolve_path(&self, path: &Path) -> PipelineResult<Arc<dyn Transform>> {
        let extension = extension_of(path).unwrap_or_default();
        self.resolve(&extension)
            .ok_or_else(|| PipelineError::UnsupportedType {
                path: path.to_path_buf(),
                extension: if extension.is_empty() {
                    "(none)".to_string()
                } else {
                    extension
                },
            })
    }

    pub fn is_supported(&self, path: &Path) -> bool {
        self.resolve_path(path).is_ok()
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

impl std::fmt::Debug for TransformRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformRegistry")
            .field("extensions", &self.extensions())
            .finish()
    }
}
