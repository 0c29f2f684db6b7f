//! Image transform: decode, normalize orientation, re-encode as JPEG.
//!
//! Re-encoding from raw pixels is what strips metadata: the encoder is
//! never handed the source's EXIF, XMP or ICC blocks, so none survive.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ::image::codecs::jpeg::JpegEncoder;
use ::image::{DynamicImage, ImageFormat, ImageReader, ImageResult};
use async_trait::async_trait;
use exif::{In, Reader, Tag, Value};
use tokio::time::timeout;

use super::orientation::Orientation;
use super::{MediaKind, Transform};
use crate::error::{PipelineError, PipelineResult};
use crate::types::extension_of;

/// The capabilities the image transform needs from a codec backend.
///
/// Calls are synchronous and CPU-bound; the transform runs them on the
/// blocking pool.
pub trait ImageCodec: Send + Sync + 'static {
    /// Decode encoded bytes into pixels. `hint` is the source extension.
    fn decode(&self, bytes: &[u8], hint: Option<&str>) -> ImageResult<DynamicImage>;

    /// Raw EXIF orientation value, if the source carries one.
    fn read_orientation(&self, bytes: &[u8]) -> Option<u32>;

    /// Encode pixels. The result must not carry any metadata.
    fn encode(&self, image: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>>;
}

/// Codec backed by the `image` and `kamadak-exif` crates.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCodec;

impl ImageCodec for StandardCodec {
    fn decode(&self, bytes: &[u8], hint: Option<&str>) -> ImageResult<DynamicImage> {
        #[cfg(feature = "heic")]
        if super::heif::is_heif(bytes) {
            return super::heif::decode(bytes);
        }

        let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
        // Content sniffing wins; the extension is only a fallback
        if reader.format().is_none() {
            if let Some(format) = hint.and_then(ImageFormat::from_extension) {
                reader.set_format(format);
            }
        }
        reader.decode()
    }

    fn read_orientation(&self, bytes: &[u8]) -> Option<u32> {
        // libheif has already rotated the pixels
        #[cfg(feature = "heic")]
        if super::heif::is_heif(bytes) {
            return None;
        }

        let mut cursor = Cursor::new(bytes);
        let exif = Reader::new().read_from_container(&mut cursor).ok()?;
        exif.get_field(Tag::Orientation, In::PRIMARY)
            .and_then(|f| match &f.value {
                Value::Short(v) => v.first().map(|&x| x as u32),
                Value::Long(v) => v.first().copied(),
                _ => None,
            })
    }

    fn encode(&self, image: &DynamicImage, quality: u8) -> ImageResult<Vec<u8>> {
        let rgb = image.to_rgb8();
        let mut buffer = Vec::new();
        JpegEncoder::new_with_quality(&mut buffer, quality).encode_image(&rgb)?;
        Ok(buffer)
    }
}

/// Transform for still images. Output is always JPEG.
pub struct ImageTransform<C: ImageCodec = StandardCodec> {
    codec: Arc<C>,
    quality: u8,
    timeout_ms: u64,
}

impl<C: ImageCodec> ImageTransform<C> {
    /// `timeout_ms` bounds decode, remap and encode together.
    pub fn new(codec: C, quality: u8, timeout_ms: u64) -> Self {
        Self {
            codec: Arc::new(codec),
            quality: quality.clamp(1, 100),
            timeout_ms,
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Decode, orient and re-encode one image (runs in `spawn_blocking`).
    fn normalize(
        codec: &C,
        bytes: &[u8],
        hint: Option<&str>,
        quality: u8,
        path: &Path,
    ) -> PipelineResult<Vec<u8>> {
        let orientation = Orientation::from_exif_or_default(codec.read_orientation(bytes));
        let image = codec.decode(bytes, hint).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        tracing::trace!(
            orientation = orientation.code(),
            width = image.width(),
            height = image.height(),
            "Decoded image"
        );

        let upright = orientation.apply(image);
        codec
            .encode(&upright, quality)
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Re-encode failed: {e}"),
            })
    }
}

#[async_trait]
impl<C: ImageCodec> Transform for ImageTransform<C> {
    fn name(&self) -> &str {
        "image"
    }

    fn kind(&self) -> MediaKind {
        MediaKind::Image
    }

    fn output_extension(&self) -> &str {
        "jpg"
    }

    async fn apply(&self, input: &Path, output: &Path) -> PipelineResult<()> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| PipelineError::io(input, e))?;

        let codec = self.codec.clone();
        let quality = self.quality;
        let hint = extension_of(input);
        let path = input.to_path_buf();
        let timeout_duration = Duration::from_millis(self.timeout_ms);

        let result = timeout(timeout_duration, async {
            tokio::task::spawn_blocking(move || {
                Self::normalize(&codec, &bytes, hint.as_deref(), quality, &path)
            })
            .await
        })
        .await;

        let encoded = match result {
            Ok(Ok(Ok(encoded))) => encoded,
            Ok(Ok(Err(e))) => return Err(e),
            Ok(Err(e)) => {
                return Err(PipelineError::Decode {
                    path: input.to_path_buf(),
                    message: format!("Task join error: {e}"),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path: input.to_path_buf(),
                    stage: "decode".to_string(),
                    timeout_ms: self.timeout_ms,
                })
            }
        };

        tokio::fs::write(output, &encoded)
            .await
            .map_err(|e| PipelineError::io(output, e))
    }
}
