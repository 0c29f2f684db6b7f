//! HEIC/HEIF decoding through libheif (`heic` feature).
//!
//! libheif applies the container's rotation and mirror properties while
//! decoding, so the pixels it returns are already upright. The EXIF
//! orientation inside a HEIF file describes the same transform and must
//! not be applied a second time.

use ::image::error::{DecodingError, ImageFormatHint};
use ::image::{DynamicImage, ImageError, ImageResult, RgbImage};
use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

/// Extensions served by this decoder.
pub const HEIF_EXTENSIONS: [&str; 2] = ["heic", "heif"];

/// Major brands of still-image HEIF files.
const BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"heim", b"heis", b"mif1", b"msf1"];

/// Whether `bytes` start with an ISO-BMFF `ftyp` box of a HEIF brand.
pub fn is_heif(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && BRANDS.iter().any(|b| &bytes[8..12] == *b)
}

fn heif_error(err: libheif_rs::HeifError) -> ImageError {
    ImageError::Decoding(DecodingError::new(
        ImageFormatHint::Name("HEIF".to_string()),
        err,
    ))
}

/// Decode the primary image to 8-bit RGB.
pub fn decode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(bytes).map_err(heif_error)?;
    let handle = ctx.primary_image_handle().map_err(heif_error)?;
    let image = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(heif_error)?;

    let planes = image.planes();
    let plane = planes.interleaved.ok_or_else(|| {
        ImageError::Decoding(DecodingError::new(
            ImageFormatHint::Name("HEIF".to_string()),
            "decoded image has no interleaved RGB plane",
        ))
    })?;

    // Rows may be padded beyond width * 3
    let row_len = plane.width as usize * 3;
    let mut pixels = Vec::with_capacity(row_len * plane.height as usize);
    for row in plane.data.chunks(plane.stride.max(1)).take(plane.height as usize) {
        pixels.extend_from_slice(&row[..row_len.min(row.len())]);
    }

    RgbImage::from_raw(plane.width, plane.height, pixels)
        .map(DynamicImage::ImageRgb8)
        .ok_or_else(|| {
            ImageError::Decoding(DecodingError::new(
                ImageFormatHint::Name("HEIF".to_string()),
                "pixel buffer shorter than image dimensions",
            ))
        })
}
