//! EXIF orientation codes and the pixel remaps that undo them.

use ::image::DynamicImage;

/// The eight EXIF orientation values.
///
/// Each variant names the remap that brings the stored pixels upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// 1: already upright
    #[default]
    Normal,
    /// 2: mirrored left-right
    FlipHorizontal,
    /// 3: upside down
    Rotate180,
    /// 4: mirrored top-bottom
    FlipVertical,
    /// 5: mirrored along the main diagonal
    Transpose,
    /// 6: needs a 90° clockwise turn
    Rotate90,
    /// 7: mirrored along the anti-diagonal
    Transverse,
    /// 8: needs a 270° clockwise turn
    Rotate270,
}

impl Orientation {
    /// Parse an EXIF orientation value. Anything outside 1..=8 is `None`.
    pub fn from_exif(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Normal,
            2 => Self::FlipHorizontal,
            3 => Self::Rotate180,
            4 => Self::FlipVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90,
            7 => Self::Transverse,
            8 => Self::Rotate270,
            _ => return None,
        })
    }

    /// Like [`from_exif`](Self::from_exif), but absent or invalid codes are
    /// treated as upright.
    pub fn from_exif_or_default(code: Option<u32>) -> Self {
        code.and_then(Self::from_exif).unwrap_or_default()
    }

    pub fn code(self) -> u32 {
        match self {
            Self::Normal => 1,
            Self::FlipHorizontal => 2,
            Self::Rotate180 => 3,
            Self::FlipVertical => 4,
            Self::Transpose => 5,
            Self::Rotate90 => 6,
            Self::Transverse => 7,
            Self::Rotate270 => 8,
        }
    }

    /// Whether applying this remap exchanges width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }

    /// Remap pixels so the image displays upright without the tag.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Self::Normal => image,
            Self::FlipHorizontal => image.fliph(),
            Self::Rotate180 => image.rotate180(),
            Self::FlipVertical => image.flipv(),
            Self::Transpose => image.rotate90().fliph(),
            Self::Rotate90 => image.rotate90(),
            Self::Transverse => image.rotate270().fliph(),
            Self::Rotate270 => image.rotate270(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::image::{GenericImageView, Rgb, RgbImage};

    // 3x2 image with a distinct color per pixel
    fn sample() -> DynamicImage {
        let mut img = RgbImage::new(3, 2);
        for (x, y, px) in img.enumerate_pixels_mut() {
            *px = Rgb([(x * 80) as u8, (y * 120) as u8, 7]);
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_code_round_trip_and_range() {
        for code in 1..=8 {
            assert_eq!(Orientation::from_exif(code).unwrap().code(), code);
        }
        assert_eq!(Orientation::from_exif(0), None);
        assert_eq!(Orientation::from_exif(9), None);
        assert_eq!(Orientation::from_exif_or_default(Some(42)), Orientation::Normal);
        assert_eq!(Orientation::from_exif_or_default(None), Orientation::Normal);
    }

    #[test]
    fn test_normal_is_noop() {
        let img = sample();
        let out = Orientation::Normal.apply(img.clone());
        assert_eq!(out.to_rgb8().into_raw(), img.to_rgb8().into_raw());
    }

    #[test]
    fn test_rotate180_twice_is_identity() {
        let img = sample();
        let out = Orientation::Rotate180.apply(Orientation::Rotate180.apply(img.clone()));
        assert_eq!(out.to_rgb8().into_raw(), img.to_rgb8().into_raw());
        assert_ne!(
            Orientation::Rotate180.apply(img.clone()).to_rgb8().into_raw(),
            img.to_rgb8().into_raw()
        );
    }

    #[test]
    fn test_rotate90_then_rotate270_is_identity() {
        let img = sample();
        let out = Orientation::Rotate270.apply(Orientation::Rotate90.apply(img.clone()));
        assert_eq!(out.to_rgb8().into_raw(), img.to_rgb8().into_raw());
    }

    #[test]
    fn test_mirrors_are_involutions() {
        let img = sample();
        for o in [
            Orientation::FlipHorizontal,
            Orientation::FlipVertical,
            Orientation::Transpose,
            Orientation::Transverse,
        ] {
            let out = o.apply(o.apply(img.clone()));
            assert_eq!(out.to_rgb8().into_raw(), img.to_rgb8().into_raw(), "{o:?}");
        }
    }

    #[test]
    fn test_dimension_swaps() {
        for code in 1..=8 {
            let o = Orientation::from_exif(code).unwrap();
            let (w, h) = o.apply(sample()).dimensions();
            if o.swaps_dimensions() {
                assert_eq!((w, h), (2, 3), "{o:?}");
            } else {
                assert_eq!((w, h), (3, 2), "{o:?}");
            }
        }
    }

    #[test]
    fn test_rotate90_moves_bottom_left_to_top_left() {
        let img = sample();
        let bottom_left = img.get_pixel(0, 1);
        let out = Orientation::Rotate90.apply(img);
        assert_eq!(out.get_pixel(0, 0), bottom_left);
    }

    #[test]
    fn test_transpose_maps_xy_to_yx() {
        let img = sample();
        let out = Orientation::Transpose.apply(img.clone());
        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(out.get_pixel(y, x), img.get_pixel(x, y));
            }
        }
    }
}
