//! Reference-image resizing.

use bytes::Bytes;
use image::imageops::FilterType;
use image::ImageOutputFormat;
use std::io::Cursor;
use vchain_models::VideoSize;

use crate::error::MediaResult;

/// Resize an encoded image to exactly `size`, re-encoding as PNG.
///
/// Returns the input untouched when it already has the target dimensions.
pub fn resize_to(image: &[u8], size: VideoSize) -> MediaResult<Bytes> {
    let decoded = image::load_from_memory(image)?;
    if decoded.width() == size.width && decoded.height() == size.height {
        return Ok(Bytes::copy_from_slice(image));
    }

    let resized = decoded.resize_exact(size.width, size.height, FilterType::Lanczos3);
    let mut out = Cursor::new(Vec::new());
    resized.write_to(&mut out, ImageOutputFormat::Png)?;
    Ok(Bytes::from(out.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageOutputFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_resize_changes_dimensions() {
        let resized = resize_to(&png(64, 48), VideoSize::new(32, 18)).unwrap();
        let decoded = image::load_from_memory(&resized).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 18));
    }

    #[test]
    fn test_matching_size_passes_through() {
        let original = png(16, 9);
        let out = resize_to(&original, VideoSize::new(16, 9)).unwrap();
        assert_eq!(&out[..], &original[..]);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(resize_to(b"not an image", VideoSize::new(16, 9)).is_err());
    }
}
