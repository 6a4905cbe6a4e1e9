use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, RgbImage};
use log::warn;

use crate::error::{CompressError, Result};
use crate::request::MediaKind;

/// Still-image codec driven by the image and PDF targeters.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage>;

    fn encode(&self, image: &RgbImage, quality: u8) -> Result<Vec<u8>>;

    fn resize(&self, image: &RgbImage, width: u32, height: u32) -> RgbImage;
}

/// Baseline JPEG through the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegCodec;

impl ImageCodec for JpegCodec {
    fn decode(&self, bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| CompressError::decode(MediaKind::Image, e))
    }

    fn encode(&self, image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        encoder.encode(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )?;
        Ok(buffer)
    }

    fn resize(&self, image: &RgbImage, width: u32, height: u32) -> RgbImage {
        image::imageops::resize(image, width.max(1), height.max(1), FilterType::Lanczos3)
    }
}

/// Flattens any decoded image to opaque RGB. Alpha is dropped, not composited.
pub fn normalize_rgb(image: DynamicImage) -> RgbImage {
    if image.color().has_alpha() {
        warn!(
            "Discarding alpha channel of {}x{} {:?} image",
            image.width(),
            image.height(),
            image.color()
        );
    }
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    #[test]
    fn higher_quality_is_larger() {
        let img = gradient(256, 256);
        let low = JpegCodec.encode(&img, 10).unwrap();
        let high = JpegCodec.encode(&img, 90).unwrap();
        assert!(high.len() > low.len());
        assert_eq!(&low[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn encoded_output_decodes() {
        let img = gradient(64, 32);
        let bytes = JpegCodec.encode(&img, 75).unwrap();
        let decoded = JpegCodec.decode(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[test]
    fn garbage_is_a_decode_failure() {
        let err = JpegCodec.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(
            err,
            CompressError::Decode {
                kind: MediaKind::Image,
                ..
            }
        ));
    }

    #[test]
    fn alpha_is_discarded() {
        let rgba = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 0]));
        let rgb = normalize_rgb(DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn resize_changes_dimensions() {
        let img = gradient(100, 50);
        let out = JpegCodec.resize(&img, 150, 75);
        assert_eq!(out.dimensions(), (150, 75));
    }
}
