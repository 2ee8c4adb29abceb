//! Image compression
//!
//! Large photos from phones are downscaled and re-encoded before they are
//! stored. Formats that would lose animation or vector data pass through.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::{debug, warn};

use crate::validation::extension;

pub const MAX_DIMENSION: u32 = 2048;
pub const JPEG_QUALITY: u8 = 85;

/// Result of [`compress_image`]
#[derive(Debug, Clone)]
pub struct Compressed {
    pub bytes: Bytes,
    pub content_type: String,
    pub bytes_saved: u64,
}

impl Compressed {
    fn unchanged(bytes: Bytes, content_type: &str) -> Self {
        Self {
            bytes,
            content_type: content_type.to_string(),
            bytes_saved: 0,
        }
    }
}

enum Target {
    Jpeg,
    Png,
}

fn target_for(file_name: &str) -> Option<Target> {
    match extension(file_name)?.as_str() {
        ".jpg" | ".jpeg" | ".bmp" | ".webp" => Some(Target::Jpeg),
        ".png" => Some(Target::Png),
        _ => None,
    }
}

fn encode(image: &DynamicImage, target: &Target) -> image::ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    match target {
        Target::Jpeg => {
            let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY))?;
        }
        Target::Png => {
            image.write_with_encoder(PngEncoder::new_with_quality(
                &mut out,
                CompressionType::Best,
                PngFilter::Adaptive,
            ))?;
        }
    }
    Ok(out)
}

/// Downscale to fit [`MAX_DIMENSION`] and re-encode. CPU bound; run it on
/// a blocking thread.
///
/// Never fails: undecodable input, unsupported formats and re-encodes that
/// come out larger all return the original bytes.
pub fn compress_image(bytes: Bytes, file_name: &str, content_type: &str) -> Compressed {
    let Some(target) = target_for(file_name) else {
        return Compressed::unchanged(bytes, content_type);
    };

    let decoded = match image::load_from_memory(&bytes) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Could not decode {} for compression: {}", file_name, e);
            return Compressed::unchanged(bytes, content_type);
        }
    };

    let (width, height) = decoded.dimensions();
    let resized = if width > MAX_DIMENSION || height > MAX_DIMENSION {
        debug!(
            "Downscaling {} from {}x{} to fit {}px",
            file_name, width, height, MAX_DIMENSION
        );
        decoded.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
    } else {
        decoded
    };

    let encoded = match encode(&resized, &target) {
        Ok(encoded) => encoded,
        Err(e) => {
            warn!("Could not re-encode {}: {}", file_name, e);
            return Compressed::unchanged(bytes, content_type);
        }
    };

    if encoded.len() >= bytes.len() {
        return Compressed::unchanged(bytes, content_type);
    }

    let new_type = match target {
        Target::Jpeg => "image/jpeg",
        Target::Png => "image/png",
    };
    Compressed {
        bytes_saved: (bytes.len() - encoded.len()) as u64,
        bytes: Bytes::from(encoded),
        content_type: new_type.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn gradient(width: u32, height: u32, format: ImageFormat) -> Bytes {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, format).unwrap();
        Bytes::from(buf.into_inner())
    }

    #[test]
    fn test_large_image_is_downscaled_preserving_aspect() {
        let original = gradient(3000, 1500, ImageFormat::Png);
        let result = compress_image(original.clone(), "car.png", "image/png");
        assert!(result.bytes.len() < original.len());
        assert_eq!(result.bytes_saved as usize, original.len() - result.bytes.len());

        let decoded = image::load_from_memory(&result.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (2048, 1024));
    }

    #[test]
    fn test_bmp_becomes_jpeg() {
        let original = gradient(400, 300, ImageFormat::Bmp);
        let result = compress_image(original, "scan.bmp", "image/bmp");
        assert_eq!(result.content_type, "image/jpeg");
        assert_eq!(
            image::guess_format(&result.bytes).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_passthrough_cases() {
        let gif = Bytes::from_static(b"GIF89a-not-really");
        let result = compress_image(gif.clone(), "anim.gif", "image/gif");
        assert_eq!(result.bytes, gif);
        assert_eq!(result.bytes_saved, 0);

        let video = Bytes::from_static(b"\x00\x00\x00\x18ftypmp42");
        let result = compress_image(video.clone(), "clip.mp4", "video/mp4");
        assert_eq!(result.bytes, video);

        let garbage = Bytes::from_static(b"definitely not a jpeg");
        let result = compress_image(garbage.clone(), "broken.jpg", "image/jpeg");
        assert_eq!(result.bytes, garbage);
        assert_eq!(result.content_type, "image/jpeg");
    }

    #[test]
    fn test_never_grows() {
        let original = gradient(2, 2, ImageFormat::Png);
        let result = compress_image(original.clone(), "tiny.png", "image/png");
        assert!(result.bytes.len() <= original.len());
    }
}
