//! Frame normalization — decode and bound incoming camera frames.
//!
//! Clients submit whatever their camera produced (JPEG, PNG, ...). The
//! normalizer decodes to a canonical RGB8 buffer and caps the working
//! width so encoder inference cost stays bounded.

use image::imageops::FilterType;
use thiserror::Error;

/// Default maximum working width in pixels.
pub const DEFAULT_MAX_WIDTH: u32 = 640;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("frame bytes could not be decoded as an image: {0}")]
    Decode(#[from] image::ImageError),
}

/// A decoded frame in canonical form: RGB8, row-major, width <= max.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl NormalizedImage {
    /// View the pixel buffer as an `image::RgbImage` for cropping.
    pub fn to_rgb_image(&self) -> image::RgbImage {
        // Buffer length is width * height * 3 by construction.
        image::RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| image::RgbImage::new(self.width, self.height))
    }
}

/// Decode raw frame bytes and downscale to at most `max_width` pixels wide,
/// preserving aspect ratio. A no-op when the decoded width already fits.
///
/// Deterministic: the same input bytes always produce identical output
/// dimensions and pixels (fixed triangle filter).
pub fn normalize(bytes: &[u8], max_width: u32) -> Result<NormalizedImage, NormalizeError> {
    let decoded = image::load_from_memory(bytes)?.to_rgb8();
    let (width, height) = decoded.dimensions();

    let rgb = if width > max_width {
        let scale = max_width as f32 / width as f32;
        let new_height = ((height as f32 * scale).round() as u32).max(1);
        tracing::debug!(width, height, new_width = max_width, new_height, "downscaling frame");
        image::imageops::resize(&decoded, max_width, new_height, FilterType::Triangle)
    } else {
        decoded
    };

    let (width, height) = rgb.dimensions();
    Ok(NormalizedImage {
        pixels: rgb.into_raw(),
        width,
        height,
    })
}
