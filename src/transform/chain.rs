//! The image transform seam and the fixed sprite filter chain.

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Rgb, RgbImage};

use crate::error::TransformError;
use crate::types::staging_path;

/// A whole-image transform applied by every pool worker.
///
/// Called from blocking worker threads, so implementations may be CPU heavy. Any
/// `Fn(DynamicImage) -> DynamicImage` closure is an `ImageTransform`.
pub trait ImageTransform: Send + Sync {
    /// Transform one decoded image
    fn apply(&self, image: DynamicImage) -> DynamicImage;
}

impl<F> ImageTransform for F
where
    F: Fn(DynamicImage) -> DynamicImage + Send + Sync,
{
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        self(image)
    }
}

/// 3x3 "edge enhance more" kernel (center 9, neighbours -1, sum 1)
pub const EDGE_ENHANCE_MORE: [f32; 9] = [-1.0, -1.0, -1.0, -1.0, 9.0, -1.0, -1.0, -1.0, -1.0];

/// The fixed filter chain applied to every sprite.
///
/// Steps, in order:
/// 1. convert to 8-bit RGB
/// 2. Gaussian blur, radius [`first_blur`](Self::first_blur)
/// 3. contrast enhancement by [`contrast`](Self::contrast)
/// 4. strong edge enhancement ([`EDGE_ENHANCE_MORE`])
/// 5. tonal inversion
/// 6. Gaussian blur, radius [`second_blur`](Self::second_blur)
/// 7. Lanczos upscale by [`upscale`](Self::upscale)
/// 8. Lanczos downscale back to the original dimensions
///
/// Changing the order or the defaults changes every output image.
#[derive(Clone, Debug, PartialEq)]
pub struct SpriteFilterChain {
    /// Radius (standard deviation) of the first blur
    pub first_blur: f32,
    /// Contrast factor; 1.0 leaves the image unchanged
    pub contrast: f32,
    /// Radius (standard deviation) of the second blur
    pub second_blur: f32,
    /// Integer upscale factor before resampling back down
    pub upscale: u32,
}

impl Default for SpriteFilterChain {
    fn default() -> Self {
        Self {
            first_blur: 10.0,
            contrast: 1.5,
            second_blur: 5.0,
            upscale: 2,
        }
    }
}

impl ImageTransform for SpriteFilterChain {
    fn apply(&self, image: DynamicImage) -> DynamicImage {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let (width, height) = (rgb.width(), rgb.height());
        if width == 0 || height == 0 {
            return rgb;
        }

        let blurred = rgb.blur(self.first_blur);
        let contrasted =
            DynamicImage::ImageRgb8(enhance_contrast(&blurred.to_rgb8(), self.contrast));
        let mut edged = contrasted.filter3x3(&EDGE_ENHANCE_MORE);
        edged.invert();
        let softened = edged.blur(self.second_blur);

        let factor = self.upscale.max(1);
        softened
            .resize_exact(width * factor, height * factor, FilterType::Lanczos3)
            .resize_exact(width, height, FilterType::Lanczos3)
    }
}

/// Scale every channel's distance from the image's mean luminance by `factor`.
///
/// The mean is taken over the ITU-R 601 luma of all pixels (16-bit fixed point,
/// rounded) and rounded to an integer. Blended values are clamped to `0..=255` and
/// truncated toward zero.
pub fn enhance_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return image.clone();
    }

    let luma_sum: u64 = image.pixels().map(|p| u64::from(luma(p))).sum();
    let mean = (luma_sum as f64 / pixel_count as f64 + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let value = mean + factor * (f32::from(*channel) - mean);
            *channel = value.clamp(0.0, 255.0) as u8;
        }
    }
    out
}

fn luma(pixel: &Rgb<u8>) -> u32 {
    let [r, g, b] = pixel.0;
    (u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16
}

/// Decode the image at `path`, guessing the format from its content.
pub fn load_image(path: &Path) -> Result<DynamicImage, TransformError> {
    let io_error = |source| TransformError::Io {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(io_error)?
        .with_guessed_format()
        .map_err(io_error)?
        .decode()
        .map_err(|source| TransformError::Decode {
            path: path.to_path_buf(),
            source,
        })
}

/// Encode `image` to `path` in the format implied by its extension.
///
/// `quality` applies to lossy formats (JPEG); lossless formats ignore it. The image is
/// encoded in memory and written to a hidden staging file next to `path`, which is then
/// renamed into place. A failed save never leaves a partial file at `path`.
pub fn save_image(image: &DynamicImage, path: &Path, quality: u8) -> Result<(), TransformError> {
    let encode_error = |source| TransformError::Encode {
        path: path.to_path_buf(),
        source,
    };
    let io_error = |source| TransformError::Io {
        path: path.to_path_buf(),
        source,
    };

    let format = ImageFormat::from_path(path).map_err(encode_error)?;
    let mut buffer = Cursor::new(Vec::new());
    let encoded = match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            image.write_with_encoder(encoder)
        }
        other => image.write_to(&mut buffer, other),
    };
    encoded.map_err(encode_error)?;

    let staging = staging_path(path);
    let persisted =
        std::fs::write(&staging, buffer.get_ref()).and_then(|()| std::fs::rename(&staging, path));
    if let Err(e) = persisted {
        if let Err(cleanup) = std::fs::remove_file(&staging) {
            tracing::trace!(
                path = %staging.display(),
                error = %cleanup,
                "No staging file to remove"
            );
        }
        return Err(io_error(e));
    }
    Ok(())
}
