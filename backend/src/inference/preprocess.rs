use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use ndarray::Array4;
use std::io::Cursor;

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("empty image payload")]
    EmptyInput,
    #[error("failed to decode image: {0}")]
    Decode(String),
}

impl From<image::ImageError> for PreprocessError {
    fn from(err: image::ImageError) -> Self {
        PreprocessError::Decode(err.to_string())
    }
}

/// Decodes `bytes` into a `(1, size, size, 3)` RGB tensor scaled to `[0, 1]`.
///
/// The image is center-cropped to a square before resizing so the aspect
/// ratio of the visible region is preserved.
pub fn preprocess(bytes: &[u8], size: u32) -> Result<Array4<f32>, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::EmptyInput);
    }

    let image = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PreprocessError::Decode(e.to_string()))?
        .decode()?;

    let rgb = DynamicImage::ImageRgb8(image.to_rgb8())
        .resize_to_fill(size, size, FilterType::Lanczos3)
        .to_rgb8();

    let side = size as usize;
    Ok(Array4::from_shape_fn((1, side, side, 3), |(_, y, x, c)| {
        rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
    }))
}
