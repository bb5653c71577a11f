use crate::Result;
use image::{DynamicImage, GrayImage};
use std::path::Path;

/// Collapse a decoded image to a single 8-bit channel.
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    match image {
        DynamicImage::ImageLuma8(gray) => gray.clone(),
        other => other.to_luma8(),
    }
}

/// Load and validate image from path
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.exists() {
        return Err(anyhow::anyhow!(
            "Image file does not exist: {}",
            path.display()
        ));
    }

    let img = image::open(path)
        .map_err(|e| anyhow::anyhow!("Failed to decode {}: {}", path.display(), e))?;
    validate_image_size(&img)?;
    Ok(img)
}

/// Validate that image has reasonable dimensions
pub fn validate_image_size(image: &DynamicImage) -> Result<()> {
    validate_image_size_with_limits(image.width(), image.height(), 1, 16384)
}

/// Validate image size with custom limits
pub fn validate_image_size_with_limits(width: u32, height: u32, min_size: u32, max_size: u32) -> Result<()> {
    if width < min_size || height < min_size {
        return Err(anyhow::anyhow!(
            "Image too small: {}x{}, minimum: {}x{}",
            width,
            height,
            min_size,
            min_size
        ));
    }

    if width > max_size || height > max_size {
        return Err(anyhow::anyhow!(
            "Image too large: {}x{}, maximum: {}x{}",
            width,
            height,
            max_size,
            max_size
        ));
    }

    Ok(())
}

/// Convert a GrayImage to a single-channel OpenCV Mat
#[cfg(feature = "opencv")]
pub fn grayimage_to_mat(image: &GrayImage) -> Result<opencv::core::Mat> {
    use opencv::prelude::*;

    let (width, height) = image.dimensions();
    let mut mat = opencv::core::Mat::zeros(height as i32, width as i32, opencv::core::CV_8UC1)?.to_mat()?;
    for (x, y, pixel) in image.enumerate_pixels() {
        *mat.at_2d_mut::<u8>(y as i32, x as i32)? = pixel[0];
    }
    Ok(mat)
}
