use crate::geometry::Homography;
use crate::Result;
use image::GrayImage;
use rayon::prelude::*;

/// Resample `image` under a perspective transform into an image of `size`.
///
/// With `inverse_map` set, `homography` is taken to map destination pixels
/// onto source pixels (`dst(x, y) = src(H * (x, y))`); otherwise it maps
/// source onto destination and is inverted first. Sampling is bicubic and
/// pixels falling outside the source are black.
pub fn warp_perspective(
    image: &GrayImage,
    homography: &Homography,
    size: (u32, u32),
    inverse_map: bool,
) -> Result<GrayImage> {
    let map = if inverse_map {
        *homography
    } else {
        homography
            .inverse()
            .ok_or_else(|| anyhow::anyhow!("Homography is not invertible"))?
    };

    let (width, height) = size;
    if width == 0 || height == 0 {
        return Err(anyhow::anyhow!("Invalid warp output size: {}x{}", width, height));
    }

    let mut data = vec![0u8; width as usize * height as usize];
    data.par_chunks_mut(width as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                if let Some((sx, sy)) = map.project(x as f64, y as f64) {
                    *out = sample_bicubic(image, sx, sy);
                }
            }
        });

    GrayImage::from_raw(width, height, data)
        .ok_or_else(|| anyhow::anyhow!("Failed to create warped image"))
}

/// Cubic convolution kernel with `a = -0.75`.
fn cubic_weight(t: f64) -> f64 {
    const A: f64 = -0.75;
    let t = t.abs();
    if t <= 1.0 {
        ((A + 2.0) * t - (A + 3.0)) * t * t + 1.0
    } else if t < 2.0 {
        ((A * t - 5.0 * A) * t + 8.0 * A) * t - 4.0 * A
    } else {
        0.0
    }
}

fn pixel_or_black(image: &GrayImage, x: i64, y: i64) -> f64 {
    if x < 0 || y < 0 || x >= image.width() as i64 || y >= image.height() as i64 {
        0.0
    } else {
        image.get_pixel(x as u32, y as u32)[0] as f64
    }
}

fn sample_bicubic(image: &GrayImage, x: f64, y: f64) -> u8 {
    if !x.is_finite() || !y.is_finite() {
        return 0;
    }
    let (w, h) = (image.width() as f64, image.height() as f64);
    if x < -1.0 || y < -1.0 || x > w || y > h {
        return 0;
    }

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (ix, iy) = (x0 as i64, y0 as i64);

    let mut value = 0.0;
    for j in -1..=2i64 {
        let wy = cubic_weight(fy - j as f64);
        if wy == 0.0 {
            continue;
        }
        let mut row = 0.0;
        for i in -1..=2i64 {
            let wx = cubic_weight(fx - i as f64);
            if wx != 0.0 {
                row += wx * pixel_or_black(image, ix + i, iy + j);
            }
        }
        value += wy * row;
    }

    value.round().clamp(0.0, 255.0) as u8
}
