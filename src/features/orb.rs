use crate::config::OrbConfig;
use crate::features::{FeatureExtractor, Features, Keypoint};
use crate::matching::{DescriptorKind, Descriptors};
use image::{imageops, GrayImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;

const DESCRIPTOR_BYTES: usize = 32;

/// Bresenham circle of radius 3 used by the FAST segment test.
const FAST_CIRCLE: [(i32, i32); 16] = [
    (0, -3), (1, -3), (2, -2), (3, -1), (3, 0), (3, 1), (2, 2), (1, 3),
    (0, 3), (-1, 3), (-2, 2), (-3, 1), (-3, 0), (-3, -1), (-2, -2), (-1, -3),
];

/// Oriented FAST keypoints with rotated BRIEF descriptors over an image
/// pyramid.
pub struct OrbExtractor {
    config: OrbConfig,
    pattern: Vec<(i8, i8, i8, i8)>,
}

impl Default for OrbExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl OrbExtractor {
    pub fn new() -> Self {
        Self::with_config(OrbConfig::default())
    }

    pub fn with_config(config: OrbConfig) -> Self {
        let pattern = sampling_pattern(config.brief_seed, config.patch_size);
        Self { config, pattern }
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    /// Pyramid levels with their scale relative to the input image.
    fn build_pyramid(&self, image: &GrayImage) -> Vec<(GrayImage, f32)> {
        let min_side = 2 * self.config.edge_threshold + 8;
        let mut pyramid = Vec::with_capacity(self.config.n_levels);
        pyramid.push((image.clone(), 1.0));

        let mut scale = 1.0f32;
        for _ in 1..self.config.n_levels {
            scale *= self.config.scale_factor;
            let width = (image.width() as f32 / scale).round() as u32;
            let height = (image.height() as f32 / scale).round() as u32;
            if width < min_side || height < min_side {
                break;
            }
            let level = imageops::resize(image, width, height, imageops::FilterType::Triangle);
            pyramid.push((level, scale));
        }

        pyramid
    }

    fn extract_level(&self, image: &GrayImage, octave: u8, scale: f32) -> Vec<(Keypoint, [u8; DESCRIPTOR_BYTES])> {
        let corners = self.detect_fast_corners(image);
        corners
            .into_iter()
            .map(|(x, y, response)| {
                let angle = self.compute_orientation(image, x, y);
                let descriptor = self.compute_descriptor(image, x, y, angle);
                let keypoint = Keypoint {
                    x: x as f32 * scale,
                    y: y as f32 * scale,
                    size: self.config.patch_size as f32 * scale,
                    angle,
                    response,
                    octave,
                };
                (keypoint, descriptor)
            })
            .collect()
    }

    /// FAST-9 corners outside the edge border, after grid suppression.
    fn detect_fast_corners(&self, image: &GrayImage) -> Vec<(u32, u32, f32)> {
        let (width, height) = image.dimensions();
        let border = self.config.edge_threshold.max(3);
        if width <= 2 * border || height <= 2 * border {
            return Vec::new();
        }

        let corners: Vec<(u32, u32, f32)> = (border..(height - border))
            .into_par_iter()
            .flat_map_iter(|y| {
                (border..(width - border)).filter_map(move |x| {
                    let center = image.get_pixel(x, y)[0];
                    if !self.fast_pre_check(image, x, y, center) || !self.is_fast_corner(image, x, y, center) {
                        return None;
                    }
                    Some((x, y, self.compute_corner_response(image, x, y)))
                })
            })
            .collect();

        self.non_maximum_suppression(corners)
    }

    /// Any arc of nine pixels covers at least two of the four compass points.
    fn fast_pre_check(&self, image: &GrayImage, x: u32, y: u32, center: u8) -> bool {
        let bright = center.saturating_add(self.config.fast_threshold);
        let dark = center.saturating_sub(self.config.fast_threshold);
        let pixels = [
            image.get_pixel(x, y - 3)[0],
            image.get_pixel(x + 3, y)[0],
            image.get_pixel(x, y + 3)[0],
            image.get_pixel(x - 3, y)[0],
        ];
        let bright_count = pixels.iter().filter(|&&p| p > bright).count();
        let dark_count = pixels.iter().filter(|&&p| p < dark).count();
        bright_count >= 2 || dark_count >= 2
    }

    fn is_fast_corner(&self, image: &GrayImage, x: u32, y: u32, center: u8) -> bool {
        let bright = center.saturating_add(self.config.fast_threshold);
        let dark = center.saturating_sub(self.config.fast_threshold);

        let mut max_bright_run = 0;
        let mut max_dark_run = 0;
        let mut bright_run = 0;
        let mut dark_run = 0;

        // Walk the circle twice to catch runs that wrap around
        for i in 0..(FAST_CIRCLE.len() * 2) {
            let (dx, dy) = FAST_CIRCLE[i % FAST_CIRCLE.len()];
            let pixel = image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0];

            if pixel > bright {
                bright_run += 1;
                dark_run = 0;
                max_bright_run = max_bright_run.max(bright_run);
            } else if pixel < dark {
                dark_run += 1;
                bright_run = 0;
                max_dark_run = max_dark_run.max(dark_run);
            } else {
                bright_run = 0;
                dark_run = 0;
            }
        }

        max_bright_run >= 9 || max_dark_run >= 9
    }

    /// Local intensity standard deviation over a 5x5 window.
    fn compute_corner_response(&self, image: &GrayImage, x: u32, y: u32) -> f32 {
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for dy in -2..=2i32 {
            for dx in -2..=2i32 {
                let v = image.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f32;
                sum += v;
                sum_sq += v * v;
            }
        }
        let mean = sum / 25.0;
        (sum_sq / 25.0 - mean * mean).max(0.0).sqrt()
    }

    /// Strongest-first suppression on a coarse grid.
    fn non_maximum_suppression(&self, mut corners: Vec<(u32, u32, f32)>) -> Vec<(u32, u32, f32)> {
        corners.par_sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(Ordering::Equal));

        const CELL: u32 = 4;
        let mut occupied = HashSet::new();
        let mut selected = Vec::new();

        for corner in corners {
            let gx = (corner.0 / CELL) as i64;
            let gy = (corner.1 / CELL) as i64;
            let blocked = (-1..=1).any(|dy| (-1..=1).any(|dx| occupied.contains(&(gx + dx, gy + dy))));
            if blocked {
                continue;
            }
            occupied.insert((gx, gy));
            selected.push(corner);
        }

        selected
    }

    /// Intensity-centroid orientation over a disc of half the patch size.
    fn compute_orientation(&self, image: &GrayImage, x: u32, y: u32) -> f32 {
        let radius = (self.config.patch_size / 2) as i32;
        let (width, height) = (image.width() as i32, image.height() as i32);
        let mut m01 = 0.0f32;
        let mut m10 = 0.0f32;

        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx * dx + dy * dy > radius * radius {
                    continue;
                }
                let px = x as i32 + dx;
                let py = y as i32 + dy;
                if px < 0 || py < 0 || px >= width || py >= height {
                    continue;
                }
                let intensity = image.get_pixel(px as u32, py as u32)[0] as f32;
                m01 += intensity * dy as f32;
                m10 += intensity * dx as f32;
            }
        }

        m01.atan2(m10)
    }

    fn compute_descriptor(&self, image: &GrayImage, x: u32, y: u32, angle: f32) -> [u8; DESCRIPTOR_BYTES] {
        let mut descriptor = [0u8; DESCRIPTOR_BYTES];
        let (cos_a, sin_a) = (angle.cos(), angle.sin());
        let max_x = image.width() as i32 - 1;
        let max_y = image.height() as i32 - 1;

        let sample = |dx: i8, dy: i8| -> u8 {
            let rx = (dx as f32 * cos_a - dy as f32 * sin_a).round() as i32;
            let ry = (dx as f32 * sin_a + dy as f32 * cos_a).round() as i32;
            let px = (x as i32 + rx).clamp(0, max_x) as u32;
            let py = (y as i32 + ry).clamp(0, max_y) as u32;
            image.get_pixel(px, py)[0]
        };

        for (byte_idx, tests) in self.pattern.chunks(8).enumerate() {
            let mut byte = 0u8;
            for (bit, &(x1, y1, x2, y2)) in tests.iter().enumerate() {
                if sample(x1, y1) < sample(x2, y2) {
                    byte |= 1 << bit;
                }
            }
            descriptor[byte_idx] = byte;
        }

        descriptor
    }
}

impl FeatureExtractor for OrbExtractor {
    fn name(&self) -> &str {
        "ORB"
    }

    fn extract(&self, image: &GrayImage) -> Option<Features> {
        let pyramid = self.build_pyramid(image);

        let mut features: Vec<(Keypoint, [u8; DESCRIPTOR_BYTES])> = pyramid
            .par_iter()
            .enumerate()
            .flat_map_iter(|(octave, (level, scale))| self.extract_level(level, octave as u8, *scale))
            .collect();

        // Stable sort keeps the per-level scan order among equal responses
        features.par_sort_by(|a, b| b.0.response.partial_cmp(&a.0.response).unwrap_or(Ordering::Equal));
        features.truncate(self.config.max_features);

        log::debug!(
            "ORB extracted {} keypoints over {} pyramid levels from {}x{} image",
            features.len(),
            pyramid.len(),
            image.width(),
            image.height()
        );

        if features.is_empty() {
            return None;
        }

        let (keypoints, rows): (Vec<Keypoint>, Vec<[u8; DESCRIPTOR_BYTES]>) = features.into_iter().unzip();
        Some(Features {
            keypoints,
            descriptors: Descriptors::from_binary_rows(&rows),
        })
    }

    fn empty_descriptors(&self) -> Descriptors {
        Descriptors::empty(DescriptorKind::Binary, DESCRIPTOR_BYTES)
    }
}

/// 256 point-pair tests drawn from an isotropic Gaussian (sigma = patch / 5),
/// clipped to the patch.
fn sampling_pattern(seed: u64, patch_size: u32) -> Vec<(i8, i8, i8, i8)> {
    let half = (patch_size / 2).clamp(1, 127) as f32;
    let sigma = patch_size as f32 / 5.0;
    let mut rng = StdRng::seed_from_u64(seed);
    let mut coord = || -> i8 {
        let v: f32 = rng.sample(StandardNormal);
        (v * sigma).round().clamp(-half, half) as i8
    };

    (0..DESCRIPTOR_BYTES * 8)
        .map(|_| (coord(), coord(), coord(), coord()))
        .collect()
}
