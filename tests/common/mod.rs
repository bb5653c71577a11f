#![allow(dead_code)]

use image::{GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use pattern_detector::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Non-repetitive texture of random overlapping rectangles.
pub fn textured(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = GrayImage::from_pixel(width, height, Luma([128]));
    let count = (width * height / 200).max(20);

    for _ in 0..count {
        let w = rng.gen_range(6..28);
        let h = rng.gen_range(6..28);
        let x = rng.gen_range(-8..width as i32);
        let y = rng.gen_range(-8..height as i32);
        let value = rng.gen_range(0..=255u8);
        draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), Luma([value]));
    }

    image
}

/// `pattern` pasted at `offset` onto a flat frame.
pub fn paste(frame_size: (u32, u32), pattern: &GrayImage, offset: (u32, u32)) -> GrayImage {
    let mut frame = GrayImage::from_pixel(frame_size.0, frame_size.1, Luma([128]));
    image::imageops::replace(&mut frame, pattern, offset.0 as i64, offset.1 as i64);
    frame
}

pub fn trained_detector(config: DetectorConfig, patterns: &[GrayImage]) -> PatternDetector {
    let mut detector = PatternDetector::with_components(
        config,
        Box::new(OrbExtractor::new()),
        Box::new(RansacHomographyEstimator::new()),
    );
    let images: Vec<image::DynamicImage> = patterns
        .iter()
        .map(|p| image::DynamicImage::ImageLuma8(p.clone()))
        .collect();
    let built = detector.build_patterns_from_images(&images);
    detector.train(built);
    detector
}

pub fn assert_corners_near(actual: &[Point2f; 4], expected: [(f32, f32); 4], tolerance: f32) {
    for (a, (ex, ey)) in actual.iter().zip(expected) {
        assert!(
            (a.x - ex).abs() <= tolerance && (a.y - ey).abs() <= tolerance,
            "corner ({}, {}) not within {} of ({}, {})",
            a.x,
            a.y,
            tolerance,
            ex,
            ey
        );
    }
}
