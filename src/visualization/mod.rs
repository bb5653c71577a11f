//! Debug overlays for detection results.

use crate::features::Keypoint;
use crate::geometry::Point2f;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_circle_mut, draw_line_segment_mut};

pub const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const KEYPOINT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// RGB copy of a grayscale frame to draw on.
pub fn to_canvas(frame: &GrayImage) -> RgbImage {
    RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
        let v = frame.get_pixel(x, y)[0];
        Rgb([v, v, v])
    })
}

/// Draw the closed quadrilateral through `corners`.
pub fn draw_contour(canvas: &mut RgbImage, corners: &[Point2f; 4], color: Rgb<u8>) {
    for i in 0..corners.len() {
        let a = corners[i];
        let b = corners[(i + 1) % corners.len()];
        draw_line_segment_mut(canvas, (a.x, a.y), (b.x, b.y), color);
    }
}

/// Circle each keypoint, with a tick along its orientation.
pub fn draw_keypoints(canvas: &mut RgbImage, keypoints: &[Keypoint], color: Rgb<u8>) {
    for kp in keypoints {
        let radius = (kp.size / 6.0).max(2.0);
        draw_hollow_circle_mut(canvas, (kp.x.round() as i32, kp.y.round() as i32), radius as i32, color);
        let tip = (kp.x + radius * kp.angle.cos(), kp.y + radius * kp.angle.sin());
        draw_line_segment_mut(canvas, (kp.x, kp.y), tip, color);
    }
}
