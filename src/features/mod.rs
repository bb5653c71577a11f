pub mod orb;
#[cfg(feature = "opencv")]
pub mod opencv_orb;

pub use orb::OrbExtractor;
#[cfg(feature = "opencv")]
pub use opencv_orb::OpenCvOrbExtractor;

use crate::geometry::Point2f;
use crate::matching::Descriptors;
use image::GrayImage;
use serde::{Deserialize, Serialize};

/// A detected interest point, in pixel coordinates of the full-resolution image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    /// Diameter of the described neighbourhood
    pub size: f32,
    /// Orientation in radians
    pub angle: f32,
    pub response: f32,
    /// Pyramid level the point was detected on
    pub octave: u8,
}

impl Keypoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            size: 31.0,
            angle: 0.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn pt(&self) -> Point2f {
        Point2f::new(self.x, self.y)
    }
}

/// Keypoints with their descriptors, aligned by index.
#[derive(Debug, Clone, PartialEq)]
pub struct Features {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl Features {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// Turns a grayscale image into keypoints plus descriptors.
pub trait FeatureExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `None` when the image yields no keypoints.
    fn extract(&self, image: &GrayImage) -> Option<Features>;

    /// Descriptor set with this extractor's kind and width and no rows.
    fn empty_descriptors(&self) -> Descriptors;
}
