//! Registered reference patterns.

pub mod record;

pub use record::PatternRecord;

use crate::features::{FeatureExtractor, Keypoint};
use crate::geometry::{Point2f, Point3f};
use crate::matching::Descriptors;
use crate::utils::to_grayscale;
use crate::Result;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternSize {
    pub width: u32,
    pub height: u32,
}

/// A planar reference object. Immutable once built.
#[derive(Debug, Clone)]
pub struct Pattern {
    pub size: PatternSize,
    /// Image corners: top-left, top-right, bottom-right, bottom-left
    pub points2d: [Point2f; 4],
    /// Same corners on a plane centred at the origin, longest side of unit length
    pub points3d: [Point3f; 4],
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl Pattern {
    /// Register an image. An image without keypoints still yields a pattern,
    /// with empty features, that can never be detected.
    pub fn from_image(image: &DynamicImage, extractor: &dyn FeatureExtractor) -> Self {
        let gray = to_grayscale(image);
        let size = PatternSize {
            width: gray.width(),
            height: gray.height(),
        };

        let (keypoints, descriptors) = match extractor.extract(&gray) {
            Some(features) => (features.keypoints, features.descriptors),
            None => {
                log::warn!(
                    "{} found no keypoints in {}x{} pattern image",
                    extractor.name(),
                    size.width,
                    size.height
                );
                (Vec::new(), extractor.empty_descriptors())
            }
        };

        Self::with_corners(size, keypoints, descriptors)
    }

    pub fn from_parts(size: PatternSize, keypoints: Vec<Keypoint>, descriptors: Descriptors) -> Result<Self> {
        if keypoints.len() != descriptors.rows() {
            anyhow::bail!(
                "Pattern has {} keypoints but {} descriptor rows",
                keypoints.len(),
                descriptors.rows()
            );
        }
        if size.width == 0 || size.height == 0 {
            anyhow::bail!("Pattern size must be non-zero, got {}x{}", size.width, size.height);
        }
        Ok(Self::with_corners(size, keypoints, descriptors))
    }

    pub fn from_record(record: PatternRecord) -> Result<Self> {
        let size = PatternSize {
            width: record.width,
            height: record.height,
        };
        Self::from_parts(size, record.keypoints, record.descriptors)
    }

    pub fn to_record(&self) -> PatternRecord {
        PatternRecord {
            width: self.size.width,
            height: self.size.height,
            keypoints: self.keypoints.clone(),
            descriptors: self.descriptors.clone(),
        }
    }

    fn with_corners(size: PatternSize, keypoints: Vec<Keypoint>, descriptors: Descriptors) -> Self {
        let w = size.width as f32;
        let h = size.height as f32;
        let points2d = [
            Point2f::new(0.0, 0.0),
            Point2f::new(w, 0.0),
            Point2f::new(w, h),
            Point2f::new(0.0, h),
        ];

        let max_size = w.max(h).max(1.0);
        let unit_w = w / max_size;
        let unit_h = h / max_size;
        let points3d = [
            Point3f::new(-unit_w, -unit_h, 0.0),
            Point3f::new(unit_w, -unit_h, 0.0),
            Point3f::new(unit_w, unit_h, 0.0),
            Point3f::new(-unit_w, unit_h, 0.0),
        ];

        Self {
            size,
            points2d,
            points3d,
            keypoints,
            descriptors,
        }
    }
}
