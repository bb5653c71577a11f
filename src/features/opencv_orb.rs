use crate::config::OrbConfig;
use crate::features::{FeatureExtractor, Features, Keypoint};
use crate::matching::{DescriptorKind, Descriptors};
use crate::utils::grayimage_to_mat;
use crate::Result;
use image::GrayImage;
use opencv::core::{no_array, KeyPoint, Mat, Ptr, Vector};
use opencv::features2d::{ORB_ScoreType, ORB};
use opencv::prelude::*;
use std::sync::Mutex;

const DESCRIPTOR_BYTES: usize = 32;

/// ORB extractor backed by OpenCV's `features2d` module.
pub struct OpenCvOrbExtractor {
    detector: Mutex<Ptr<ORB>>,
    config: OrbConfig,
}

// SAFETY: the detector is only touched through the mutex
unsafe impl Send for OpenCvOrbExtractor {}
unsafe impl Sync for OpenCvOrbExtractor {}

impl OpenCvOrbExtractor {
    pub fn new() -> Result<Self> {
        Self::with_config(OrbConfig::default())
    }

    pub fn with_config(config: OrbConfig) -> Result<Self> {
        let detector = ORB::create(
            config.max_features as i32,
            config.scale_factor,
            config.n_levels as i32,
            config.edge_threshold as i32,
            0,
            2,
            ORB_ScoreType::HARRIS_SCORE,
            config.patch_size as i32,
            config.fast_threshold as i32,
        )?;

        Ok(Self {
            detector: Mutex::new(detector),
            config,
        })
    }

    pub fn config(&self) -> &OrbConfig {
        &self.config
    }

    fn detect_and_compute(&self, image: &GrayImage) -> Result<(Vector<KeyPoint>, Mat)> {
        let mat = grayimage_to_mat(image)?;
        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();

        let mut detector = self
            .detector
            .lock()
            .map_err(|_| anyhow::anyhow!("ORB detector lock poisoned"))?;
        detector.detect_and_compute(&mat, &no_array(), &mut keypoints, &mut descriptors, false)?;

        Ok((keypoints, descriptors))
    }

    fn convert(keypoints: &Vector<KeyPoint>, descriptors: &Mat) -> Result<Features> {
        let mut rows = Vec::with_capacity(descriptors.rows() as usize);
        for r in 0..descriptors.rows() {
            let mut row = [0u8; DESCRIPTOR_BYTES];
            for (c, byte) in row.iter_mut().enumerate() {
                *byte = *descriptors.at_2d::<u8>(r, c as i32)?;
            }
            rows.push(row);
        }

        let keypoints = keypoints
            .iter()
            .map(|kp| Keypoint {
                x: kp.pt().x,
                y: kp.pt().y,
                size: kp.size(),
                angle: kp.angle().to_radians(),
                response: kp.response(),
                octave: kp.octave().clamp(0, u8::MAX as i32) as u8,
            })
            .collect();

        Ok(Features {
            keypoints,
            descriptors: Descriptors::from_binary_rows(&rows),
        })
    }
}

impl FeatureExtractor for OpenCvOrbExtractor {
    fn name(&self) -> &str {
        "OpenCV-ORB"
    }

    fn extract(&self, image: &GrayImage) -> Option<Features> {
        let result = self
            .detect_and_compute(image)
            .and_then(|(keypoints, descriptors)| Self::convert(&keypoints, &descriptors));

        match result {
            Ok(features) if !features.is_empty() => Some(features),
            Ok(_) => None,
            Err(e) => {
                log::warn!("OpenCV ORB extraction failed: {}", e);
                None
            }
        }
    }

    fn empty_descriptors(&self) -> Descriptors {
        Descriptors::empty(DescriptorKind::Binary, DESCRIPTOR_BYTES)
    }
}
