use crate::config::DetectorConfig;
use crate::detector::candidate::get_matches;
use crate::detector::validation::refine_matches_with_homography;
use crate::features::FeatureExtractor;
use crate::geometry::{warp_perspective, Homography, HomographyEstimator};
use crate::matching::DescriptorMatcher;
use crate::pattern::Pattern;
use crate::Result;
use image::GrayImage;

/// Second pass on the frame un-warped into the pattern's reference frame.
///
/// Returns `rough * refinement`, or `None` when the warped view does not
/// support a homography of its own.
pub fn refine_homography(
    frame: &GrayImage,
    rough: &Homography,
    pattern: &Pattern,
    matcher: &dyn DescriptorMatcher,
    extractor: &dyn FeatureExtractor,
    estimator: &dyn HomographyEstimator,
    config: &DetectorConfig,
) -> Result<Option<Homography>> {
    let size = (pattern.size.width, pattern.size.height);
    let warped = warp_perspective(frame, rough, size, true)?;

    let Some(features) = extractor.extract(&warped) else {
        log::debug!("Refinement: no keypoints in warped {}x{} view", size.0, size.1);
        return Ok(None);
    };

    let ratio = config.enable_ratio_test.then_some(config.ratio_threshold);
    let matches = get_matches(&features.descriptors, matcher, ratio)?;
    let result = refine_matches_with_homography(
        &features.keypoints,
        &pattern.keypoints,
        config.homography_reprojection_threshold,
        config.min_correspondences,
        matches,
        estimator,
    );

    log::debug!(
        "Refinement: {} warped keypoints, {} inliers, found = {}",
        features.len(),
        result.matches.len(),
        result.homography_found
    );

    Ok(result
        .homography_found
        .then(|| *rough * result.homography))
}
