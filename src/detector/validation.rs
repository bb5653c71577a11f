use crate::features::Keypoint;
use crate::geometry::{Homography, HomographyEstimator, Point2f};
use crate::matching::Match;
use serde::Serialize;

/// Outcome of matching the query against one pattern.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerPatternResult {
    pub matches: Vec<Match>,
    pub homography: Homography,
    pub homography_found: bool,
}

/// Fit a pattern-to-query homography to `matches` and keep only the inliers.
///
/// Fewer than `min_correspondences` matches are returned untouched with
/// `homography_found = false`. An estimator that produces nothing yields the
/// identity and an empty inlier set. The fit counts only with more than
/// `min_correspondences` inliers.
pub fn refine_matches_with_homography(
    query_keypoints: &[Keypoint],
    train_keypoints: &[Keypoint],
    reprojection_threshold: f64,
    min_correspondences: usize,
    matches: Vec<Match>,
    estimator: &dyn HomographyEstimator,
) -> PerPatternResult {
    if matches.len() < min_correspondences {
        return PerPatternResult {
            matches,
            homography: Homography::identity(),
            homography_found: false,
        };
    }

    let (src, dst): (Vec<Point2f>, Vec<Point2f>) = matches
        .iter()
        .map(|m| (train_keypoints[m.train_idx].pt(), query_keypoints[m.query_idx].pt()))
        .unzip();

    let (homography, mask) = estimator
        .estimate(&src, &dst, reprojection_threshold)
        .unwrap_or_else(|| (Homography::identity(), vec![false; matches.len()]));

    let inliers: Vec<Match> = matches
        .into_iter()
        .zip(mask)
        .filter_map(|(m, inlier)| inlier.then_some(m))
        .collect();
    let homography_found = inliers.len() > min_correspondences;

    PerPatternResult {
        matches: inliers,
        homography,
        homography_found,
    }
}
