use crate::config::DetectorConfig;
use crate::detector::validation::{refine_matches_with_homography, PerPatternResult};
use crate::features::Features;
use crate::geometry::HomographyEstimator;
use crate::matching::{DescriptorMatcher, Descriptors, Match};
use crate::pattern::Pattern;
use crate::Result;

/// Query-to-pattern correspondences, ratio-filtered when `ratio_threshold`
/// is set.
pub fn get_matches(
    query: &Descriptors,
    matcher: &dyn DescriptorMatcher,
    ratio_threshold: Option<f32>,
) -> Result<Vec<Match>> {
    let Some(threshold) = ratio_threshold else {
        return matcher.match_descriptors(query);
    };

    let knn = matcher.knn_match(query, 2)?;
    Ok(knn
        .into_iter()
        .filter_map(|neighbours| match neighbours.as_slice() {
            // Dividing by the farther neighbour keeps the ratio finite; two
            // zero distances are ambiguous and rejected
            [best, second] if second.distance > 0.0 && best.distance / second.distance < threshold => {
                Some(*best)
            }
            _ => None,
        })
        .collect())
}

/// Match the query against one pattern and validate with a homography.
pub fn find_pattern_match(
    query: &Features,
    pattern: &Pattern,
    matcher: &dyn DescriptorMatcher,
    config: &DetectorConfig,
    estimator: &dyn HomographyEstimator,
) -> Result<PerPatternResult> {
    let ratio = config.enable_ratio_test.then_some(config.ratio_threshold);
    let matches = get_matches(&query.descriptors, matcher, ratio)?;

    Ok(refine_matches_with_homography(
        &query.keypoints,
        &pattern.keypoints,
        config.homography_reprojection_threshold,
        config.min_correspondences,
        matches,
        estimator,
    ))
}
