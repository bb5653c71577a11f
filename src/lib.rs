pub mod config;
pub mod detector;
pub mod features;
pub mod geometry;
pub mod logging;
pub mod matching;
pub mod pattern;
pub mod utils;
pub mod visualization;

pub use config::{Config, DetectorConfig, FileFormat, OrbConfig, RansacConfig, RefinementFailurePolicy};
pub use detector::{
    CancellationToken, CandidateSummary, DetectionFailure, DetectionOutcome, DetectionReport, PatternDetector,
    PatternTrackingInfo, PerPatternResult,
};
pub use features::{FeatureExtractor, Features, Keypoint, OrbExtractor};
pub use geometry::{
    warp_perspective, Homography, HomographyEstimator, Point2f, Point3f, RansacHomographyEstimator,
};
pub use matching::{BruteForceMatcher, DescriptorKind, DescriptorMatcher, Descriptors, DistanceNorm, Match};
pub use pattern::{Pattern, PatternRecord, PatternSize};
pub use utils::*;

pub type Result<T> = anyhow::Result<T>;
