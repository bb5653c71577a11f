//! Multi-pattern detection: per-pattern candidate matching fanned out over
//! the trained store, best-candidate selection and homography refinement.

pub mod candidate;
pub mod dispatch;
pub mod refinement;
pub mod store;
pub mod validation;

pub use dispatch::{select_best, CancellationToken, MatchTask};
pub use store::PatternStore;
pub use validation::{refine_matches_with_homography, PerPatternResult};

use crate::config::{Config, DetectorConfig, RefinementFailurePolicy};
use crate::features::{FeatureExtractor, OrbExtractor};
use crate::geometry::{Homography, HomographyEstimator, Point2f, RansacHomographyEstimator};
use crate::logging::{get_correlation_id, DetectionSpan};
use crate::pattern::{Pattern, PatternRecord};
use crate::utils::{load_image, to_grayscale};
use crate::Result;
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

/// A successful detection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternTrackingInfo {
    pub pattern_idx: usize,
    /// Maps pattern-plane points into the frame
    pub homography: Homography,
    /// Pattern corners in frame coordinates
    pub points2d: [Point2f; 4],
}

/// Why a detection call found nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionFailure {
    /// The frame produced no keypoints
    NoFeatures,
    /// No pattern reached the inlier threshold
    NoCandidate,
    RefinementFailed,
    Cancelled,
}

impl fmt::Display for DetectionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DetectionFailure::NoFeatures => "no features in frame",
            DetectionFailure::NoCandidate => "no pattern matched",
            DetectionFailure::RefinementFailed => "refinement failed",
            DetectionFailure::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectionOutcome {
    Found(PatternTrackingInfo),
    NotFound { reason: DetectionFailure },
}

/// Per-pattern summary kept in the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CandidateSummary {
    pub pattern_idx: usize,
    pub inliers: usize,
    pub homography_found: bool,
}

/// Everything one detection call produced.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub correlation_id: Uuid,
    pub outcome: DetectionOutcome,
    pub candidates: Vec<CandidateSummary>,
    pub query_keypoints: usize,
    pub elapsed_ms: f64,
}

impl DetectionReport {
    pub fn found(&self) -> bool {
        matches!(self.outcome, DetectionOutcome::Found(_))
    }

    pub fn info(&self) -> Option<&PatternTrackingInfo> {
        match &self.outcome {
            DetectionOutcome::Found(info) => Some(info),
            DetectionOutcome::NotFound { .. } => None,
        }
    }

    pub fn into_info(self) -> Option<PatternTrackingInfo> {
        match self.outcome {
            DetectionOutcome::Found(info) => Some(info),
            DetectionOutcome::NotFound { .. } => None,
        }
    }

    pub fn failure(&self) -> Option<DetectionFailure> {
        match self.outcome {
            DetectionOutcome::Found(_) => None,
            DetectionOutcome::NotFound { reason } => Some(reason),
        }
    }
}

/// Locates trained planar patterns in frames.
///
/// Training replaces the pattern set; detection borrows the detector
/// immutably and keeps all scratch state per call, so one trained detector
/// can serve concurrent callers.
pub struct PatternDetector {
    config: DetectorConfig,
    extractor: Box<dyn FeatureExtractor>,
    estimator: Box<dyn HomographyEstimator>,
    store: Option<PatternStore>,
}

impl PatternDetector {
    pub fn new(extractor: Box<dyn FeatureExtractor>, ratio_test: bool) -> Self {
        let config = DetectorConfig {
            enable_ratio_test: ratio_test,
            ..DetectorConfig::default()
        };
        Self::with_components(config, extractor, Box::new(RansacHomographyEstimator::new()))
    }

    pub fn from_config(config: &Config) -> Self {
        Self::with_components(
            config.detector.clone(),
            Box::new(OrbExtractor::with_config(config.orb.clone())),
            Box::new(RansacHomographyEstimator::with_config(config.ransac.clone())),
        )
    }

    pub fn with_components(
        config: DetectorConfig,
        extractor: Box<dyn FeatureExtractor>,
        estimator: Box<dyn HomographyEstimator>,
    ) -> Self {
        Self {
            config,
            extractor,
            estimator,
            store: None,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn extractor(&self) -> &dyn FeatureExtractor {
        self.extractor.as_ref()
    }

    pub fn build_pattern_from_image(&self, image: &DynamicImage) -> Pattern {
        Pattern::from_image(image, self.extractor.as_ref())
    }

    pub fn build_patterns_from_images(&self, images: &[DynamicImage]) -> Vec<Pattern> {
        images.iter().map(|image| self.build_pattern_from_image(image)).collect()
    }

    /// `.json`/`.toml` paths are read as pattern records, anything else is
    /// decoded as an image and registered.
    pub fn build_patterns_from_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<Pattern>> {
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let is_record = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "json" | "toml"));
                if is_record {
                    Pattern::from_record(PatternRecord::load(path)?)
                } else {
                    Ok(self.build_pattern_from_image(&load_image(path)?))
                }
            })
            .collect()
    }

    /// Replace the pattern set and rebuild every matcher.
    pub fn train(&mut self, patterns: Vec<Pattern>) {
        log::info!("Training {} patterns", patterns.len());
        self.store = Some(PatternStore::train(patterns, self.config.distance_norm));
    }

    pub fn is_trained(&self) -> bool {
        self.store.is_some()
    }

    pub fn patterns(&self) -> &[Pattern] {
        self.store.as_ref().map(PatternStore::patterns).unwrap_or(&[])
    }

    /// Detect the best-matching pattern in `frame`.
    pub fn find_pattern(&self, frame: &DynamicImage) -> Result<Option<PatternTrackingInfo>> {
        Ok(self.detect(frame, None)?.into_info())
    }

    pub fn detect(&self, frame: &DynamicImage, cancel: Option<&CancellationToken>) -> Result<DetectionReport> {
        self.detect_gray(&to_grayscale(frame), cancel)
    }

    /// Panics when called before `train`.
    pub fn detect_gray(&self, frame: &GrayImage, cancel: Option<&CancellationToken>) -> Result<DetectionReport> {
        let Some(store) = self.store.as_ref() else {
            panic!("PatternDetector::detect called before train");
        };

        let correlation_id = get_correlation_id().unwrap_or_else(Uuid::new_v4);
        let span = DetectionSpan::new(frame.dimensions(), store.len(), correlation_id);
        // Extraction, estimation and refinement logs on this thread carry the span
        let _entered = span.span().clone().entered();
        let mut report = DetectionReport {
            correlation_id,
            outcome: DetectionOutcome::NotFound {
                reason: DetectionFailure::NoFeatures,
            },
            candidates: Vec::new(),
            query_keypoints: 0,
            elapsed_ms: 0.0,
        };

        let Some(query) = self.extractor.extract(frame) else {
            report.elapsed_ms = span.finish(None, false);
            return Ok(report);
        };
        report.query_keypoints = query.len();
        span.record_query_keypoints(query.len());

        let task = MatchTask {
            query: &query,
            store,
            config: &self.config,
            estimator: self.estimator.as_ref(),
        };
        let Some(results) = task.run(cancel) else {
            report.outcome = DetectionOutcome::NotFound {
                reason: DetectionFailure::Cancelled,
            };
            report.elapsed_ms = span.finish(None, false);
            return Ok(report);
        };

        report.candidates = results
            .iter()
            .enumerate()
            .map(|(pattern_idx, result)| {
                span.record_candidate(pattern_idx, result.matches.len(), result.homography_found);
                CandidateSummary {
                    pattern_idx,
                    inliers: result.matches.len(),
                    homography_found: result.homography_found,
                }
            })
            .collect();

        let Some(pattern_idx) = select_best(&results) else {
            report.outcome = DetectionOutcome::NotFound {
                reason: DetectionFailure::NoCandidate,
            };
            report.elapsed_ms = span.finish(None, false);
            return Ok(report);
        };

        let rough = results[pattern_idx].homography;
        let pattern = store.pattern(pattern_idx);

        let homography = if self.config.enable_homography_refinement {
            let refined = refinement::refine_homography(
                frame,
                &rough,
                pattern,
                store.matcher(pattern_idx),
                self.extractor.as_ref(),
                self.estimator.as_ref(),
                &self.config,
            )?;
            match (refined, self.config.refinement_failure) {
                (Some(h), _) => Some(h),
                (None, RefinementFailurePolicy::UseRough) => {
                    log::warn!("Refinement failed for pattern {}, keeping rough homography", pattern_idx);
                    Some(rough)
                }
                (None, RefinementFailurePolicy::Fail) => None,
            }
        } else {
            Some(rough)
        };

        let Some(homography) = homography else {
            report.outcome = DetectionOutcome::NotFound {
                reason: DetectionFailure::RefinementFailed,
            };
            report.elapsed_ms = span.finish(Some(pattern_idx), false);
            return Ok(report);
        };

        let points2d = pattern.points2d.map(|corner| homography.transform_point(&corner));
        report.outcome = DetectionOutcome::Found(PatternTrackingInfo {
            pattern_idx,
            homography,
            points2d,
        });
        report.elapsed_ms = span.finish(Some(pattern_idx), true);
        Ok(report)
    }
}
