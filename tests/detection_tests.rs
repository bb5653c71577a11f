mod common;

use common::*;
use image::{DynamicImage, GrayImage, Luma};
use pattern_detector::detector::candidate::get_matches;
use pattern_detector::detector::PatternStore;
use pattern_detector::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PATTERN_CORNERS: [(f32, f32); 4] = [(0.0, 0.0), (200.0, 0.0), (200.0, 100.0), (0.0, 100.0)];

#[test]
fn test_pattern_has_enough_features() {
    let pattern = textured(200, 100, 1);
    let features = OrbExtractor::new().extract(&pattern).unwrap();
    assert!(features.len() >= 50, "only {} keypoints", features.len());
}

#[test]
fn test_identical_frame_is_found() {
    let pattern = textured(200, 100, 1);
    let detector = trained_detector(DetectorConfig::default(), &[pattern.clone()]);

    let info = detector
        .find_pattern(&DynamicImage::ImageLuma8(pattern))
        .unwrap()
        .expect("pattern should be found");

    assert_eq!(info.pattern_idx, 0);
    assert!(info.homography.normalized().max_abs_diff(&Homography::identity()) < 1e-3);
    assert_corners_near(&info.points2d, PATTERN_CORNERS, 1.0);
}

#[test]
fn test_translated_pattern_is_found() {
    let pattern = textured(200, 100, 2);
    let frame = paste((320, 240), &pattern, (60, 48));

    for refine in [false, true] {
        let config = DetectorConfig {
            enable_homography_refinement: refine,
            ..DetectorConfig::default()
        };
        let detector = trained_detector(config, &[pattern.clone()]);
        let report = detector.detect_gray(&frame, None).unwrap();
        let info = report.info().expect("pattern should be found");

        assert_corners_near(
            &info.points2d,
            [(60.0, 48.0), (260.0, 48.0), (260.0, 148.0), (60.0, 148.0)],
            1.0,
        );
    }
}

#[test]
fn test_blank_frame_is_not_found() {
    let detector = trained_detector(DetectorConfig::default(), &[textured(200, 100, 3)]);
    let blank = GrayImage::from_pixel(320, 240, Luma([200]));

    let report = detector.detect_gray(&blank, None).unwrap();
    assert!(!report.found());
    assert_eq!(report.failure(), Some(DetectionFailure::NoFeatures));
    assert_eq!(report.query_keypoints, 0);
    assert!(detector
        .find_pattern(&DynamicImage::ImageLuma8(blank))
        .unwrap()
        .is_none());
}

#[test]
fn test_selects_the_matching_pattern() {
    let a = textured(200, 100, 10);
    let b = textured(200, 100, 11);
    let detector = trained_detector(DetectorConfig::default(), &[a, b.clone()]);

    let report = detector.detect_gray(&b, None).unwrap();
    assert_eq!(report.info().map(|i| i.pattern_idx), Some(1));
    assert_eq!(report.candidates.len(), 2);
    assert!(report.candidates[1].inliers > report.candidates[0].inliers);
}

#[test]
fn test_empty_pattern_is_never_selected() {
    let blank = GrayImage::from_pixel(200, 100, Luma([60]));
    let textured_pattern = textured(200, 100, 4);
    let detector = trained_detector(DetectorConfig::default(), &[blank.clone(), textured_pattern.clone()]);
    assert!(detector.patterns()[0].keypoints.is_empty());

    let report = detector.detect_gray(&textured_pattern, None).unwrap();
    assert_eq!(report.info().map(|i| i.pattern_idx), Some(1));
    assert!(!report.candidates[0].homography_found);
    assert!(report.candidates[1].inliers > 25);

    let only_blank = trained_detector(DetectorConfig::default(), &[blank]);
    let report = only_blank.detect_gray(&textured_pattern, None).unwrap();
    assert_eq!(report.failure(), Some(DetectionFailure::NoCandidate));
}

#[test]
fn test_ratio_test_never_adds_matches() {
    let pattern = textured(200, 100, 5);
    let frame = paste((260, 180), &pattern, (32, 40));
    let extractor = OrbExtractor::new();

    let registered = Pattern::from_image(&DynamicImage::ImageLuma8(pattern), &extractor);
    let store = PatternStore::train(vec![registered], None);
    let query = extractor.extract(&frame).unwrap();

    let plain = get_matches(&query.descriptors, store.matcher(0), None).unwrap();
    let filtered = get_matches(&query.descriptors, store.matcher(0), Some(1.0 / 1.5)).unwrap();
    assert!(filtered.len() <= plain.len());
    assert!(filtered.iter().all(|m| plain.contains(m)));
}

#[test]
fn test_plain_matching_mode() {
    let pattern = textured(200, 100, 6);
    let extractor = Box::new(OrbExtractor::new());
    let mut detector = PatternDetector::new(extractor, false);
    assert!(!detector.config().enable_ratio_test);

    let built = detector.build_patterns_from_images(&[DynamicImage::ImageLuma8(pattern.clone())]);
    detector.train(built);
    let report = detector.detect_gray(&pattern, None).unwrap();
    assert_eq!(report.info().map(|i| i.pattern_idx), Some(0));
}

#[test]
fn test_retraining_is_idempotent() {
    let patterns = [textured(200, 100, 7), textured(200, 100, 8)];
    let frame = paste((300, 200), &patterns[1], (40, 60));
    let mut detector = trained_detector(DetectorConfig::default(), &patterns);

    let first = detector.detect_gray(&frame, None).unwrap();

    let rebuilt: Vec<Pattern> = detector.patterns().to_vec();
    detector.train(rebuilt.clone());
    detector.train(rebuilt);
    let second = detector.detect_gray(&frame, None).unwrap();

    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.candidates, second.candidates);
}

#[test]
fn test_parallel_matches_sequential() {
    let patterns = [textured(200, 100, 20), textured(200, 100, 21), textured(200, 100, 22)];
    let frame = paste((320, 200), &patterns[2], (68, 44));

    let parallel = trained_detector(DetectorConfig::default(), &patterns);
    let sequential = trained_detector(
        DetectorConfig {
            parallel: false,
            ..DetectorConfig::default()
        },
        &patterns,
    );

    let a = parallel.detect_gray(&frame, None).unwrap();
    let b = sequential.detect_gray(&frame, None).unwrap();
    assert_eq!(a.outcome, b.outcome);
    assert_eq!(a.candidates, b.candidates);
    assert_eq!(a.info().map(|i| i.pattern_idx), Some(2));
}

#[test]
fn test_cancelled_detection() {
    let pattern = textured(200, 100, 9);
    let detector = trained_detector(DetectorConfig::default(), &[pattern.clone()]);
    let token = CancellationToken::new();
    token.cancel();

    let report = detector.detect_gray(&pattern, Some(&token)).unwrap();
    assert_eq!(report.failure(), Some(DetectionFailure::Cancelled));
}

#[test]
fn test_correlation_id_is_reported() {
    let pattern = textured(200, 100, 12);
    let detector = trained_detector(DetectorConfig::default(), &[pattern.clone()]);

    let id = logging::new_correlation_id();
    let report = detector.detect_gray(&pattern, None).unwrap();
    assert_eq!(report.correlation_id, id);
    logging::clear_correlation_id();
}

/// Delegates the first estimate and fails every later one.
struct FirstCallOnly {
    inner: RansacHomographyEstimator,
    calls: AtomicUsize,
}

impl HomographyEstimator for FirstCallOnly {
    fn estimate(&self, src: &[Point2f], dst: &[Point2f], threshold: f64) -> Option<(Homography, Vec<bool>)> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            self.inner.estimate(src, dst, threshold)
        } else {
            None
        }
    }
}

fn detector_with_failing_refinement(policy: RefinementFailurePolicy, pattern: &GrayImage) -> PatternDetector {
    let config = DetectorConfig {
        refinement_failure: policy,
        ..DetectorConfig::default()
    };
    let estimator = FirstCallOnly {
        inner: RansacHomographyEstimator::new(),
        calls: AtomicUsize::new(0),
    };
    let mut detector = PatternDetector::with_components(config, Box::new(OrbExtractor::new()), Box::new(estimator));
    let built = detector.build_patterns_from_images(&[DynamicImage::ImageLuma8(pattern.clone())]);
    detector.train(built);
    detector
}

#[test]
fn test_refinement_failure_fails_detection() {
    let pattern = textured(200, 100, 13);
    let detector = detector_with_failing_refinement(RefinementFailurePolicy::Fail, &pattern);

    let report = detector.detect_gray(&pattern, None).unwrap();
    assert_eq!(report.failure(), Some(DetectionFailure::RefinementFailed));
    assert!(report.candidates[0].homography_found);
}

#[test]
fn test_refinement_failure_can_keep_rough_result() {
    let pattern = textured(200, 100, 13);
    let detector = detector_with_failing_refinement(RefinementFailurePolicy::UseRough, &pattern);

    let info = detector.detect_gray(&pattern, None).unwrap().into_info().expect("rough result kept");
    assert_corners_near(&info.points2d, PATTERN_CORNERS, 1.0);
}

struct NeverFits;

impl HomographyEstimator for NeverFits {
    fn estimate(&self, _: &[Point2f], _: &[Point2f], _: f64) -> Option<(Homography, Vec<bool>)> {
        None
    }
}

#[test]
fn test_degenerate_fit_is_not_a_detection() {
    let pattern = textured(200, 100, 14);
    let mut detector =
        PatternDetector::with_components(DetectorConfig::default(), Box::new(OrbExtractor::new()), Box::new(NeverFits));
    let built = detector.build_patterns_from_images(&[DynamicImage::ImageLuma8(pattern.clone())]);
    detector.train(built);

    let report = detector.detect_gray(&pattern, None).unwrap();
    assert_eq!(report.failure(), Some(DetectionFailure::NoCandidate));
    assert!(!report.candidates[0].homography_found);
    assert_eq!(report.candidates[0].inliers, 0);
}

#[test]
#[should_panic(expected = "before train")]
fn test_detect_before_train_panics() {
    let detector = PatternDetector::new(Box::new(OrbExtractor::new()), true);
    let _ = detector.detect_gray(&textured(200, 100, 15), None);
}

#[test]
fn test_incomparable_pattern_does_not_abort_detection() {
    let orb_image = textured(200, 100, 16);
    let float_pattern = Pattern::from_parts(
        PatternSize { width: 200, height: 100 },
        vec![Keypoint::new(20.0, 20.0), Keypoint::new(120.0, 60.0)],
        Descriptors::from_float_rows(4, &[vec![0.1, 0.2, 0.3, 0.4], vec![0.4, 0.3, 0.2, 0.1]]).unwrap(),
    )
    .unwrap();

    let mut detector = PatternDetector::with_components(
        DetectorConfig::default(),
        Box::new(OrbExtractor::new()),
        Box::new(RansacHomographyEstimator::new()),
    );
    let orb_pattern = detector.build_pattern_from_image(&DynamicImage::ImageLuma8(orb_image.clone()));
    detector.train(vec![float_pattern, orb_pattern]);

    let report = detector.detect_gray(&orb_image, None).unwrap();
    assert_eq!(report.info().map(|i| i.pattern_idx), Some(1));
    assert!(!report.candidates[0].homography_found);
    assert_eq!(report.candidates[0].inliers, 0);
}

/// Rotation by `degrees` about `(cx, cy)`.
fn rotation_about(degrees: f64, cx: f64, cy: f64) -> Homography {
    let (s, c) = degrees.to_radians().sin_cos();
    Homography::from_rows([
        [c, -s, cx - c * cx + s * cy],
        [s, c, cy - s * cx - c * cy],
        [0.0, 0.0, 1.0],
    ])
}

#[test]
fn test_refinement_corrects_rotated_rough_estimate() {
    let pattern = textured(200, 100, 2);
    let frame = paste((320, 240), &pattern, (60, 48));
    let extractor = OrbExtractor::new();
    let registered = Pattern::from_image(&DynamicImage::ImageLuma8(pattern), &extractor);
    let store = PatternStore::train(vec![registered], None);

    // Off by a small rotation that does not commute with the placement
    let rough = Homography::translation(60.0, 48.0) * rotation_about(3.0, 100.0, 50.0);
    let expected = [(60.0, 48.0), (260.0, 48.0), (260.0, 148.0), (60.0, 148.0)];

    let rough_corners = store.pattern(0).points2d.map(|c| rough.transform_point(&c));
    let worst = rough_corners
        .iter()
        .zip(expected)
        .map(|(a, (ex, ey))| (a.x - ex).abs().max((a.y - ey).abs()))
        .fold(0.0f32, f32::max);
    assert!(worst > 2.0, "rough estimate already within {} px", worst);

    let refined = pattern_detector::detector::refinement::refine_homography(
        &frame,
        &rough,
        store.pattern(0),
        store.matcher(0),
        &extractor,
        &RansacHomographyEstimator::new(),
        &DetectorConfig::default(),
    )
    .unwrap()
    .expect("refinement should succeed");

    let corners = store.pattern(0).points2d.map(|c| refined.transform_point(&c));
    assert_corners_near(&corners, expected, 1.5);
}

#[test]
fn test_best_of_two_found_patterns_is_selected() {
    let a = textured(200, 100, 30);
    let b = textured(200, 100, 31);

    let mut frame = paste((480, 240), &a, (20, 70));
    image::imageops::replace(&mut frame, &b, 260, 70);
    // Hide the right 30% of A so B keeps more inliers
    let cover = GrayImage::from_pixel(60, 100, Luma([128]));
    image::imageops::replace(&mut frame, &cover, 160, 70);

    let detector = trained_detector(DetectorConfig::default(), &[a, b]);
    let report = detector.detect_gray(&frame, None).unwrap();

    assert!(report.candidates[0].homography_found, "{:?}", report.candidates);
    assert!(report.candidates[1].homography_found, "{:?}", report.candidates);
    assert!(report.candidates[1].inliers > report.candidates[0].inliers);

    let info = report.info().expect("pattern should be found");
    assert_eq!(info.pattern_idx, 1);
    assert_corners_near(
        &info.points2d,
        [(260.0, 70.0), (460.0, 70.0), (460.0, 170.0), (260.0, 170.0)],
        1.0,
    );
}

/// ORB extractor that notes which span is current on every call.
struct SpanRecordingExtractor {
    inner: OrbExtractor,
    seen: Arc<Mutex<Vec<Option<&'static str>>>>,
}

impl FeatureExtractor for SpanRecordingExtractor {
    fn name(&self) -> &str {
        "span-recording"
    }

    fn extract(&self, image: &GrayImage) -> Option<Features> {
        let current = tracing::Span::current().metadata().map(|m| m.name());
        self.seen.lock().unwrap().push(current);
        self.inner.extract(image)
    }

    fn empty_descriptors(&self) -> Descriptors {
        self.inner.empty_descriptors()
    }
}

#[test]
fn test_pipeline_runs_inside_detection_span() {
    let pattern = textured(200, 100, 17);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let extractor = SpanRecordingExtractor {
        inner: OrbExtractor::new(),
        seen: Arc::clone(&seen),
    };
    let mut detector = PatternDetector::with_components(
        DetectorConfig::default(),
        Box::new(extractor),
        Box::new(RansacHomographyEstimator::new()),
    );
    let built = detector.build_patterns_from_images(&[DynamicImage::ImageLuma8(pattern.clone())]);
    detector.train(built);
    seen.lock().unwrap().clear();

    let report = tracing::subscriber::with_default(tracing_subscriber::registry(), || {
        detector.detect_gray(&pattern, None).unwrap()
    });
    assert!(report.found());

    // Frame extraction plus the refinement pass
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|name| *name == Some("detection")), "{:?}", seen);
}
