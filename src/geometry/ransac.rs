use crate::config::RansacConfig;
use crate::geometry::{Homography, Point2f};
use nalgebra::{DMatrix, Matrix3, SMatrix, SVector};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Minimal sample size for a projective fit.
const MIN_SAMPLE: usize = 4;

/// Robust homography solver mapping `src` points onto `dst` points.
///
/// Returns the transform and an inlier mask parallel to the inputs, or `None`
/// when no transform could be fitted.
pub trait HomographyEstimator: Send + Sync {
    fn estimate(
        &self,
        src: &[Point2f],
        dst: &[Point2f],
        reprojection_threshold: f64,
    ) -> Option<(Homography, Vec<bool>)>;
}

/// RANSAC over exact 4-point fits, followed by a normalized DLT refit on the
/// consensus set.
#[derive(Debug, Clone, Default)]
pub struct RansacHomographyEstimator {
    config: RansacConfig,
}

impl RansacHomographyEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: RansacConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RansacConfig {
        &self.config
    }
}

impl HomographyEstimator for RansacHomographyEstimator {
    fn estimate(
        &self,
        src: &[Point2f],
        dst: &[Point2f],
        reprojection_threshold: f64,
    ) -> Option<(Homography, Vec<bool>)> {
        let n = src.len();
        if n < MIN_SAMPLE || dst.len() != n {
            return None;
        }

        let src: Vec<(f64, f64)> = src.iter().map(|p| (p.x as f64, p.y as f64)).collect();
        let dst: Vec<(f64, f64)> = dst.iter().map(|p| (p.x as f64, p.y as f64)).collect();
        let threshold_sq = reprojection_threshold * reprojection_threshold;

        // Seeded per call so repeated estimates on the same data agree
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut max_iterations = self.config.max_iterations;
        let mut best: Option<(Homography, usize)> = None;
        let mut iteration = 0;

        while iteration < max_iterations {
            iteration += 1;

            let sample = rand::seq::index::sample(&mut rng, n, MIN_SAMPLE);
            let idx = [sample.index(0), sample.index(1), sample.index(2), sample.index(3)];
            let s = idx.map(|i| src[i]);
            let d = idx.map(|i| dst[i]);

            if is_degenerate_sample(&s) || is_degenerate_sample(&d) {
                continue;
            }

            let Some(model) = solve_four_point(&s, &d) else {
                continue;
            };

            let inlier_count = count_inliers(&model, &src, &dst, threshold_sq);
            let best_count = best.as_ref().map(|(_, c)| *c).unwrap_or(0);
            if inlier_count > best_count {
                best = Some((model, inlier_count));
                max_iterations = adaptive_iterations(
                    n,
                    inlier_count,
                    self.config.confidence,
                    max_iterations,
                );
            }
        }

        let (model, inlier_count) = best?;
        let mask = inlier_mask(&model, &src, &dst, threshold_sq);

        // Least-squares refit on the consensus set; keep it only if it does not
        // lose support.
        let (inlier_src, inlier_dst): (Vec<_>, Vec<_>) = src
            .iter()
            .zip(dst.iter())
            .zip(mask.iter())
            .filter(|(_, &keep)| keep)
            .map(|((s, d), _)| (*s, *d))
            .unzip();

        if let Some(refit) = dlt_normalized(&inlier_src, &inlier_dst) {
            let refit_mask = inlier_mask(&refit, &src, &dst, threshold_sq);
            let refit_count = refit_mask.iter().filter(|&&m| m).count();
            if refit_count >= inlier_count {
                log::trace!(
                    "RANSAC refit kept {} of {} correspondences after {} iterations",
                    refit_count,
                    n,
                    iteration
                );
                return Some((refit, refit_mask));
            }
        }

        log::trace!(
            "RANSAC model kept {} of {} correspondences after {} iterations",
            inlier_count,
            n,
            iteration
        );
        Some((model, mask))
    }
}

/// Number of iterations needed to draw one all-inlier sample with the
/// requested confidence, given the current inlier ratio.
fn adaptive_iterations(total: usize, inliers: usize, confidence: f64, current: usize) -> usize {
    let inlier_ratio = inliers as f64 / total as f64;
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let denom = (1.0 - inlier_ratio.powi(MIN_SAMPLE as i32)).ln();

    if !denom.is_finite() {
        // Every correspondence is an inlier
        return 0;
    }
    if denom >= 0.0 {
        return current;
    }

    let needed = (num / denom).ceil();
    if needed < current as f64 {
        needed as usize
    } else {
        current
    }
}

/// True when any three of the four points are (nearly) collinear.
fn is_degenerate_sample(points: &[(f64, f64); 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES.iter().any(|&(a, b, c)| {
        let (p0, p1, p2) = (points[a], points[b], points[c]);
        let area = (p1.0 - p0.0) * (p2.1 - p0.1) - (p1.1 - p0.1) * (p2.0 - p0.0);
        area.abs() < 1e-6
    })
}

/// Exact homography through four correspondences with `h33` fixed to one.
fn solve_four_point(src: &[(f64, f64); 4], dst: &[(f64, f64); 4]) -> Option<Homography> {
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for i in 0..4 {
        let (x, y) = src[i];
        let (u, v) = dst[i];
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let h = a.lu().solve(&b)?;
    let model = Homography::from_matrix(Matrix3::new(
        h[0], h[1], h[2],
        h[3], h[4], h[5],
        h[6], h[7], 1.0,
    ));
    model.is_finite().then_some(model)
}

/// Hartley normalization: zero mean, average distance sqrt(2).
fn normalize_points(points: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| ((p.0 - cx).powi(2) + (p.1 - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    if mean_dist <= f64::EPSILON {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;
    let normalized = points.iter().map(|p| ((p.0 - cx) * s, (p.1 - cy) * s)).collect();
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    Some((normalized, t))
}

/// Normalized direct linear transform over all given correspondences.
fn dlt_normalized(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Homography> {
    let n = src.len();
    if n < MIN_SAMPLE || dst.len() != n {
        return None;
    }

    let (src_n, t_src) = normalize_points(src)?;
    let (dst_n, t_dst) = normalize_points(dst)?;

    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (s, d)) in src_n.iter().zip(dst_n.iter()).enumerate() {
        let (x, y) = *s;
        let (u, v) = *d;
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let (smallest, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let h = v_t.row(smallest);

    let h_norm = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    let t_dst_inv = t_dst.try_inverse()?;
    let model = Homography::from_matrix(t_dst_inv * h_norm * t_src).normalized();
    model.is_finite().then_some(model)
}

fn reprojection_error_sq(model: &Homography, src: (f64, f64), dst: (f64, f64)) -> Option<f64> {
    let (x, y) = model.project(src.0, src.1)?;
    Some((x - dst.0).powi(2) + (y - dst.1).powi(2))
}

fn count_inliers(model: &Homography, src: &[(f64, f64)], dst: &[(f64, f64)], threshold_sq: f64) -> usize {
    src.iter()
        .zip(dst.iter())
        .filter(|(s, d)| {
            reprojection_error_sq(model, **s, **d).is_some_and(|err| err <= threshold_sq)
        })
        .count()
}

fn inlier_mask(model: &Homography, src: &[(f64, f64)], dst: &[(f64, f64)], threshold_sq: f64) -> Vec<bool> {
    src.iter()
        .zip(dst.iter())
        .map(|(s, d)| reprojection_error_sq(model, *s, *d).is_some_and(|err| err <= threshold_sq))
        .collect()
}
