use crate::config::DetectorConfig;
use crate::detector::candidate::find_pattern_match;
use crate::detector::store::PatternStore;
use crate::detector::validation::PerPatternResult;
use crate::features::Features;
use crate::geometry::{Homography, HomographyEstimator};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation flag, checked before each pattern job.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Read-only description of one fan-out: the same query features matched
/// against every trained pattern.
pub struct MatchTask<'a> {
    pub query: &'a Features,
    pub store: &'a PatternStore,
    pub config: &'a DetectorConfig,
    pub estimator: &'a dyn HomographyEstimator,
}

impl<'a> MatchTask<'a> {
    /// A pattern whose matching errors (for instance a descriptor kind the
    /// query cannot be compared with) is reported as not found.
    fn run_one(&self, idx: usize, cancel: Option<&CancellationToken>) -> Option<PerPatternResult> {
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return None;
        }
        let result = find_pattern_match(
            self.query,
            self.store.pattern(idx),
            self.store.matcher(idx),
            self.config,
            self.estimator,
        );
        Some(result.unwrap_or_else(|e| {
            log::warn!("Matching against pattern {} failed: {}", idx, e);
            PerPatternResult {
                matches: Vec::new(),
                homography: Homography::identity(),
                homography_found: false,
            }
        }))
    }

    /// One result per pattern in store order, or `None` if cancelled.
    pub fn run(&self, cancel: Option<&CancellationToken>) -> Option<Vec<PerPatternResult>> {
        if self.config.parallel {
            (0..self.store.len())
                .into_par_iter()
                .map(|idx| self.run_one(idx, cancel))
                .collect()
        } else {
            (0..self.store.len())
                .map(|idx| self.run_one(idx, cancel))
                .collect()
        }
    }
}

/// Index of the found homography with the most inliers; the first one wins
/// ties.
pub fn select_best(results: &[PerPatternResult]) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None;
    for (idx, result) in results.iter().enumerate() {
        if !result.homography_found {
            continue;
        }
        let count = result.matches.len();
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((idx, count));
        }
    }
    best.map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::Match;

    fn result(inliers: usize, found: bool) -> PerPatternResult {
        PerPatternResult {
            matches: (0..inliers).map(|i| Match::new(i, i, 0.0)).collect(),
            homography: Homography::identity(),
            homography_found: found,
        }
    }

    #[test]
    fn test_selects_largest_inlier_count() {
        let results = vec![result(30, true), result(80, true)];
        assert_eq!(select_best(&results), Some(1));
    }

    #[test]
    fn test_first_wins_ties() {
        let results = vec![result(10, false), result(40, true), result(40, true)];
        assert_eq!(select_best(&results), Some(1));
    }

    #[test]
    fn test_ignores_unfound() {
        assert_eq!(select_best(&[result(100, false), result(26, true)]), Some(1));
        assert_eq!(select_best(&[result(100, false)]), None);
        assert_eq!(select_best(&[]), None);
    }

    #[test]
    fn test_token() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
