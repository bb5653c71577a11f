use crate::matching::{BruteForceMatcher, DescriptorMatcher, DistanceNorm};
use crate::pattern::Pattern;

/// Trained pattern set; one matcher per pattern, read-only after training.
pub struct PatternStore {
    patterns: Vec<Pattern>,
    matchers: Vec<BruteForceMatcher>,
}

impl PatternStore {
    /// Build a fresh matcher for every pattern. `norm` overrides the metric
    /// implied by each pattern's descriptor kind.
    pub fn train(patterns: Vec<Pattern>, norm: Option<DistanceNorm>) -> Self {
        let matchers = patterns
            .iter()
            .enumerate()
            .map(|(idx, pattern)| {
                let norm = norm.unwrap_or_else(|| pattern.descriptors.default_norm());
                let mut matcher = BruteForceMatcher::with_descriptors(norm, &pattern.descriptors);
                matcher.train();
                log::debug!(
                    "Trained matcher for pattern {} ({} descriptors, {:?})",
                    idx,
                    matcher.len(),
                    norm
                );
                matcher
            })
            .collect();

        Self { patterns, matchers }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// Panics if `idx` is out of range.
    pub fn pattern(&self, idx: usize) -> &Pattern {
        match self.patterns.get(idx) {
            Some(pattern) => pattern,
            None => panic!("pattern index {} out of range ({} trained)", idx, self.patterns.len()),
        }
    }

    /// Panics if `idx` is out of range.
    pub fn matcher(&self, idx: usize) -> &dyn DescriptorMatcher {
        match self.matchers.get(idx) {
            Some(matcher) => matcher,
            None => panic!("no trained matcher for pattern {} ({} trained)", idx, self.matchers.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{DescriptorKind, Descriptors};
    use crate::pattern::PatternSize;
    use crate::features::Keypoint;

    fn pattern(rows: &[[u8; 32]]) -> Pattern {
        let keypoints = (0..rows.len()).map(|i| Keypoint::new(i as f32, 0.0)).collect();
        Pattern::from_parts(
            PatternSize { width: 10, height: 10 },
            keypoints,
            Descriptors::from_binary_rows(rows),
        )
        .unwrap()
    }

    #[test]
    fn test_one_matcher_per_pattern() {
        let store = PatternStore::train(vec![pattern(&[[1; 32]]), pattern(&[[2; 32], [3; 32]])], None);
        assert_eq!(store.len(), 2);
        assert!(store.matcher(0).is_trained());
        assert!(store.matcher(1).is_trained());

        let query = Descriptors::from_binary_rows(&[[3; 32]]);
        let matches = store.matcher(1).match_descriptors(&query).unwrap();
        assert_eq!(matches[0].train_idx, 1);
        assert_eq!(matches[0].distance, 0.0);
    }

    #[test]
    fn test_empty_pattern_is_accepted() {
        let empty = Pattern::from_parts(
            PatternSize { width: 10, height: 10 },
            Vec::new(),
            Descriptors::empty(DescriptorKind::Binary, 32),
        )
        .unwrap();
        let store = PatternStore::train(vec![empty], None);

        let query = Descriptors::from_binary_rows(&[[3; 32]]);
        assert!(store.matcher(0).match_descriptors(&query).unwrap().is_empty());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_bad_index_panics() {
        let store = PatternStore::train(vec![pattern(&[[1; 32]])], None);
        store.pattern(3);
    }
}
