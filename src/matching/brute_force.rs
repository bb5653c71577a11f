use crate::matching::{DescriptorMatcher, Descriptors, DistanceNorm, Match};
use crate::Result;
use rayon::prelude::*;

/// Exhaustive nearest-neighbour search over the trained descriptors.
#[derive(Debug, Clone)]
pub struct BruteForceMatcher {
    norm: DistanceNorm,
    train_descriptors: Option<Descriptors>,
    trained: bool,
}

impl BruteForceMatcher {
    pub fn new(norm: DistanceNorm) -> Self {
        Self {
            norm,
            train_descriptors: None,
            trained: false,
        }
    }

    /// Untrained matcher holding `descriptors`, equivalent to `new` + `add`.
    pub fn with_descriptors(norm: DistanceNorm, descriptors: &Descriptors) -> Self {
        Self {
            norm,
            train_descriptors: Some(descriptors.clone()),
            trained: false,
        }
    }

    pub fn norm(&self) -> DistanceNorm {
        self.norm
    }

    /// Number of trained descriptors.
    pub fn len(&self) -> usize {
        self.train_descriptors.as_ref().map(|d| d.rows()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn trained_set(&self, query: &Descriptors) -> Result<Option<&Descriptors>> {
        if !self.trained {
            return Err(anyhow::anyhow!("Matcher used before train()"));
        }
        match &self.train_descriptors {
            Some(train) if !train.is_empty() && !query.is_empty() => {
                query.check_compatible(train, self.norm)?;
                Ok(Some(train))
            }
            _ => Ok(None),
        }
    }

    /// The `k` nearest trained rows for one query row, ordered by distance
    /// then train index.
    fn nearest(&self, train: &Descriptors, query: &Descriptors, query_idx: usize, k: usize) -> Vec<Match> {
        let Some(q) = query.row(query_idx) else {
            return Vec::new();
        };

        let mut best: Vec<Match> = Vec::with_capacity(k + 1);
        for train_idx in 0..train.rows() {
            let Some(t) = train.row(train_idx) else {
                continue;
            };
            let distance = q.distance(&t, self.norm);
            if best.len() == k && best.last().is_some_and(|worst| worst.distance <= distance) {
                continue;
            }
            let pos = best
                .iter()
                .position(|m| m.distance > distance)
                .unwrap_or(best.len());
            best.insert(pos, Match::new(query_idx, train_idx, distance));
            best.truncate(k);
        }
        best
    }
}

impl DescriptorMatcher for BruteForceMatcher {
    fn add(&mut self, descriptors: &Descriptors) -> Result<()> {
        if self.trained {
            return Err(anyhow::anyhow!("Cannot add descriptors to a trained matcher"));
        }
        match &mut self.train_descriptors {
            Some(existing) => existing.append(descriptors),
            None => {
                self.train_descriptors = Some(descriptors.clone());
                Ok(())
            }
        }
    }

    fn train(&mut self) {
        self.trained = true;
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn clear(&mut self) {
        self.train_descriptors = None;
        self.trained = false;
    }

    fn match_descriptors(&self, query: &Descriptors) -> Result<Vec<Match>> {
        let Some(train) = self.trained_set(query)? else {
            return Ok(Vec::new());
        };

        Ok((0..query.rows())
            .into_par_iter()
            .filter_map(|query_idx| self.nearest(train, query, query_idx, 1).into_iter().next())
            .collect())
    }

    fn knn_match(&self, query: &Descriptors, k: usize) -> Result<Vec<Vec<Match>>> {
        if k == 0 {
            return Err(anyhow::anyhow!("knn_match requires k >= 1"));
        }
        let Some(train) = self.trained_set(query)? else {
            return Ok(vec![Vec::new(); query.rows()]);
        };

        Ok((0..query.rows())
            .into_par_iter()
            .map(|query_idx| self.nearest(train, query, query_idx, k))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(fill: u8, flips: usize) -> [u8; 32] {
        let mut r = [fill; 32];
        for i in 0..flips {
            r[i / 8] ^= 1 << (i % 8);
        }
        r
    }

    fn trained(rows: &[[u8; 32]]) -> BruteForceMatcher {
        let mut matcher = BruteForceMatcher::new(DistanceNorm::Hamming);
        matcher.add(&Descriptors::from_binary_rows(rows)).unwrap();
        matcher.train();
        matcher
    }

    #[test]
    fn test_knn_is_ordered_nearest_first() {
        let matcher = trained(&[row(0, 10), row(0, 0), row(0, 40)]);
        let query = Descriptors::from_binary_rows(&[row(0, 1)]);

        let knn = matcher.knn_match(&query, 2).unwrap();
        assert_eq!(knn.len(), 1);
        assert_eq!(knn[0].len(), 2);
        assert_eq!(knn[0][0].train_idx, 1);
        assert_eq!(knn[0][0].distance, 1.0);
        assert_eq!(knn[0][1].train_idx, 0);
        assert_eq!(knn[0][1].distance, 9.0);
    }

    #[test]
    fn test_match_returns_one_per_query() {
        let matcher = trained(&[row(0, 0), row(0xff, 0)]);
        let query = Descriptors::from_binary_rows(&[row(0xff, 2), row(0, 3)]);

        let matches = matcher.match_descriptors(&query).unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!((matches[0].query_idx, matches[0].train_idx), (0, 1));
        assert_eq!((matches[1].query_idx, matches[1].train_idx), (1, 0));
    }

    #[test]
    fn test_with_descriptors_needs_train() {
        let rows = Descriptors::from_binary_rows(&[row(0, 0), row(0, 5)]);
        let mut matcher = BruteForceMatcher::with_descriptors(DistanceNorm::Hamming, &rows);
        assert_eq!(matcher.len(), 2);
        assert!(matcher.match_descriptors(&rows).is_err());

        matcher.train();
        let matches = matcher.match_descriptors(&rows).unwrap();
        assert_eq!((matches[1].train_idx, matches[1].distance), (1, 0.0));
    }

    #[test]
    fn test_ties_keep_lowest_train_index() {
        let matcher = trained(&[row(0, 0), row(0, 0)]);
        let query = Descriptors::from_binary_rows(&[row(0, 0)]);
        let knn = matcher.knn_match(&query, 2).unwrap();
        assert_eq!(knn[0][0].train_idx, 0);
        assert_eq!(knn[0][1].train_idx, 1);
    }

    #[test]
    fn test_empty_training_set_yields_no_matches() {
        let matcher = trained(&[]);
        let query = Descriptors::from_binary_rows(&[row(0, 0)]);
        assert!(matcher.match_descriptors(&query).unwrap().is_empty());
        let knn = matcher.knn_match(&query, 2).unwrap();
        assert_eq!(knn.len(), 1);
        assert!(knn[0].is_empty());
    }

    #[test]
    fn test_untrained_and_frozen_matcher() {
        let mut matcher = BruteForceMatcher::new(DistanceNorm::Hamming);
        matcher.add(&Descriptors::from_binary_rows(&[row(0, 0)])).unwrap();
        let query = Descriptors::from_binary_rows(&[row(0, 0)]);
        assert!(matcher.match_descriptors(&query).is_err());

        matcher.train();
        assert!(matcher.add(&Descriptors::from_binary_rows(&[row(1, 0)])).is_err());

        matcher.clear();
        assert!(!matcher.is_trained());
        assert!(matcher.is_empty());
    }

    #[test]
    fn test_kind_mismatch_is_error() {
        let matcher = trained(&[row(0, 0)]);
        let query = Descriptors::from_float_rows(32, &[vec![0.0; 32]]).unwrap();
        assert!(matcher.match_descriptors(&query).is_err());
    }
}
