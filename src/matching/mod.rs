pub mod brute_force;
pub mod descriptors;

pub use brute_force::BruteForceMatcher;
pub use descriptors::{DescriptorKind, Descriptors};

use crate::Result;
use serde::{Deserialize, Serialize};

/// Correspondence between one query descriptor and one trained descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub query_idx: usize,
    pub train_idx: usize,
    pub distance: f32,
}

impl Match {
    pub fn new(query_idx: usize, train_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            train_idx,
            distance,
        }
    }
}

/// Distance metric used to compare descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceNorm {
    /// Number of differing bits; binary descriptors only.
    Hamming,
    /// Euclidean distance.
    L2,
}

/// Nearest-neighbour index over one trained descriptor set.
///
/// Built once with `add` followed by `train`; read-only afterwards so a
/// trained matcher can be shared across threads.
pub trait DescriptorMatcher: Send + Sync {
    fn add(&mut self, descriptors: &Descriptors) -> Result<()>;

    fn train(&mut self);

    fn is_trained(&self) -> bool;

    fn clear(&mut self);

    /// Best trained match for every query descriptor.
    fn match_descriptors(&self, query: &Descriptors) -> Result<Vec<Match>>;

    /// Up to `k` trained matches per query descriptor, nearest first.
    fn knn_match(&self, query: &Descriptors, k: usize) -> Result<Vec<Vec<Match>>>;
}
