//! Planar geometry: homographies, robust estimation and perspective warping.

pub mod homography;
pub mod ransac;
pub mod warp;

pub use homography::{Homography, Point2f, Point3f};
pub use ransac::{HomographyEstimator, RansacHomographyEstimator};
pub use warp::warp_perspective;
