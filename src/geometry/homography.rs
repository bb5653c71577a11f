use nalgebra::{Matrix3, Point2, Point3, Vector3};
use serde::{Deserialize, Serialize};
use std::ops::Mul;

pub type Point2f = Point2<f32>;
pub type Point3f = Point3<f32>;

/// 3x3 projective transform between two planes.
///
/// Composition follows matrix multiplication: `(a * b).transform_point(p)`
/// equals `a.transform_point(b.transform_point(p))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[[f64; 3]; 3]", into = "[[f64; 3]; 3]")]
pub struct Homography(Matrix3<f64>);

impl Default for Homography {
    fn default() -> Self {
        Self::identity()
    }
}

impl Homography {
    pub fn identity() -> Self {
        Self(Matrix3::identity())
    }

    pub fn from_matrix(matrix: Matrix3<f64>) -> Self {
        Self(matrix)
    }

    pub fn from_rows(rows: [[f64; 3]; 3]) -> Self {
        Self(Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2],
            rows[1][0], rows[1][1], rows[1][2],
            rows[2][0], rows[2][1], rows[2][2],
        ))
    }

    /// Pure translation by `(tx, ty)`.
    pub fn translation(tx: f64, ty: f64) -> Self {
        Self::from_rows([[1.0, 0.0, tx], [0.0, 1.0, ty], [0.0, 0.0, 1.0]])
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.0
    }

    pub fn to_rows(&self) -> [[f64; 3]; 3] {
        let m = &self.0;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }

    pub fn inverse(&self) -> Option<Self> {
        self.0.try_inverse().map(Self)
    }

    /// Rescale so that `h[2][2] == 1` when that entry is not vanishing.
    pub fn normalized(&self) -> Self {
        let scale = self.0[(2, 2)];
        if scale.abs() > f64::EPSILON {
            Self(self.0 / scale)
        } else {
            *self
        }
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }

    /// Largest absolute entry difference after normalizing both matrices.
    pub fn max_abs_diff(&self, other: &Homography) -> f64 {
        let a = self.normalized();
        let b = other.normalized();
        (a.0 - b.0).iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
    }

    /// Maps `(x, y)` through the transform in double precision. Points sent to
    /// infinity (vanishing `w`) yield `None`.
    pub fn project(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let v = self.0 * Vector3::new(x, y, 1.0);
        if v.z.abs() <= f64::EPSILON {
            return None;
        }
        Some((v.x / v.z, v.y / v.z))
    }

    /// Points on the line at infinity are mapped to the origin.
    pub fn transform_point(&self, point: &Point2f) -> Point2f {
        match self.project(point.x as f64, point.y as f64) {
            Some((x, y)) => Point2f::new(x as f32, y as f32),
            None => Point2f::origin(),
        }
    }

    pub fn transform_points(&self, points: &[Point2f]) -> Vec<Point2f> {
        points.iter().map(|p| self.transform_point(p)).collect()
    }
}

impl Mul for Homography {
    type Output = Homography;

    fn mul(self, rhs: Homography) -> Homography {
        Homography(self.0 * rhs.0)
    }
}

impl From<[[f64; 3]; 3]> for Homography {
    fn from(rows: [[f64; 3]; 3]) -> Self {
        Homography::from_rows(rows)
    }
}

impl From<Homography> for [[f64; 3]; 3] {
    fn from(h: Homography) -> Self {
        h.to_rows()
    }
}
