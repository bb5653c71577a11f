use crate::matching::DistanceNorm;
use crate::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorKind {
    Binary,
    Float,
}

/// Row-major descriptor matrix, one fixed-width row per keypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Descriptors {
    /// Packed bit strings; `width` is in bytes.
    Binary { width: usize, data: Vec<u8> },
    Float { width: usize, data: Vec<f32> },
}

/// Borrowed view of a single descriptor row.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorRow<'a> {
    Binary(&'a [u8]),
    Float(&'a [f32]),
}

impl Descriptors {
    pub fn empty(kind: DescriptorKind, width: usize) -> Self {
        match kind {
            DescriptorKind::Binary => Descriptors::Binary {
                width,
                data: Vec::new(),
            },
            DescriptorKind::Float => Descriptors::Float {
                width,
                data: Vec::new(),
            },
        }
    }

    /// Pack 256-bit binary descriptors.
    pub fn from_binary_rows(rows: &[[u8; 32]]) -> Self {
        Descriptors::Binary {
            width: 32,
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
        }
    }

    pub fn from_float_rows(width: usize, rows: &[Vec<f32>]) -> Result<Self> {
        if let Some(bad) = rows.iter().position(|r| r.len() != width) {
            return Err(anyhow::anyhow!(
                "Descriptor row {} has length {}, expected {}",
                bad,
                rows[bad].len(),
                width
            ));
        }
        Ok(Descriptors::Float {
            width,
            data: rows.iter().flat_map(|r| r.iter().copied()).collect(),
        })
    }

    pub fn kind(&self) -> DescriptorKind {
        match self {
            Descriptors::Binary { .. } => DescriptorKind::Binary,
            Descriptors::Float { .. } => DescriptorKind::Float,
        }
    }

    pub fn width(&self) -> usize {
        match self {
            Descriptors::Binary { width, .. } | Descriptors::Float { width, .. } => *width,
        }
    }

    pub fn rows(&self) -> usize {
        let (width, len) = match self {
            Descriptors::Binary { width, data } => (*width, data.len()),
            Descriptors::Float { width, data } => (*width, data.len()),
        };
        if width == 0 {
            0
        } else {
            len / width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0
    }

    /// Metric that suits this descriptor type.
    pub fn default_norm(&self) -> DistanceNorm {
        match self.kind() {
            DescriptorKind::Binary => DistanceNorm::Hamming,
            DescriptorKind::Float => DistanceNorm::L2,
        }
    }

    pub fn row(&self, index: usize) -> Option<DescriptorRow<'_>> {
        if index >= self.rows() {
            return None;
        }
        let start = index * self.width();
        let end = start + self.width();
        Some(match self {
            Descriptors::Binary { data, .. } => DescriptorRow::Binary(&data[start..end]),
            Descriptors::Float { data, .. } => DescriptorRow::Float(&data[start..end]),
        })
    }

    /// Check that `self` and `other` can be compared under `norm`.
    pub fn check_compatible(&self, other: &Descriptors, norm: DistanceNorm) -> Result<()> {
        if self.kind() != other.kind() {
            return Err(anyhow::anyhow!(
                "Descriptor kind mismatch: {:?} vs {:?}",
                self.kind(),
                other.kind()
            ));
        }
        if self.width() != other.width() {
            return Err(anyhow::anyhow!(
                "Descriptor width mismatch: {} vs {}",
                self.width(),
                other.width()
            ));
        }
        if norm == DistanceNorm::Hamming && self.kind() == DescriptorKind::Float {
            return Err(anyhow::anyhow!("Hamming distance requires binary descriptors"));
        }
        Ok(())
    }

    /// Append the rows of `other`, which must have the same kind and width.
    pub fn append(&mut self, other: &Descriptors) -> Result<()> {
        if self.is_empty() && self.kind() == other.kind() {
            *self = other.clone();
            return Ok(());
        }
        if self.kind() != other.kind() || self.width() != other.width() {
            return Err(anyhow::anyhow!(
                "Cannot append {:?}x{} descriptors to {:?}x{}",
                other.kind(),
                other.width(),
                self.kind(),
                self.width()
            ));
        }
        match (self, other) {
            (Descriptors::Binary { data, .. }, Descriptors::Binary { data: more, .. }) => {
                data.extend_from_slice(more)
            }
            (Descriptors::Float { data, .. }, Descriptors::Float { data: more, .. }) => {
                data.extend_from_slice(more)
            }
            _ => unreachable!("kinds checked above"),
        }
        Ok(())
    }
}

impl<'a> DescriptorRow<'a> {
    /// Distance between two rows of the same kind and width.
    pub fn distance(&self, other: &DescriptorRow<'_>, norm: DistanceNorm) -> f32 {
        match (self, other, norm) {
            (DescriptorRow::Binary(a), DescriptorRow::Binary(b), DistanceNorm::Hamming) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x ^ y).count_ones())
                .sum::<u32>() as f32,
            (DescriptorRow::Binary(a), DescriptorRow::Binary(b), DistanceNorm::L2) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| {
                    let d = *x as f32 - *y as f32;
                    d * d
                })
                .sum::<f32>()
                .sqrt(),
            (DescriptorRow::Float(a), DescriptorRow::Float(b), _) => a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y) * (x - y))
                .sum::<f32>()
                .sqrt(),
            _ => f32::INFINITY,
        }
    }
}
