use crate::config::FileFormat;
use crate::features::Keypoint;
use crate::matching::Descriptors;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Serialized form of a registered pattern: reference size plus precomputed
/// features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub width: u32,
    pub height: u32,
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Descriptors,
}

impl PatternRecord {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("Failed to read pattern record {}: {}", path.as_ref().display(), e)
        })?;
        FileFormat::parse(&content)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, format: FileFormat) -> Result<()> {
        fs::write(path, format.render(self)?)?;
        Ok(())
    }
}
