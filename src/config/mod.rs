use crate::logging::LoggingConfig;
use crate::matching::DistanceNorm;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub orb: OrbConfig,
    pub ransac: RansacConfig,
    pub logging: LoggingConfig,
}

/// What to report when the refinement pass cannot fit a homography.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementFailurePolicy {
    /// The whole detection fails.
    #[default]
    Fail,
    /// Report the rough homography instead.
    UseRough,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub enable_ratio_test: bool,
    /// Maximum accepted `best / second_best` distance ratio
    pub ratio_threshold: f32,
    pub enable_homography_refinement: bool,
    pub homography_reprojection_threshold: f64,
    /// Fewer correspondences are rejected outright; more inliers than this
    /// are required for a homography to count as found.
    pub min_correspondences: usize,
    /// Match patterns on the rayon pool instead of sequentially
    pub parallel: bool,
    /// Matcher metric; inferred from the descriptor kind when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_norm: Option<DistanceNorm>,
    pub refinement_failure: RefinementFailurePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbConfig {
    pub max_features: usize,
    pub scale_factor: f32,
    pub n_levels: usize,
    pub edge_threshold: u32,
    pub patch_size: u32,
    pub fast_threshold: u8,
    /// Seed of the BRIEF sampling pattern; patterns and queries must agree
    pub brief_seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RansacConfig {
    pub max_iterations: usize,
    pub confidence: f64,
    pub seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enable_ratio_test: true,
            ratio_threshold: 1.0 / 1.5,
            enable_homography_refinement: true,
            homography_reprojection_threshold: 3.0,
            min_correspondences: 25,
            parallel: true,
            distance_norm: None,
            refinement_failure: RefinementFailurePolicy::Fail,
        }
    }
}

impl Default for OrbConfig {
    fn default() -> Self {
        Self {
            max_features: 500,
            scale_factor: 1.2,
            n_levels: 4,
            edge_threshold: 16,
            patch_size: 31,
            fast_threshold: 20,
            brief_seed: 0x0b5e_55ed,
        }
    }
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0x5eed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    /// `.toml` files are TOML, everything else JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        match path.as_ref().extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => FileFormat::Toml,
            _ => FileFormat::Json,
        }
    }

    /// Parse `content`, choosing JSON when it starts with `{`.
    pub fn parse<T: serde::de::DeserializeOwned>(content: &str) -> crate::Result<T> {
        if content.trim_start().starts_with('{') {
            Ok(serde_json::from_str(content)?)
        } else {
            Ok(toml::from_str(content)?)
        }
    }

    pub fn render<T: Serialize>(self, value: &T) -> crate::Result<String> {
        Ok(match self {
            FileFormat::Json => serde_json::to_string_pretty(value)?,
            FileFormat::Toml => toml::to_string_pretty(value)?,
        })
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow::anyhow!("Failed to read config {}: {}", path.as_ref().display(), e)
        })?;
        FileFormat::parse(&content)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: FileFormat) -> crate::Result<()> {
        fs::write(path, format.render(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let ratio = self.detector.ratio_threshold;
        if !(ratio > 0.0 && ratio <= 1.0) {
            errors.push(format!("ratio_threshold must be in (0, 1], got {}", ratio));
        }

        if self.detector.homography_reprojection_threshold <= 0.0 {
            errors.push("homography_reprojection_threshold must be positive".to_string());
        }

        if self.detector.min_correspondences < 4 {
            errors.push("min_correspondences must be at least 4".to_string());
        }

        if self.orb.max_features == 0 {
            errors.push("ORB max_features must be positive".to_string());
        }

        if self.orb.scale_factor <= 1.0 {
            errors.push("ORB scale_factor must be greater than 1.0".to_string());
        }

        if self.orb.n_levels == 0 {
            errors.push("ORB n_levels must be at least 1".to_string());
        }

        if self.orb.edge_threshold < 3 {
            errors.push("ORB edge_threshold must be at least 3".to_string());
        }

        if self.ransac.max_iterations == 0 {
            errors.push("RANSAC max_iterations must be positive".to_string());
        }

        if !(self.ransac.confidence > 0.0 && self.ransac.confidence < 1.0) {
            errors.push("RANSAC confidence must be in (0, 1)".to_string());
        }

        if let Err(e) = self.logging.validate() {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

pub fn load_config_or_default(config_path: Option<&Path>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    eprintln!("Configuration validation errors:");
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                    eprintln!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                eprintln!("Failed to load config from '{}': {}", path.display(), e);
                eprintln!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}
