//! Logging configuration: level, console output and optional JSON log files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Level for the detection pipeline (`pattern_detector::detector`)
    pub detector_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for daily-rolling JSON log files (None = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_directory: Option<PathBuf>,

    /// Include file location in logs
    pub include_file_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            detector_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
        }
    }
}

impl LoggingConfig {
    /// Verbose console logging with per-pattern traces and JSON files under `logs/`.
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            detector_level: "trace".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
        }
    }

    pub fn production() -> Self {
        Self {
            global_level: "warn".to_string(),
            detector_level: "info".to_string(),
            console_output: false,
            log_directory: Some(PathBuf::from("/var/log/pattern-detector")),
            include_file_location: false,
        }
    }

    /// Map a `-v` count onto a console configuration.
    pub fn from_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        Self {
            global_level: level.to_string(),
            detector_level: level.to_string(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if !VALID_LEVELS.contains(&self.global_level.as_str()) {
            return Err(format!(
                "Invalid global_level: {}. Must be one of: {:?}",
                self.global_level, VALID_LEVELS
            ));
        }

        if !VALID_LEVELS.contains(&self.detector_level.as_str()) {
            return Err(format!(
                "Invalid detector_level: {}. Must be one of: {:?}",
                self.detector_level, VALID_LEVELS
            ));
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// `EnvFilter` directive string for this configuration.
    pub fn filter_directive(&self) -> String {
        let krate = env!("CARGO_PKG_NAME").replace('-', "_");
        format!(
            "{krate}={},{krate}::detector={}",
            self.global_level, self.detector_level
        )
    }
}
