//! Batch configuration
//!
//! Every field is optional in the TOML file; missing values fall back to
//! [`BatchConfig::default`]. Command-line options override the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ResampleError, Result};

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "batch-resampler.toml";

/// Output root directory name under the user's home
pub const DEFAULT_OUTPUT_DIR: &str = "batch_resampled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ResampleError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ResampleError::Config(format!("unknown log format {:?}", other))),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Batch configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Directory tree to convert
    pub input_root: PathBuf,
    /// Where the mirrored tree of converted files goes
    pub output_root: PathBuf,
    pub logging: LoggingConfig,
    /// Write a JSON summary here after the run
    pub report: Option<PathBuf>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            input_root: PathBuf::from("."),
            output_root: default_output_root(),
            logging: LoggingConfig::default(),
            report: None,
        }
    }
}

impl BatchConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ResampleError::Config(format!("{:?}: {}", path, e)))?;
        toml::from_str(&content).map_err(|e| ResampleError::Config(format!("{:?}: {}", path, e)))
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ResampleError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// `~/batch_resampled`, or a relative `batch_resampled` when there is no home
pub fn default_output_root() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| dirs.home_dir().join(DEFAULT_OUTPUT_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}
