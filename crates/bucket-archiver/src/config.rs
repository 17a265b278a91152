//! Configuration loading and validation.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ArchiverError, Result};

/// Bucket used when none is given on the command line or in a config file.
pub const DEFAULT_BUCKET: &str = "archive-demo-bucket";

/// Minimum multipart part size accepted by S3-compatible stores (5 MiB).
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

fn default_bucket() -> String {
    DEFAULT_BUCKET.to_string()
}

fn default_file_count() -> usize {
    2
}

fn default_rows_per_file() -> usize {
    100
}

fn default_archive_key() -> String {
    "demo.zip".to_string()
}

fn default_pipe_capacity() -> usize {
    16
}

fn default_get_prefetch() -> usize {
    4
}

fn default_part_size() -> usize {
    8 * 1024 * 1024
}

/// Top-level configuration for one archiver run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Destination bucket.
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Synthetic payload generation.
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Streaming pipeline tuning.
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Settings for synthetic CSV payload generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    /// Number of CSV payloads to generate.
    #[serde(default = "default_file_count")]
    pub file_count: usize,

    /// Rows per generated CSV payload.
    #[serde(default = "default_rows_per_file")]
    pub rows_per_file: usize,
}

/// Settings for the archive-and-upload pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Key the composed archive is uploaded under.
    #[serde(default = "default_archive_key")]
    pub archive_key: String,

    /// Conduit capacity in chunks between the encoder and the uploader.
    #[serde(default = "default_pipe_capacity")]
    pub pipe_capacity: usize,

    /// How many get streams may be opened ahead of the encoder.
    #[serde(default = "default_get_prefetch")]
    pub get_prefetch: usize,

    /// Multipart upload part size in bytes.
    #[serde(default = "default_part_size")]
    pub part_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            generator: GeneratorConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            file_count: default_file_count(),
            rows_per_file: default_rows_per_file(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_key: default_archive_key(),
            pipe_capacity: default_pipe_capacity(),
            get_prefetch: default_get_prefetch(),
            part_size: default_part_size(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ArchiverError::Config(format!(
                "cannot read config file {:?}: {}",
                path.as_ref(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.bucket.trim().is_empty() {
            return Err(ArchiverError::Config("bucket must not be empty".into()));
        }
        if self.pipeline.archive_key.trim().is_empty() {
            return Err(ArchiverError::Config(
                "pipeline.archive_key must not be empty".into(),
            ));
        }
        if self.pipeline.pipe_capacity == 0 {
            return Err(ArchiverError::Config(
                "pipeline.pipe_capacity must be at least 1".into(),
            ));
        }
        if self.pipeline.get_prefetch == 0 {
            return Err(ArchiverError::Config(
                "pipeline.get_prefetch must be at least 1".into(),
            ));
        }
        if self.pipeline.part_size < MIN_PART_SIZE {
            return Err(ArchiverError::Config(format!(
                "pipeline.part_size must be at least {} bytes",
                MIN_PART_SIZE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bucket, DEFAULT_BUCKET);
        assert_eq!(config.generator.file_count, 2);
        assert_eq!(config.generator.rows_per_file, 100);
        assert_eq!(config.pipeline.archive_key, "demo.zip");
        assert_eq!(config.pipeline.pipe_capacity, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let config = Config::from_yaml("bucket: my-bucket\n").unwrap();
        assert_eq!(config.bucket, "my-bucket");
        assert_eq!(config.generator.file_count, 2);
        assert_eq!(config.pipeline.archive_key, "demo.zip");
    }

    #[test]
    fn test_nested_yaml_overrides() {
        let yaml = "
bucket: b
generator:
  file_count: 7
pipeline:
  archive_key: out.zip
  pipe_capacity: 2
";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.generator.file_count, 7);
        assert_eq!(config.generator.rows_per_file, 100);
        assert_eq!(config.pipeline.archive_key, "out.zip");
        assert_eq!(config.pipeline.pipe_capacity, 2);
    }

    #[test]
    fn test_validation_rejects_empty_bucket() {
        let mut config = Config::default();
        config.bucket = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = Config::default();
        config.pipeline.pipe_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_small_part_size() {
        let mut config = Config::default();
        config.pipeline.part_size = 1024;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("part_size"));
    }
}
