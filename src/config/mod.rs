//! Collector configuration (TOML)
//!
//! ```toml
//! [limits]
//! max_entry_bytes = 268435456    # 0 = unlimited
//! max_metadata_bytes = 16777216 # omitted: default, capped at max_entry_bytes
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use jarsig_verify::ReadLimits;

/// Default cap on a single content entry (256 MiB)
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 256 * 1024 * 1024;

/// Default cap on the manifest and each signature file or block (16 MiB)
pub const DEFAULT_MAX_METADATA_BYTES: u64 = 16 * 1024 * 1024;

/// Error types for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Read size limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Largest content entry payload in bytes (0 = no limit)
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,

    /// Largest manifest, signature file or signature block in bytes (0 = no limit)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_metadata_bytes: Option<u64>,
}

fn default_max_entry_bytes() -> u64 {
    DEFAULT_MAX_ENTRY_BYTES
}

impl LimitsConfig {
    /// Effective metadata limit.
    ///
    /// When unset, the default is capped at a non-zero entry limit.
    pub fn metadata_limit(&self) -> u64 {
        match self.max_metadata_bytes {
            Some(limit) => limit,
            None if self.max_entry_bytes > 0 => {
                DEFAULT_MAX_METADATA_BYTES.min(self.max_entry_bytes)
            }
            None => DEFAULT_MAX_METADATA_BYTES,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
            max_metadata_bytes: None,
        }
    }
}

/// Collector configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorConfig {
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl CollectorConfig {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse config from a TOML string
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: CollectorConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.limits;

        // Rule: an explicit metadata limit never exceeds the content limit
        if let Some(metadata) = limits.max_metadata_bytes {
            if limits.max_entry_bytes > 0 && (metadata == 0 || metadata > limits.max_entry_bytes) {
                return Err(ConfigError::ValidationError(format!(
                    "max_metadata_bytes ({}) must not exceed max_entry_bytes ({})",
                    metadata, limits.max_entry_bytes
                )));
            }
        }

        Ok(())
    }

    /// Limits for the archive reader
    pub fn read_limits(&self) -> ReadLimits {
        ReadLimits {
            max_entry_bytes: self.limits.max_entry_bytes,
            max_metadata_bytes: self.limits.metadata_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = CollectorConfig::from_toml_str("").unwrap();
        assert_eq!(config, CollectorConfig::default());
        assert_eq!(config.read_limits().max_entry_bytes, 268_435_456);
        assert_eq!(config.read_limits().max_metadata_bytes, 16_777_216);
    }

    #[test]
    fn test_partial_limits() {
        let toml = r#"
            [limits]
            max_entry_bytes = 1048576
        "#;

        let config = CollectorConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.limits.max_entry_bytes, 1_048_576);
        assert_eq!(config.limits.max_metadata_bytes, None);
        // Default metadata limit is capped at the smaller entry limit
        assert_eq!(config.read_limits().max_metadata_bytes, 1_048_576);
    }

    #[test]
    fn test_default_metadata_limit_below_large_entry_limit() {
        let toml = r#"
            [limits]
            max_entry_bytes = 1073741824
        "#;

        let limits = CollectorConfig::from_toml_str(toml).unwrap().read_limits();
        assert_eq!(limits.max_entry_bytes, 1_073_741_824);
        assert_eq!(limits.max_metadata_bytes, DEFAULT_MAX_METADATA_BYTES);
    }

    #[test]
    fn test_unlimited_entries_keep_default_metadata_limit() {
        let toml = r#"
            [limits]
            max_entry_bytes = 0
        "#;

        let limits = CollectorConfig::from_toml_str(toml).unwrap().read_limits();
        assert_eq!(limits.max_entry_bytes, 0);
        assert_eq!(limits.max_metadata_bytes, DEFAULT_MAX_METADATA_BYTES);
    }

    #[test]
    fn test_unlimited() {
        let toml = r#"
            [limits]
            max_entry_bytes = 0
            max_metadata_bytes = 0
        "#;

        let limits = CollectorConfig::from_toml_str(toml).unwrap().read_limits();
        assert_eq!(limits, ReadLimits::default());
    }

    #[test]
    fn test_reject_metadata_limit_above_entry_limit() {
        let toml = r#"
            [limits]
            max_entry_bytes = 1024
            max_metadata_bytes = 4096
        "#;

        let result = CollectorConfig::from_toml_str(toml);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
        assert!(result.unwrap_err().to_string().contains("max_metadata_bytes"));
    }

    #[test]
    fn test_reject_unlimited_metadata_with_entry_limit() {
        let toml = r#"
            [limits]
            max_entry_bytes = 1024
            max_metadata_bytes = 0
        "#;

        assert!(CollectorConfig::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_parse_error() {
        let result = CollectorConfig::from_toml_str("[limits\nmax_entry_bytes = 1");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[limits]\nmax_entry_bytes = 2048\nmax_metadata_bytes = 512").unwrap();

        let config = CollectorConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limits.max_entry_bytes, 2048);
        assert_eq!(config.limits.max_metadata_bytes, Some(512));
        assert_eq!(config.read_limits().max_metadata_bytes, 512);
    }

    #[test]
    fn test_missing_file() {
        let result = CollectorConfig::from_file(Path::new("/nonexistent/jarsig.toml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }
}
