//! Global configuration (`global.toml`).
//!
//! ```toml
//! [package_id]
//! default_unknown_mode = "semver_mode"
//!
//! [resolver]
//! max_concurrent_queries = 8
//! ```

use std::fs;
use std::path::Path;

use kiln_schema::PackageIdMode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KilnConfig {
    pub package_id: PackageIdConfig,
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageIdConfig {
    /// How dependencies contribute to the package ID of their dependents.
    pub default_unknown_mode: PackageIdMode,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upper bound on nodes whose binaries are looked up at the same time.
    pub max_concurrent_queries: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent_queries: 8,
        }
    }
}

impl KilnConfig {
    /// Load the global configuration, falling back to defaults when no file exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        match crate::paths::config_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` or `ConfigError::Parse`.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` on malformed TOML or unknown modes.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn with_mode(mut self, mode: PackageIdMode) -> Self {
        self.package_id.default_unknown_mode = mode;
        self
    }

    /// Concurrency bound, never below one.
    pub fn max_concurrent_queries(&self) -> usize {
        self.resolver.max_concurrent_queries.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_uses_defaults() {
        let config = KilnConfig::parse("").unwrap();
        assert_eq!(config.package_id.default_unknown_mode, PackageIdMode::Semver);
        assert_eq!(config.max_concurrent_queries(), 8);
    }

    #[test]
    fn parse_mode_and_concurrency() {
        let config = KilnConfig::parse(
            "[package_id]\ndefault_unknown_mode = \"full_package_mode\"\n\n[resolver]\nmax_concurrent_queries = 0\n",
        )
        .unwrap();
        assert_eq!(
            config.package_id.default_unknown_mode,
            PackageIdMode::FullPackage
        );
        assert_eq!(config.max_concurrent_queries(), 1);
    }

    #[test]
    fn unknown_mode_is_rejected() {
        let err = KilnConfig::parse("[package_id]\ndefault_unknown_mode = \"loose\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[package_id]\ndefault_unknown_mode = \"minor_mode\"").unwrap();
        let config = KilnConfig::from_file(file.path()).unwrap();
        assert_eq!(config.package_id.default_unknown_mode, PackageIdMode::Minor);
    }
}
