//! Engine configuration
//!
//! Loaded from TOML; every field is optional:
//!
//! ```toml
//! sandbox_root = "templates"
//! max_include_depth = 16
//! max_include_bytes = 1048576
//! include_timeout_ms = 2000
//! max_nesting = 64
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::eval::EvalLimits;

/// Error type for configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Sandbox root is unusable: {0}")]
    SandboxRoot(std::io::Error),
}

/// Configuration options for an [`Engine`](crate::Engine)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory includes are resolved against; includes are refused without one
    pub sandbox_root: Option<PathBuf>,

    /// Maximum nesting of includes
    pub max_include_depth: usize,

    /// Maximum number of includes evaluated in one render
    pub max_includes: usize,

    /// Maximum size of a single included file
    pub max_include_bytes: u64,

    /// Read timeout for a single included file
    pub include_timeout_ms: u64,

    /// Maximum size of rendered output
    pub max_output_bytes: usize,

    /// Deepest `if` block or parenthesised condition in any template
    pub max_nesting: usize,

    /// Parsed templates kept in the cache; 0 disables caching
    pub cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = EvalLimits::default();
        Self {
            sandbox_root: None,
            max_include_depth: limits.max_include_depth,
            max_includes: limits.max_includes,
            max_include_bytes: 1024 * 1024,
            include_timeout_ms: 2000,
            max_output_bytes: limits.max_output_bytes,
            max_nesting: limits.max_nesting,
            cache_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file.
    ///
    /// A relative `sandbox_root` is taken relative to the file's directory.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;
        if let Some(dir) = path.parent() {
            config.sandbox_root = config
                .sandbox_root
                .take()
                .map(|root| if root.is_relative() { dir.join(root) } else { root });
        }
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Set the include sandbox root
    pub fn with_sandbox_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.sandbox_root = Some(root.into());
        self
    }

    /// Refuse all includes
    pub fn without_sandbox_root(mut self) -> Self {
        self.sandbox_root = None;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_max_includes(mut self, count: usize) -> Self {
        self.max_includes = count;
        self
    }

    pub fn with_max_include_bytes(mut self, bytes: u64) -> Self {
        self.max_include_bytes = bytes;
        self
    }

    pub fn with_include_timeout(mut self, timeout: Duration) -> Self {
        self.include_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_max_nesting(mut self, depth: usize) -> Self {
        self.max_nesting = depth;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn include_timeout(&self) -> Duration {
        Duration::from_millis(self.include_timeout_ms)
    }

    /// Evaluation limits derived from this configuration
    pub fn limits(&self) -> EvalLimits {
        EvalLimits {
            max_include_depth: self.max_include_depth,
            max_includes: self.max_includes,
            max_output_bytes: self.max_output_bytes,
            max_nesting: self.max_nesting,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.sandbox_root, None);
        assert_eq!(config.max_include_depth, 16);
        assert_eq!(config.max_include_bytes, 1024 * 1024);
        assert_eq!(config.include_timeout(), Duration::from_secs(2));
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.max_nesting, 64);
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::new()
            .with_sandbox_root("/srv/templates")
            .with_max_include_depth(4)
            .with_max_includes(10)
            .with_include_timeout(Duration::from_millis(250))
            .with_max_nesting(8)
            .with_cache_capacity(0);

        assert_eq!(config.sandbox_root, Some(PathBuf::from("/srv/templates")));
        assert_eq!(config.include_timeout_ms, 250);
        assert_eq!(
            config.limits(),
            EvalLimits {
                max_include_depth: 4,
                max_includes: 10,
                max_output_bytes: 8 * 1024 * 1024,
                max_nesting: 8,
            }
        );
        assert_eq!(config.without_sandbox_root().sandbox_root, None);
    }

    #[test]
    fn test_from_str_partial() {
        let config = EngineConfig::from_str(
            r#"
sandbox_root = "templates"
max_include_depth = 8
max_nesting = 32
"#,
        )
        .unwrap();
        assert_eq!(config.sandbox_root, Some(PathBuf::from("templates")));
        assert_eq!(config.max_include_depth, 8);
        assert_eq!(config.max_nesting, 32);
        assert_eq!(config.max_includes, 256);
    }

    #[test]
    fn test_from_str_empty_is_default() {
        assert_eq!(EngineConfig::from_str("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = EngineConfig::from_str("max_depth = 3").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_from_file_resolves_relative_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "sandbox_root = \"parts\"\n").unwrap();

        let config = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config.sandbox_root, Some(dir.path().join("parts")));
    }

    #[test]
    fn test_from_file_missing() {
        let err = EngineConfig::from_file(Path::new("/nonexistent/engine.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
