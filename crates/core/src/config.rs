//! TOML-based configuration for the Concord engine.
//!
//! The engine is a library; configuration covers the storage location and
//! history pagination limits used by the embedding process.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Engine configuration loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory for persistent data (the SQLite database).
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// History pagination settings.
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Pagination defaults and caps for history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Page size used when the caller does not specify one.
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    /// Hard cap applied to caller-supplied page sizes.
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/concord")
}
fn default_log_level() -> String {
    "info".into()
}
fn default_page_size() -> u32 {
    20
}
fn default_max_page_size() -> u32 {
    200
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            history: HistoryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        info!(path = %path.display(), "loading engine configuration");

        let raw = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        debug!("engine configuration loaded");
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.default_page_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "history.default_page_size".into(),
                detail: "must be > 0".into(),
            });
        }
        if self.history.max_page_size < self.history.default_page_size {
            return Err(ConfigError::InvalidValue {
                field: "history.max_page_size".into(),
                detail: "must be >= history.default_page_size".into(),
            });
        }
        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "log_level".into(),
                    detail: format!("unknown level '{other}'"),
                });
            }
        }
        Ok(())
    }
}

impl HistoryConfig {
    /// Clamp a caller-supplied page to the configured bounds.
    pub fn clamp(&self, page: crate::models::Page) -> crate::models::Page {
        crate::models::Page {
            limit: if page.limit == 0 {
                self.default_page_size
            } else {
                page.limit.min(self.max_page_size)
            },
            offset: page.offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Page;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.history.default_page_size, 20);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concord.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
data_dir = "/tmp/concord-test"
log_level = "debug"

[history]
default_page_size = 50
max_page_size = 100
"#
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.history.default_page_size, 50);
        assert_eq!(config.data_dir, PathBuf::from("/tmp/concord-test"));
    }

    #[test]
    fn test_missing_file() {
        let result = EngineConfig::load("/nonexistent/concord.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig::default();
        config.history.default_page_size = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.history.max_page_size = 1;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.log_level = "verbose".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_page_clamping() {
        let history = HistoryConfig::default();
        assert_eq!(history.clamp(Page { limit: 0, offset: 5 }).limit, 20);
        assert_eq!(history.clamp(Page { limit: 999, offset: 0 }).limit, 200);
        assert_eq!(history.clamp(Page { limit: 10, offset: 0 }).limit, 10);
    }
}
