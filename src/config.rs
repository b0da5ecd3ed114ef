//! Engine Configuration
//!
//! Provides hierarchical configuration loading from:
//! - latticeveil.toml (default configuration)
//! - latticeveil.local.toml (git-ignored local overrides)
//! - Environment variables (LATTICEVEIL_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # latticeveil.toml
//! [checker]
//! history_size = 200
//! snapshot_budget = 200000
//!
//! [suppression]
//! default_limit = 0.02
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! LATTICEVEIL_CHECKER__HISTORY_SIZE=500
//! LATTICEVEIL_SUPPRESSION__DEFAULT_LIMIT=0.05
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub checker: CheckerConfig,
    #[serde(default)]
    pub suppression: SuppressionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node checker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Number of checked nodes whose groupings are memoized before the
    /// history is cleared
    #[serde(default = "default_history_size")]
    pub history_size: usize,

    /// Upper bound on memoized rows across all history entries
    #[serde(default = "default_snapshot_budget")]
    pub snapshot_budget: usize,
}

/// Suppression defaults applied when a privacy configuration leaves the
/// outlier limit unset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionConfig {
    /// Fraction of rows that may be suppressed, in [0, 1]
    #[serde(default = "default_suppression_limit")]
    pub default_limit: f64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_history_size() -> usize {
    200
}
fn default_snapshot_budget() -> usize {
    200_000
}
fn default_suppression_limit() -> f64 {
    0.0
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for CheckerConfig {
    fn default() -> Self {
        CheckerConfig {
            history_size: default_history_size(),
            snapshot_budget: default_snapshot_budget(),
        }
    }
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        SuppressionConfig {
            default_limit: default_suppression_limit(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. latticeveil.toml (base configuration)
    /// 2. latticeveil.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (LATTICEVEIL_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("latticeveil.toml"))
            .merge(Toml::file("latticeveil.local.toml"))
            .merge(Env::prefixed("LATTICEVEIL_").split("__"))
            .extract()
    }

    /// Load configuration from a specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("LATTICEVEIL_").split("__"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.checker.history_size, 200);
        assert_eq!(config.checker.snapshot_budget, 200_000);
        assert_eq!(config.suppression.default_limit, 0.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string(&config).unwrap();

        assert!(toml_str.contains("[checker]"));
        assert!(toml_str.contains("[suppression]"));
        assert!(toml_str.contains("[logging]"));
    }
}
