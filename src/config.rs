//! Configuration system
//!
//! Reads configuration from:
//! - `.lintel.yml` / `.lintel.yaml` / `.lintel.json` (project-level)
//! - the same names in the home directory (user-level)
//!
//! Every section rejects unknown keys. Rule entries collect their extra keys
//! as options, which the rule's typed options then validate.

use crate::diagnostic::Severity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default pass budget per source
pub const DEFAULT_MAX_ITERATIONS: usize = 200;

/// Configuration file names, in lookup order
pub const CONFIG_FILE_NAMES: [&str; 3] = [".lintel.yml", ".lintel.yaml", ".lintel.json"];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Unknown rule: {0}")]
    UnknownRule(String),

    #[error("Unknown rule group: {0}")]
    UnknownGroup(String),

    #[error("Invalid exclude pattern for {rule}: {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: globset::Error,
    },

    #[error("Invalid options for {rule}: {source}")]
    RuleOptions {
        rule: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Process sources in parallel
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,

    /// Maximum detect/correct passes per source
    pub max_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Settings shared by every rule of a group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GroupConfig {
    pub enabled: Option<bool>,
    pub severity: Option<Severity>,
}

/// Settings for one rule
///
/// Keys other than `enabled`, `severity` and `exclude` are rule options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    pub enabled: Option<bool>,
    pub severity: Option<Severity>,
    /// Glob patterns of paths the rule skips
    pub exclude: Vec<String>,
    #[serde(flatten)]
    pub options: serde_yaml::Mapping,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Engine settings
    pub engine: EngineConfig,

    /// Apply corrections
    pub autocorrect: bool,

    /// Group settings (group name -> settings)
    pub groups: BTreeMap<String, GroupConfig>,

    /// Rule settings (qualified or bare rule name -> settings)
    pub rules: BTreeMap<String, RuleConfig>,

    /// Run only these rules or groups
    #[serde(skip)]
    pub only: Vec<String>,

    /// Never run these rules or groups
    #[serde(skip)]
    pub except: Vec<String>,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        config.validate()?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Find a configuration file in `dir`
    pub fn find_in(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILE_NAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.is_file())
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        let candidates = [std::env::current_dir().ok(), dirs::home_dir()];
        for dir in candidates.iter().flatten() {
            if let Some(path) = Self::find_in(dir) {
                return Self::load(&path);
            }
        }

        log::debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Check values serde cannot
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.max_iterations == 0 {
            return Err(ConfigError::Invalid(
                "engine.max_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        autocorrect: Option<bool>,
        jobs: Option<usize>,
        max_iterations: Option<usize>,
        only: Vec<String>,
        except: Vec<String>,
    ) {
        if let Some(a) = autocorrect {
            self.autocorrect = a;
        }
        if let Some(j) = jobs {
            self.engine.jobs = j;
            if j == 1 {
                self.engine.parallel = false;
            }
        }
        if let Some(m) = max_iterations {
            self.engine.max_iterations = m;
        }
        self.only.extend(only);
        self.except.extend(except);
    }
}
