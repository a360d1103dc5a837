use crate::embed::DEFAULT_MODEL;
use crate::error::RetrievalError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Project config file name, looked up in the project root.
pub const PROJECT_CONFIG_FILE: &str = "meeple.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Share of the fused score given to the lexical channel.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_pool")]
    pub kb: usize,
    #[serde(default = "default_pool")]
    pub kv: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            k: default_k(),
            kb: default_pool(),
            kv: default_pool(),
        }
    }
}

impl SearchConfig {
    /// Reject blend weights outside `[0, 1]` and empty result/pool sizes.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Configuration`] naming the offending field.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        validate_alpha(self.alpha)?;
        for (name, value) in [("k", self.k), ("kb", self.kb), ("kv", self.kv)] {
            if value == 0 {
                return Err(RetrievalError::configuration(format!(
                    "search.{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// Check that a blend weight lies in `[0, 1]`. NaN is rejected.
///
/// # Errors
///
/// Returns [`RetrievalError::Configuration`] when `alpha` is out of range.
pub fn validate_alpha(alpha: f64) -> Result<(), RetrievalError> {
    if (0.0..=1.0).contains(&alpha) {
        Ok(())
    } else {
        Err(RetrievalError::configuration(format!(
            "alpha must be within [0, 1], got {alpha}"
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_index_dir")]
    pub dir: PathBuf,
    /// Embedding model used when building a new index.
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dir: default_index_dir(),
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_trace_dir")]
    pub dir: PathBuf,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_trace_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
}

/// Load `meeple.toml` from `project_root`, falling back to defaults when the
/// file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read, parsed, or
/// validated.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(PROJECT_CONFIG_FILE);
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    parse_project_config(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// # Errors
///
/// Returns an error for invalid TOML or out-of-range `[search]` values.
pub fn parse_project_config(content: &str) -> Result<ProjectConfig> {
    let config = toml::from_str::<ProjectConfig>(content)?;
    config.search.validate()?;
    Ok(config)
}

/// Load `<config_dir>/meeple/config.toml`, or defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("meeple/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_alpha() -> f64 {
    0.5
}

const fn default_k() -> usize {
    10
}

const fn default_pool() -> usize {
    50
}

fn default_index_dir() -> PathBuf {
    PathBuf::from("indices")
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_trace_dir() -> PathBuf {
    PathBuf::from("traces")
}
