//! Configuration loading and management.
//!
//! Lookup order: explicit path (`--config` or `QUEST_GRAPH_CONFIG_PATH`),
//! `./.quest-graph/config.yaml`, `~/.quest-graph/config.yaml`, then defaults.
//! Environment variables are applied on top of whatever file was found.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::graph::moderation::DEFAULT_FLAG_THRESHOLD;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub addressing: AddressingConfig,

    #[serde(default)]
    pub moderation: ModerationConfig,
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".quest-graph/quests.db")
}

/// How node addresses are numbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressingMode {
    /// Per-quest, per-prefix counter stored with the quest.
    #[default]
    Counter,
    /// Count existing siblings at creation time.
    Scan,
}

impl AddressingMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "counter" => Some(AddressingMode::Counter),
            "scan" => Some(AddressingMode::Scan),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressingConfig {
    #[serde(default)]
    pub mode: AddressingMode,
}

/// Moderation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Flags needed to move an approved quest to `flagged`.
    #[serde(default = "default_flag_threshold")]
    pub flag_threshold: i32,

    /// Tag added to posts solved by a completion cascade.
    #[serde(default = "default_solved_tag")]
    pub solved_tag: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            flag_threshold: default_flag_threshold(),
            solved_tag: default_solved_tag(),
        }
    }
}

fn default_flag_threshold() -> i32 {
    DEFAULT_FLAG_THRESHOLD
}

fn default_solved_tag() -> String {
    "solved".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Candidate config files in lookup order.
    pub fn search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = explicit {
            paths.push(path.to_path_buf());
        } else if let Ok(path) = std::env::var("QUEST_GRAPH_CONFIG_PATH") {
            paths.push(PathBuf::from(path));
        }
        paths.push(PathBuf::from(".quest-graph/config.yaml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".quest-graph").join("config.yaml"));
        }
        paths
    }

    /// Load the first config file that exists, then apply environment overrides.
    ///
    /// A file that exists but fails to parse is an error; missing files are skipped.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for path in Self::search_paths(explicit) {
            if path.exists() {
                debug!(path = %path.display(), "Loading config");
                config = Self::load(&path)?;
                break;
            }
        }
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `QUEST_GRAPH_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(db_path) = std::env::var("QUEST_GRAPH_DB_PATH") {
            self.server.db_path = PathBuf::from(db_path);
        }

        if let Ok(value) = std::env::var("QUEST_GRAPH_FLAG_THRESHOLD") {
            self.moderation.flag_threshold =
                value.parse().map_err(|_| ConfigError::InvalidEnv {
                    var: "QUEST_GRAPH_FLAG_THRESHOLD",
                    value: value.clone(),
                })?;
        }

        if let Ok(value) = std::env::var("QUEST_GRAPH_ADDRESSING") {
            self.addressing.mode =
                AddressingMode::from_str(&value).ok_or_else(|| ConfigError::InvalidEnv {
                    var: "QUEST_GRAPH_ADDRESSING",
                    value: value.clone(),
                })?;
        }

        Ok(())
    }

    /// Ensure the database directory exists.
    pub fn ensure_db_dir(&self) -> std::io::Result<()> {
        if let Some(parent) = self.server.db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Settings the lifecycle layer needs from the config.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            addressing: self.addressing.mode,
            flag_threshold: self.moderation.flag_threshold,
            solved_tag: self.moderation.solved_tag.clone(),
        }
    }
}

/// Runtime knobs passed to the quest lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub addressing: AddressingMode,
    pub flag_threshold: i32,
    pub solved_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Config::default().engine()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.server.db_path, PathBuf::from(".quest-graph/quests.db"));
        assert_eq!(config.addressing.mode, AddressingMode::Counter);
        assert_eq!(config.moderation.flag_threshold, 3);
        assert_eq!(config.moderation.solved_tag, "solved");
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config: Config = serde_yaml::from_str(
            "addressing:\n  mode: scan\nmoderation:\n  flag_threshold: 5\n",
        )
        .unwrap();
        assert_eq!(config.addressing.mode, AddressingMode::Scan);
        assert_eq!(config.moderation.flag_threshold, 5);
        assert_eq!(config.moderation.solved_tag, "solved");
        assert_eq!(config.server.db_path, PathBuf::from(".quest-graph/quests.db"));
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "moderation: [not, a, map]").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("failed to parse"));
    }

    #[test]
    fn explicit_path_comes_first() {
        let paths = Config::search_paths(Some(Path::new("custom.yaml")));
        assert_eq!(paths[0], PathBuf::from("custom.yaml"));
        assert_eq!(paths[1], PathBuf::from(".quest-graph/config.yaml"));
    }
}
