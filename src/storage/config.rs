//! Configuration handling for backlog
//!
//! Project settings live in `<task folder>/config.toml`, user settings in
//! the platform config directory (`~/.config/backlog/config.toml` on Linux).
//! Both files are optional and every field has a default.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Strategy;

/// Name of the project config file inside the task folder
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// Project-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// Commit task files after each mutating command
    pub auto_commit: bool,

    /// Prefix for generated commit messages
    pub commit_prefix: String,

    /// Strategy used by `doctor --fix` when none is given
    pub default_strategy: Strategy,

    /// Comma separated sort keys for `task list`
    pub default_sort: String,

    /// Page size for `task list`; 0 lists everything
    pub page_size: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            auto_commit: false,
            commit_prefix: "backlog:".to_string(),
            default_strategy: Strategy::Chronological,
            default_sort: "id".to_string(),
            page_size: 0,
        }
    }
}

impl ProjectConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.commit_prefix.contains('\n') {
            return Err(ConfigError::Invalid(
                "commit_prefix must be a single line".to_string(),
            ));
        }
        Ok(())
    }
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Global user configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,
}

/// Combined configuration (global + project)
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub global: GlobalConfig,
    pub tasks_dir: PathBuf,
}

impl Config {
    /// Loads configuration for a task folder
    ///
    /// A missing folder or file yields defaults; `init` creates them.
    pub fn for_folder(tasks_dir: &Path) -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project_config(tasks_dir)?;

        Ok(Self {
            project,
            global,
            tasks_dir: tasks_dir.to_path_buf(),
        })
    }

    /// Returns the global config directory
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "backlog", "backlog").map(|dirs| dirs.config_dir().to_path_buf())
    }

    fn load_global() -> Result<GlobalConfig> {
        let Some(config_dir) = Self::global_config_dir() else {
            return Ok(GlobalConfig::default());
        };

        let config_path = config_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(GlobalConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read global config: {}", config_path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse global config")
    }

    fn load_project_config(tasks_dir: &Path) -> Result<ProjectConfig> {
        let config_path = tasks_dir.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(ProjectConfig::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read project config: {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse project config")?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the project configuration into the task folder
    pub fn save_project(&self) -> Result<()> {
        let config_path = self.tasks_dir.join(CONFIG_FILE);

        let content =
            toml::to_string_pretty(&self.project).context("Failed to serialize project config")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write project config: {}", config_path.display()))
    }
}
