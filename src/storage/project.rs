//! Task folder management
//!
//! Handles `init` and hands out a [`TaskStore`] for an existing folder.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;

use super::config::CONFIG_FILE;
use super::{Config, TaskStore};

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("No task folder at {0}. Run 'backlog init' first.")]
    NotInitialized(PathBuf),
}

const DEFAULT_CONFIG: &str = r#"# backlog configuration

# Commit task files after each change
auto_commit = false

# Prefix for generated commit messages
commit_prefix = "backlog:"

# Strategy for 'backlog doctor --fix': chronological, auto-renumber or manual
default_strategy = "chronological"

# Sort keys for 'backlog task list' (id, title, status, priority, created, updated)
default_sort = "id"

# Tasks per page for 'backlog task list' (0 = no paging)
page_size = 0
"#;

/// An initialized task folder and its configuration
pub struct Project {
    dir: PathBuf,
    config: Config,
}

impl Project {
    /// Opens an existing task folder
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(ProjectError::NotInitialized(dir).into());
        }

        let config = Config::for_folder(&dir)?;
        Ok(Self { dir, config })
    }

    /// Creates the folder layout and a default config; existing files are kept
    pub fn init(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();

        let archive_dir = TaskStore::new(&dir).archive_dir();
        fs::create_dir_all(&archive_dir).with_context(|| {
            format!("Failed to create task folder: {}", archive_dir.display())
        })?;

        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            fs::write(&config_path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to write config: {}", config_path.display()))?;
        }

        tracing::info!(dir = %dir.display(), "initialized task folder");
        Self::open(dir)
    }

    /// Returns the task folder
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the task store for this folder
    pub fn task_store(&self) -> TaskStore {
        TaskStore::new(&self.dir)
    }
}
