//! Per-invocation state shared by command handlers

use std::path::PathBuf;

use anyhow::Result;

use crate::git::{AutoCommit, GitCli};
use crate::storage::{Config, Project, TaskStore};

/// An opened task folder plus the flags that affect mutations
pub struct Session {
    project: Project,
    commits: Option<AutoCommit>,
}

impl Session {
    /// Opens the folder; `auto_commit` overrides the project setting when given
    pub fn open(folder: PathBuf, auto_commit: Option<bool>) -> Result<Self> {
        let project = Project::open(folder)?;
        let enabled = auto_commit.unwrap_or(project.config().project.auto_commit);
        let commits = enabled.then(|| {
            AutoCommit::new(GitCli::new(project.dir()), &project.config().project.commit_prefix)
        });
        Ok(Self { project, commits })
    }

    pub fn store(&self) -> TaskStore {
        self.project.task_store()
    }

    pub fn config(&self) -> &Config {
        self.project.config()
    }

    /// Commits changed task files when auto-commit is on
    pub fn record(&self, action: &str, subject: &str, paths: &[PathBuf], old_paths: &[PathBuf]) {
        if let Some(commits) = &self.commits {
            commits.record(action, subject, paths, old_paths);
        }
    }

    /// Splits the session into the store and its auto-commit handle
    pub fn into_parts(self) -> (TaskStore, Option<AutoCommit>) {
        (self.project.task_store(), self.commits)
    }
}
