//! Git auto-commit
//!
//! Shells out to the `git` binary. Callers treat failures as warnings: the
//! task files are already written when a commit is attempted.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Failed to run git: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Failed { command: String, stderr: String },
}

/// Records task file changes in version control
pub trait Committer {
    /// Stages written files and the paths they replaced
    fn stage(&self, paths: &[PathBuf], old_paths: &[PathBuf]) -> Result<(), GitError>;

    /// Commits what is staged; returns false when the commit was skipped
    fn commit(&self, message: &str) -> Result<bool, GitError>;
}

/// [`Committer`] backed by the `git` command line
pub struct GitCli {
    tasks_dir: PathBuf,
}

impl GitCli {
    pub fn new(tasks_dir: impl Into<PathBuf>) -> Self {
        Self {
            tasks_dir: absolute(tasks_dir.into()),
        }
    }

    fn run<I, S>(&self, args: I) -> Result<Output, GitError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<_> = args.into_iter().map(|a| a.as_ref().to_os_string()).collect();
        let output = Command::new("git")
            .args(&args)
            .current_dir(&self.tasks_dir)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            let command = args
                .first()
                .map(|a| a.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(GitError::Failed {
                command,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Files staged outside the task folder
    fn unrelated_staged(&self) -> Result<Vec<String>, GitError> {
        let output = self.run(["diff", "--cached", "--name-only", "--", ":/", ":(exclude)."])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .filter(|l| !l.is_empty())
            .collect())
    }
}

/// Git runs inside the task folder, so relative paths are resolved first
fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

impl Committer for GitCli {
    fn stage(&self, paths: &[PathBuf], old_paths: &[PathBuf]) -> Result<(), GitError> {
        let paths: Vec<PathBuf> = paths.iter().cloned().map(absolute).collect();
        let old_paths: Vec<PathBuf> = old_paths.iter().cloned().map(absolute).collect();

        if !paths.is_empty() {
            let mut args = vec![OsStr::new("add"), OsStr::new("--")];
            args.extend(paths.iter().map(|p| p.as_os_str()));
            self.run(args)?;
        }

        // removed files can only be staged through -A
        if !old_paths.is_empty() {
            let mut args = vec![OsStr::new("add"), OsStr::new("-A"), OsStr::new("--")];
            args.extend(old_paths.iter().map(|p| p.as_os_str()));
            self.run(args)?;
        }

        debug!(added = paths.len(), removed = old_paths.len(), "staged task files");
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<bool, GitError> {
        let unrelated = self.unrelated_staged()?;
        if !unrelated.is_empty() {
            info!(files = unrelated.len(), "other files are staged, skipping auto-commit");
            return Ok(false);
        }

        let staged = self.run(["diff", "--cached", "--quiet"]);
        if staged.is_ok() {
            debug!("nothing staged, skipping auto-commit");
            return Ok(false);
        }

        self.run(["commit", "--quiet", "-m", message])?;
        info!(%message, "committed task changes");
        Ok(true)
    }
}

/// Commits task changes under a fixed message prefix
///
/// Failures are logged and swallowed: the task files are already written.
pub struct AutoCommit<C = GitCli> {
    committer: C,
    prefix: String,
}

impl<C: Committer> AutoCommit<C> {
    pub fn new(committer: C, prefix: &str) -> Self {
        Self {
            committer,
            prefix: prefix.trim().to_string(),
        }
    }

    /// Stages `paths` (and the `old_paths` they replaced) and commits them
    pub fn record(&self, action: &str, subject: &str, paths: &[PathBuf], old_paths: &[PathBuf]) {
        if paths.is_empty() && old_paths.is_empty() {
            return;
        }

        let message = format!("{} {} {}", self.prefix, action, subject).trim().to_string();
        let result = self
            .committer
            .stage(paths, old_paths)
            .and_then(|()| self.committer.commit(&message));
        if let Err(e) = result {
            warn!(error = %e, %message, "auto-commit failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn git(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git").args(args).current_dir(dir).output().unwrap();
        assert!(out.status.success(), "git {:?}: {}", args, String::from_utf8_lossy(&out.stderr));
        String::from_utf8_lossy(&out.stdout).into_owned()
    }

    fn repo() -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        git(temp.path(), &["init", "--quiet"]);
        git(temp.path(), &["config", "user.email", "dev@example.com"]);
        git(temp.path(), &["config", "user.name", "Dev"]);
        git(temp.path(), &["config", "commit.gpgsign", "false"]);
        let tasks = temp.path().join(".backlog");
        fs::create_dir_all(&tasks).unwrap();
        (temp, tasks)
    }

    #[test]
    fn stages_and_commits_renames() {
        if !git_available() {
            return;
        }
        let (temp, tasks) = repo();
        let old = tasks.join("T1-old.md");
        fs::write(&old, "old").unwrap();

        let git_cli = GitCli::new(&tasks);
        git_cli.stage(&[old.clone()], &[]).unwrap();
        assert!(git_cli.commit("backlog: create T1").unwrap());

        let new = tasks.join("T1-new.md");
        fs::rename(&old, &new).unwrap();
        git_cli.stage(&[new], &[old]).unwrap();
        assert!(git_cli.commit("backlog: edit T1").unwrap());

        let log = git(temp.path(), &["log", "--format=%s"]);
        assert_eq!(log.lines().collect::<Vec<_>>(), vec!["backlog: edit T1", "backlog: create T1"]);
        let tracked = git(temp.path(), &["ls-files"]);
        assert_eq!(tracked.trim(), ".backlog/T1-new.md");
    }

    #[test]
    fn skips_when_unrelated_files_are_staged() {
        if !git_available() {
            return;
        }
        let (temp, tasks) = repo();
        fs::write(temp.path().join("README.md"), "hi").unwrap();
        git(temp.path(), &["add", "README.md"]);

        let task = tasks.join("T1-a.md");
        fs::write(&task, "a").unwrap();

        let git_cli = GitCli::new(&tasks);
        git_cli.stage(&[task], &[]).unwrap();
        assert!(!git_cli.commit("backlog: create T1").unwrap());
    }

    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        staged: RefCell<Vec<(Vec<PathBuf>, Vec<PathBuf>)>>,
        messages: RefCell<Vec<String>>,
        fail: bool,
    }

    impl Committer for &Recorder {
        fn stage(&self, paths: &[PathBuf], old_paths: &[PathBuf]) -> Result<(), GitError> {
            if self.fail {
                return Err(GitError::Failed {
                    command: "add".to_string(),
                    stderr: "not a git repository".to_string(),
                });
            }
            self.staged.borrow_mut().push((paths.to_vec(), old_paths.to_vec()));
            Ok(())
        }

        fn commit(&self, message: &str) -> Result<bool, GitError> {
            self.messages.borrow_mut().push(message.to_string());
            Ok(true)
        }
    }

    #[test]
    fn auto_commit_prefixes_message() {
        let recorder = Recorder::default();
        let commits = AutoCommit::new(&recorder, " backlog: ");

        commits.record("edit", "T1", &[PathBuf::from("T1-new.md")], &[PathBuf::from("T1-old.md")]);
        commits.record("edit", "T2", &[], &[]);

        assert_eq!(*recorder.messages.borrow(), vec!["backlog: edit T1"]);
        assert_eq!(recorder.staged.borrow()[0].1, vec![PathBuf::from("T1-old.md")]);
    }

    #[test]
    fn auto_commit_failure_is_not_fatal() {
        let recorder = Recorder {
            fail: true,
            ..Default::default()
        };
        AutoCommit::new(&recorder, "backlog:").record("create", "T1", &[PathBuf::from("T1-a.md")], &[]);
        assert!(recorder.messages.borrow().is_empty());
    }

    #[test]
    fn nothing_staged_is_skipped() {
        if !git_available() {
            return;
        }
        let (_temp, tasks) = repo();
        assert!(!GitCli::new(&tasks).commit("backlog: noop").unwrap());
    }
}
