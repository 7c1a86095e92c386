//! File-backed task store
//!
//! One markdown file per task in the task folder, archived tasks under
//! `archived/`. The file name encodes the ID (see [`markdown::file_name`]),
//! so lookups and ID allocation only need a directory listing.
//!
//! Writes go through a temp file and a rename. There is no locking: one
//! process is assumed to own the folder for the length of a command.

use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use super::markdown::{self, CodecError};
use super::query::{self, ListParams, ListResult};
use crate::domain::{
    AcceptanceCriterion, DependencyGraph, GraphError, IdError, Patch, Priority, Status, Task, TaskId,
};

const ARCHIVE_DIR: &str = "archived";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("Parent task not found: {0}")]
    ParentNotFound(TaskId),

    #[error("Task {0} is already archived")]
    AlreadyArchived(TaskId),

    #[error("Malformed task file {}: {reason}", path.display())]
    MalformedFile { path: PathBuf, reason: String },

    #[error(transparent)]
    Id(#[from] IdError),

    #[error(transparent)]
    Dependency(#[from] GraphError),

    #[error("Task {0} cannot be its own parent")]
    SelfParent(TaskId),

    #[error("Acceptance criterion #{0} does not exist")]
    CriterionNotFound(usize),

    #[error("Task {0} already exists")]
    AlreadyExists(TaskId),

    #[error("Failed to serialize task {id}: {source}")]
    Encode {
        id: TaskId,
        #[source]
        source: CodecError,
    },

    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io {
        action,
        path,
        source,
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Input for [`TaskStore::create`]
#[derive(Debug, Clone, Default)]
pub struct CreateParams {
    pub title: String,
    pub description: String,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub parent: Option<TaskId>,
    pub assigned: Vec<String>,
    pub labels: Vec<String>,
    pub dependencies: Vec<TaskId>,
    pub acceptance_criteria: Vec<String>,
    pub plan: String,
    pub notes: String,
}

/// Partial update for [`TaskStore::update`]
///
/// Criteria changes are applied as remove, check, uncheck, add; indices are
/// 1-based and refer to the list as it stands at that step.
#[derive(Debug, Clone, Default)]
pub struct UpdateParams {
    pub title: Patch<String>,
    pub description: Patch<String>,
    pub status: Patch<Status>,
    pub priority: Patch<Priority>,
    pub parent: Patch<Option<TaskId>>,
    pub dependencies: Patch<Vec<TaskId>>,
    pub add_assigned: Vec<String>,
    pub remove_assigned: Vec<String>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    pub notes: Patch<String>,
    pub append_notes: Vec<String>,
    pub plan: Patch<String>,
    pub remove_criteria: Vec<usize>,
    pub check_criteria: Vec<usize>,
    pub uncheck_criteria: Vec<usize>,
    pub add_criteria: Vec<String>,
}

/// Store for tasks as markdown files
#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    /// Creates a store over the given task folder
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the task folder
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the folder holding archived tasks
    pub fn archive_dir(&self) -> PathBuf {
        self.dir.join(ARCHIVE_DIR)
    }

    /// Canonical path of an active task
    pub fn path(&self, task: &Task) -> PathBuf {
        self.dir.join(markdown::file_name(task))
    }

    /// Canonical path of an archived task
    pub fn archived_path(&self, task: &Task) -> PathBuf {
        self.archive_dir().join(markdown::file_name(task))
    }

    /// Lists task files in `dir` with the ID encoded in their names, sorted by path
    fn indexed(&self, dir: &Path) -> StoreResult<Vec<(TaskId, PathBuf)>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_error("read directory", dir))? {
            let entry = entry.map_err(io_error("read directory", dir))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(id) = markdown::id_from_file_name(name) {
                files.push((id, path));
            }
        }

        files.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(files)
    }

    /// Active task files, sorted by path
    pub fn task_files(&self) -> StoreResult<Vec<PathBuf>> {
        Ok(self.indexed(&self.dir)?.into_iter().map(|(_, p)| p).collect())
    }

    /// Every ID present in a file name, active or archived
    ///
    /// Archived IDs stay taken so an ID is never handed out twice.
    pub fn used_ids(&self) -> StoreResult<BTreeSet<TaskId>> {
        let mut ids: BTreeSet<TaskId> = self.indexed(&self.dir)?.into_iter().map(|(id, _)| id).collect();
        ids.extend(self.indexed(&self.archive_dir())?.into_iter().map(|(id, _)| id));
        Ok(ids)
    }

    /// Allocates the next free ID under `scope` (the root scope for top-level tasks)
    ///
    /// IDs in `reserved` count as taken; callers planning several allocations
    /// at once pass the IDs they already handed out.
    pub fn next_id(&self, scope: &TaskId, reserved: &BTreeSet<TaskId>) -> StoreResult<TaskId> {
        let used = self.used_ids()?;
        let last = used
            .iter()
            .chain(reserved.iter())
            .filter(|id| scope.is_parent_of(id))
            .max();

        let id = scope.next_child(last)?;
        debug!(scope = %scope, id = %id, "allocated task ID");
        Ok(id)
    }

    /// Reads and parses a single task file
    ///
    /// Content that is not UTF-8 counts as malformed, like a bad header.
    pub fn read_file(&self, path: &Path) -> StoreResult<Task> {
        let bytes = fs::read(path).map_err(io_error("read task file", path))?;
        let malformed = |reason: String| StoreError::MalformedFile {
            path: path.to_path_buf(),
            reason,
        };
        let content = String::from_utf8(bytes).map_err(|e| malformed(e.to_string()))?;
        markdown::parse(&content).map_err(|e| malformed(e.to_string()))
    }

    /// Writes a task to its canonical path atomically (temp file + rename)
    pub fn write(&self, task: &Task) -> StoreResult<PathBuf> {
        let path = self.path(task);
        self.write_to(task, &path)?;
        Ok(path)
    }

    fn write_to(&self, task: &Task, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error("create directory", parent))?;
        }

        let content = markdown::render(task).map_err(|source| StoreError::Encode {
            id: task.id.clone(),
            source,
        })?;

        let temp_path = path.with_extension("md.tmp");
        fs::write(&temp_path, content).map_err(io_error("write temp file", &temp_path))?;
        fs::rename(&temp_path, path).map_err(io_error("rename temp file to", path))?;
        Ok(())
    }

    /// Removes a task file
    pub fn remove_file(&self, path: &Path) -> StoreResult<()> {
        fs::remove_file(path).map_err(io_error("remove task file", path))
    }

    /// Path of the active file for `id`
    ///
    /// With duplicate IDs the lexicographically first path wins; the
    /// conflict itself is reported by the detector, not here.
    pub fn find(&self, id: &TaskId) -> StoreResult<Option<PathBuf>> {
        let mut matches = self
            .indexed(&self.dir)?
            .into_iter()
            .filter(|(file_id, _)| file_id == id)
            .map(|(_, path)| path);

        let first = matches.next();
        let others = matches.count();
        if others > 0 {
            debug!(id = %id, duplicates = others + 1, "duplicate ID, using first path");
        }
        Ok(first)
    }

    /// Returns true if an active task has this ID
    pub fn exists(&self, id: &TaskId) -> StoreResult<bool> {
        Ok(self.find(id)?.is_some())
    }

    /// Looks up a task by ID string, accepting shorthand like `3` or `1.2`
    pub fn get(&self, id_or_partial: &str) -> StoreResult<Task> {
        let id: TaskId = id_or_partial.parse()?;
        self.get_by_id(&id)
    }

    /// Looks up a task by ID
    pub fn get_by_id(&self, id: &TaskId) -> StoreResult<Task> {
        let path = self
            .find(id)?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.read_file(&path)
    }

    /// Loads every active task; a malformed file is an error
    pub fn load_all(&self) -> StoreResult<Vec<Task>> {
        self.task_files()?
            .iter()
            .map(|path| self.read_file(path))
            .collect()
    }

    /// Creates a task, allocating its ID from the parent's scope
    pub fn create(&self, params: CreateParams) -> StoreResult<Task> {
        if let Some(parent) = &params.parent {
            if !self.exists(parent)? {
                return Err(StoreError::ParentNotFound(parent.clone()));
            }
        }
        for dep in &params.dependencies {
            if !self.exists(dep)? {
                return Err(StoreError::NotFound(dep.to_string()));
            }
        }

        let scope = params.parent.clone().unwrap_or_default();
        let id = self.next_id(&scope, &BTreeSet::new())?;
        let now = Utc::now();

        let mut task = Task::new(id, params.title.trim(), now);
        task.description = params.description.trim().to_string();
        task.status = params.status.unwrap_or_default();
        task.priority = params.priority.unwrap_or_default();
        task.parent = params.parent;
        task.assigned = clean_list(params.assigned);
        task.labels = clean_list(params.labels);
        task.dependencies = dedup(params.dependencies);
        task.acceptance_criteria = params
            .acceptance_criteria
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(AcceptanceCriterion::new)
            .collect();
        task.plan = params.plan.trim().to_string();
        task.notes = params.notes.trim().to_string();
        task.record("created", now);

        let path = self.write(&task)?;
        info!(id = %task.id, path = %path.display(), "created task");
        Ok(task)
    }

    /// Applies a partial update
    ///
    /// The ID never changes here, even when the parent does. A title change
    /// moves the file: the new file is written before the old one is removed.
    pub fn update(&self, task: &Task, params: UpdateParams) -> StoreResult<Task> {
        let old_path = match self.path(task) {
            p if p.is_file() => p,
            _ => self
                .find(&task.id)?
                .ok_or_else(|| StoreError::NotFound(task.id.to_string()))?,
        };

        let mut updated = task.clone();
        let mut changes: Vec<String> = Vec::new();

        if let Patch::Set(title) = params.title {
            let title = title.trim().to_string();
            if title != updated.title {
                changes.push(format!("title: {:?} -> {:?}", updated.title, title));
                updated.title = title;
            }
        }

        if let Patch::Set(description) = params.description {
            let description = description.trim().to_string();
            if description != updated.description {
                changes.push("description updated".to_string());
                updated.description = description;
            }
        }

        if let Patch::Set(status) = params.status {
            if status != updated.status {
                changes.push(format!("status: {} -> {}", updated.status, status));
                updated.status = status;
            }
        }

        if let Patch::Set(priority) = params.priority {
            if priority != updated.priority {
                changes.push(format!("priority: {} -> {}", updated.priority, priority));
                updated.priority = priority;
            }
        }

        if let Patch::Set(parent) = params.parent {
            if let Some(p) = &parent {
                if p == &updated.id {
                    return Err(StoreError::SelfParent(p.clone()));
                }
                if !self.exists(p)? {
                    return Err(StoreError::ParentNotFound(p.clone()));
                }
            }
            if parent != updated.parent {
                changes.push(format!(
                    "parent: {} -> {}",
                    display_opt(&updated.parent),
                    display_opt(&parent)
                ));
                updated.parent = parent;
            }
        }

        if let Patch::Set(deps) = params.dependencies {
            let deps = dedup(deps);
            if deps != updated.dependencies {
                self.check_dependencies(&updated.id, &deps)?;
                changes.push(format!("dependencies: {}", join_ids(&deps)));
                updated.dependencies = deps;
            }
        }

        if apply_list(&mut updated.assigned, params.add_assigned, &params.remove_assigned) {
            changes.push(format!("assigned: {}", updated.assigned.join(", ")));
        }

        if apply_list(&mut updated.labels, params.add_labels, &params.remove_labels) {
            changes.push(format!("labels: {}", updated.labels.join(", ")));
        }

        if let Patch::Set(notes) = params.notes {
            let notes = notes.trim().to_string();
            if notes != updated.notes {
                changes.push("notes updated".to_string());
                updated.notes = notes;
            }
        }

        for extra in params.append_notes {
            let extra = extra.trim();
            if extra.is_empty() {
                continue;
            }
            if updated.notes.is_empty() {
                updated.notes = extra.to_string();
            } else {
                updated.notes = format!("{}\n{}", updated.notes, extra);
            }
            changes.push("notes appended".to_string());
        }

        if let Patch::Set(plan) = params.plan {
            let plan = plan.trim().to_string();
            if plan != updated.plan {
                changes.push("plan updated".to_string());
                updated.plan = plan;
            }
        }

        let criteria = &mut updated.acceptance_criteria;

        let mut removals = params.remove_criteria.clone();
        removals.sort_unstable();
        removals.dedup();
        for &index in removals.iter().rev() {
            if index == 0 || index > criteria.len() {
                return Err(StoreError::CriterionNotFound(index));
            }
            criteria.remove(index - 1);
            changes.push(format!("criterion #{} removed", index));
        }

        for (indices, checked) in [(&params.check_criteria, true), (&params.uncheck_criteria, false)] {
            for &index in indices {
                let ac = index
                    .checked_sub(1)
                    .and_then(|i| criteria.get_mut(i))
                    .ok_or(StoreError::CriterionNotFound(index))?;
                if ac.checked != checked {
                    ac.checked = checked;
                    let verb = if checked { "checked" } else { "unchecked" };
                    changes.push(format!("criterion #{} {}", index, verb));
                }
            }
        }

        for text in params.add_criteria {
            let text = text.trim();
            if !text.is_empty() {
                criteria.push(AcceptanceCriterion::new(text));
                changes.push(format!("criterion added: {}", text));
            }
        }

        if changes.is_empty() {
            debug!(id = %updated.id, "update had no effect");
            return Ok(updated);
        }

        let now = Utc::now();
        for change in &changes {
            updated.record(change.clone(), now);
        }

        let new_path = self.write(&updated)?;
        if new_path != old_path {
            self.remove_file(&old_path)?;
        }

        info!(id = %updated.id, changes = changes.len(), path = %new_path.display(), "updated task");
        Ok(updated)
    }

    /// Refuses unknown dependencies and edges that would close a cycle
    fn check_dependencies(&self, id: &TaskId, deps: &[TaskId]) -> StoreResult<()> {
        let tasks = self.load_all()?;
        let mut graph = DependencyGraph::from_tasks(&tasks);
        graph.clear_dependencies(id);

        for dep in deps {
            if !graph.contains(dep) {
                return Err(StoreError::NotFound(dep.to_string()));
            }
            graph.add_dependency(id, dep)?;
        }
        Ok(())
    }

    /// Moves a task into the archive and marks it archived
    pub fn archive(&self, id: &TaskId) -> StoreResult<PathBuf> {
        let Some(old_path) = self.find(id)? else {
            let archived = self
                .indexed(&self.archive_dir())?
                .into_iter()
                .any(|(file_id, _)| &file_id == id);
            return Err(if archived {
                StoreError::AlreadyArchived(id.clone())
            } else {
                StoreError::NotFound(id.to_string())
            });
        };

        let mut task = self.read_file(&old_path)?;
        let previous = task.status;
        task.status = Status::Archived;
        task.record(format!("archived (was {})", previous), Utc::now());

        let new_path = self.archived_path(&task);
        self.write_to(&task, &new_path)?;
        self.remove_file(&old_path)?;

        info!(id = %id, path = %new_path.display(), "archived task");
        Ok(new_path)
    }

    /// Lists active tasks
    pub fn list(&self, params: &ListParams) -> StoreResult<ListResult> {
        Ok(query::apply(self.load_all()?, params))
    }

    /// Lists active tasks whose text contains `query` (case-insensitive)
    pub fn search(&self, query: &str, params: &ListParams) -> StoreResult<ListResult> {
        let matches = self
            .load_all()?
            .into_iter()
            .filter(|t| query::matches_query(t, query))
            .collect();
        Ok(query::apply(matches, params))
    }
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !out.iter().any(|o| o == item) {
            out.push(item.to_string());
        }
    }
    out
}

fn dedup(ids: Vec<TaskId>) -> Vec<TaskId> {
    let mut out: Vec<TaskId> = Vec::with_capacity(ids.len());
    for id in ids {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Adds then removes values; returns true if the list changed
fn apply_list(list: &mut Vec<String>, add: Vec<String>, remove: &[String]) -> bool {
    let before = list.clone();
    let mut merged = std::mem::take(list);
    merged.extend(add);
    *list = clean_list(merged);
    list.retain(|v| !remove.iter().any(|r| r.trim() == v));
    *list != before
}

fn display_opt(id: &Option<TaskId>) -> String {
    id.as_ref().map(|i| i.to_string()).unwrap_or_else(|| "none".to_string())
}

fn join_ids(ids: &[TaskId]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}
