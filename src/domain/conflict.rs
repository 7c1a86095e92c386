//! Conflict and resolution plan types
//!
//! Pure data: detection lives in [`crate::conflict::ConflictDetector`] and
//! execution in [`crate::conflict::ConflictResolver`]. Everything here is
//! serializable so the CLI can emit it as JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use super::id::TaskId;

/// Kind of structural problem in a task folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Several files declare the same ID
    DuplicateId,
    /// A task's declared parent does not exist
    OrphanedChild,
    /// A task's declared parent disagrees with its dotted ID
    InvalidHierarchy,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::DuplicateId => "duplicate_id",
            ConflictKind::OrphanedChild => "orphaned_child",
            ConflictKind::InvalidHierarchy => "invalid_hierarchy",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A detected conflict
///
/// `files` holds every implicated path: two or more for duplicates, exactly
/// one otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    pub conflict_id: TaskId,
    pub files: Vec<PathBuf>,
    pub description: String,
}

/// Conflict counts, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub total: usize,
    pub duplicate_ids: usize,
    pub orphaned_children: usize,
    pub invalid_hierarchy: usize,
    pub by_kind: BTreeMap<ConflictKind, Vec<Conflict>>,
}

impl ConflictSummary {
    /// Aggregates conflicts without touching the filesystem
    pub fn from_conflicts(conflicts: &[Conflict]) -> Self {
        let mut summary = Self {
            total: conflicts.len(),
            ..Self::default()
        };

        for conflict in conflicts {
            match conflict.kind {
                ConflictKind::DuplicateId => summary.duplicate_ids += 1,
                ConflictKind::OrphanedChild => summary.orphaned_children += 1,
                ConflictKind::InvalidHierarchy => summary.invalid_hierarchy += 1,
            }
            summary
                .by_kind
                .entry(conflict.kind)
                .or_default()
                .push(conflict.clone());
        }

        summary
    }

    pub fn is_clean(&self) -> bool {
        self.total == 0
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Invalid resolution strategy '{0}': expected chronological, auto or manual")]
pub struct InvalidStrategy(pub String);

/// Policy for turning conflicts into actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Oldest duplicate keeps the ID; structural problems go to a human
    #[default]
    Chronological,
    /// First path keeps the ID; structural problems are repaired when possible
    AutoRenumber,
    /// Report only
    Manual,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Chronological => "chronological",
            Strategy::AutoRenumber => "auto-renumber",
            Strategy::Manual => "manual",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = InvalidStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "chronological" => Ok(Strategy::Chronological),
            "auto" | "auto-renumber" | "autorenumber" => Ok(Strategy::AutoRenumber),
            "manual" => Ok(Strategy::Manual),
            _ => Err(InvalidStrategy(s.to_string())),
        }
    }
}

/// What an action does when executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Move the task to `new_id` and rewrite references to the old ID
    Rename,
    /// Set the task's declared parent to `new_parent` (none detaches it)
    Reparent,
    /// Needs a human; never mutates anything
    Manual,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ActionKind::Rename => "rename",
            ActionKind::Reparent => "reparent",
            ActionKind::Manual => "manual",
        })
    }
}

/// One step of a resolution plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    pub description: String,
    pub original_id: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_parent: Option<TaskId>,
    pub file_path: PathBuf,
}

impl Action {
    pub fn rename(original_id: TaskId, new_id: TaskId, file_path: PathBuf, reason: &str) -> Self {
        Self {
            kind: ActionKind::Rename,
            description: format!("Renumber {} to {}: {}", original_id, new_id, reason),
            original_id,
            new_id: Some(new_id),
            new_parent: None,
            file_path,
        }
    }

    pub fn reparent(original_id: TaskId, new_parent: Option<TaskId>, file_path: PathBuf) -> Self {
        let description = match &new_parent {
            Some(parent) => format!("Set parent of {} to {}", original_id, parent),
            None => format!("Detach {} to the root level", original_id),
        };
        Self {
            kind: ActionKind::Reparent,
            description,
            original_id,
            new_id: None,
            new_parent,
            file_path,
        }
    }

    pub fn manual(conflict: &Conflict, file_path: PathBuf) -> Self {
        Self {
            kind: ActionKind::Manual,
            description: conflict.description.clone(),
            original_id: conflict.conflict_id.clone(),
            new_id: None,
            new_parent: None,
            file_path,
        }
    }
}

/// Ordered list of repair actions for one conflict snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    pub strategy: Strategy,
    pub summary: String,
    pub actions: Vec<Action>,
}

impl ResolutionPlan {
    /// Number of actions of the given kind
    pub fn count(&self, kind: ActionKind) -> usize {
        self.actions.iter().filter(|a| a.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// True when executing the plan cannot change any file
    pub fn is_manual_only(&self) -> bool {
        self.actions.iter().all(|a| a.kind == ActionKind::Manual)
    }
}
