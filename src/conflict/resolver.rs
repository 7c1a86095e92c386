//! Resolution planning and execution
//!
//! Planning is read-only apart from loading the implicated files. Execution
//! is best-effort: each action is applied in plan order and a failure stops
//! the run with earlier actions left in place.

use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{Action, ActionKind, Conflict, ConflictKind, ResolutionPlan, Strategy, Task, TaskId};
use crate::storage::{StoreError, TaskStore};

const DRY_RUN_PREFIX: &str = "[dry-run]";

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{} now declares {found}, expected {expected}", path.display())]
    Stale {
        path: PathBuf,
        expected: TaskId,
        found: TaskId,
    },

    #[error("Cannot rename to {0}: the ID is already in use")]
    IdInUse(TaskId),

    #[error("Rename of {0} has no target ID")]
    MissingTarget(TaskId),
}

/// A plan run that stopped partway
///
/// `completed` holds the result lines of the actions that were applied
/// before the failing one; those changes are not rolled back.
#[derive(Debug, Error)]
#[error("Action {} failed after {} completed: {source}", .index + 1, .completed.len())]
pub struct ExecutionError {
    /// Zero-based position of the failing action in the plan
    pub index: usize,
    pub completed: Vec<String>,
    #[source]
    pub source: ResolveError,
}

/// Turns conflicts into plans and applies them
pub struct ConflictResolver<'a> {
    store: &'a TaskStore,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(store: &'a TaskStore) -> Self {
        Self { store }
    }

    /// Computes the actions that resolve `conflicts` under `strategy`
    ///
    /// IDs handed out by the plan are reserved across the whole plan, so two
    /// renames never share a target. Each file is acted on by at most one
    /// conflict; a renamed duplicate with a bad parent gets its parent fixed
    /// right after the rename.
    pub fn create_resolution_plan(
        &self,
        conflicts: &[Conflict],
        strategy: Strategy,
    ) -> Result<ResolutionPlan, ResolveError> {
        let mut planner = Planner {
            store: self.store,
            strategy,
            reserved: BTreeSet::new(),
            misplaced: conflicts
                .iter()
                .filter(|c| c.kind != ConflictKind::DuplicateId)
                .flat_map(|c| c.files.iter().cloned())
                .collect(),
            claimed: HashSet::new(),
            actions: Vec::new(),
        };

        for conflict in conflicts {
            match (strategy, conflict.kind) {
                (Strategy::Manual, _) => planner.manual(conflict),
                (_, ConflictKind::DuplicateId) => planner.duplicate(conflict)?,
                (Strategy::Chronological, _) => planner.manual(conflict),
                (Strategy::AutoRenumber, kind) => {
                    let Some(path) = conflict.files.first() else {
                        continue;
                    };
                    if planner.claimed.contains(path) {
                        debug!(id = %conflict.conflict_id, %kind, "file already handled by an earlier action");
                        continue;
                    }
                    planner.reattach(conflict, path)?;
                }
            }
        }

        let actions = planner.actions;
        let summary = summarize(strategy, &actions);
        info!(%strategy, actions = actions.len(), "created resolution plan");

        Ok(ResolutionPlan {
            strategy,
            summary,
            actions,
        })
    }

    /// Applies a plan, rewriting references to renamed IDs
    ///
    /// Returns one line per action. With `dry_run` nothing is written and
    /// every line carries a `[dry-run]` prefix.
    pub fn execute_with_references(
        &self,
        plan: &ResolutionPlan,
        dry_run: bool,
    ) -> Result<Vec<String>, ExecutionError> {
        let mut lines = Vec::with_capacity(plan.actions.len());

        for (index, action) in plan.actions.iter().enumerate() {
            if dry_run {
                lines.push(format!("{} {}", DRY_RUN_PREFIX, result_line(action)));
                continue;
            }

            let outcome = match action.kind {
                ActionKind::Manual => Ok(()),
                ActionKind::Rename => self.rename(action),
                ActionKind::Reparent => self.reparent(action),
            };

            match outcome {
                Ok(()) => lines.push(result_line(action)),
                Err(source) => {
                    warn!(index, action = %action.description, error = %source, "resolution stopped");
                    return Err(ExecutionError {
                        index,
                        completed: lines,
                        source,
                    });
                }
            }
        }

        Ok(lines)
    }

    /// Re-reads the action's file and checks it still declares the planned ID
    fn current(&self, action: &Action) -> Result<Task, ResolveError> {
        let task = self.store.read_file(&action.file_path)?;
        if task.id != action.original_id {
            return Err(ResolveError::Stale {
                path: action.file_path.clone(),
                expected: action.original_id.clone(),
                found: task.id,
            });
        }
        Ok(task)
    }

    fn rename(&self, action: &Action) -> Result<(), ResolveError> {
        let new_id = action
            .new_id
            .clone()
            .ok_or_else(|| ResolveError::MissingTarget(action.original_id.clone()))?;

        let mut task = self.current(action)?;
        if self.store.used_ids()?.contains(&new_id) {
            return Err(ResolveError::IdInUse(new_id));
        }

        let now = Utc::now();
        task.id = new_id.clone();
        task.record(format!("renumbered from {}", action.original_id), now);

        let new_path = self.store.write(&task)?;
        if new_path != action.file_path {
            self.store.remove_file(&action.file_path)?;
        }
        info!(from = %action.original_id, to = %new_id, path = %new_path.display(), "renamed task");

        let updated = self.sweep_references(&action.original_id, &new_id)?;
        debug!(from = %action.original_id, updated, "reference sweep done");
        Ok(())
    }

    /// Points references at `new` once no task holds `old` any more
    ///
    /// While another file still declares `old` (the kept side of a
    /// duplicate), references keep pointing at it.
    fn sweep_references(&self, old: &TaskId, new: &TaskId) -> Result<usize, ResolveError> {
        let mut tasks = Vec::new();
        for path in self.store.task_files()? {
            match self.store.read_file(&path) {
                Ok(task) => tasks.push((path, task)),
                Err(StoreError::MalformedFile { path, reason }) => {
                    warn!(path = %path.display(), %reason, "reference sweep skipped malformed file");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if tasks.iter().any(|(_, t)| &t.id == old) {
            debug!(id = %old, "ID still in use, references left in place");
            return Ok(0);
        }

        let now = Utc::now();
        let mut updated = 0;
        for (path, mut task) in tasks {
            if !task.replace_reference(old, new) {
                continue;
            }
            task.record(format!("reference {} renumbered to {}", old, new), now);
            let written = self.store.write(&task)?;
            if written != path {
                self.store.remove_file(&path)?;
            }
            updated += 1;
        }
        Ok(updated)
    }

    fn reparent(&self, action: &Action) -> Result<(), ResolveError> {
        let mut task = self.current(action)?;

        let change = match &action.new_parent {
            Some(parent) => format!("parent set to {}", parent),
            None => "parent removed".to_string(),
        };
        task.parent = action.new_parent.clone();
        task.record(change, Utc::now());

        let written = self.store.write(&task)?;
        if written != action.file_path {
            self.store.remove_file(&action.file_path)?;
        }
        info!(id = %task.id, parent = ?task.parent, "reparented task");
        Ok(())
    }
}

/// Accumulates actions while a plan is built
struct Planner<'s> {
    store: &'s TaskStore,
    strategy: Strategy,
    reserved: BTreeSet<TaskId>,
    /// Files with an orphan or hierarchy conflict
    misplaced: HashSet<PathBuf>,
    /// Files that already have a repair action
    claimed: HashSet<PathBuf>,
    actions: Vec<Action>,
}

impl Planner<'_> {
    fn manual(&mut self, conflict: &Conflict) {
        let path = conflict.files.first().cloned().unwrap_or_default();
        self.actions.push(Action::manual(conflict, path));
    }

    fn manual_for(&mut self, conflict: &Conflict, path: &Path, reason: &str) {
        let mut action = Action::manual(conflict, path.to_path_buf());
        action.description = format!("{} ({}: {})", action.description, path.display(), reason);
        self.actions.push(action);
    }

    /// Loads a file for planning; unreadable files become manual actions
    fn load(&mut self, conflict: &Conflict, path: &Path) -> Option<Task> {
        match self.store.read_file(path) {
            Ok(task) => Some(task),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot plan for unreadable file");
                self.manual_for(conflict, path, &e.to_string());
                None
            }
        }
    }

    fn allocate(&mut self, scope: &TaskId) -> Result<TaskId, ResolveError> {
        let id = self.store.next_id(scope, &self.reserved)?;
        self.reserved.insert(id.clone());
        Ok(id)
    }

    /// The parent an ID's position implies, if that task exists
    fn structural_parent(&self, id: &TaskId) -> Result<Option<TaskId>, ResolveError> {
        match id.parent() {
            Some(parent) => Ok(self.store.exists(&parent)?.then_some(parent)),
            None => Ok(None),
        }
    }

    /// Keeps one file under the ID and renames the others
    fn duplicate(&mut self, conflict: &Conflict) -> Result<(), ResolveError> {
        let mut candidates: Vec<(PathBuf, Task)> = Vec::new();
        for path in &conflict.files {
            if let Some(task) = self.load(conflict, path) {
                candidates.push((path.clone(), task));
            }
        }

        match self.strategy {
            Strategy::Chronological => {
                candidates.sort_by(|a, b| a.1.created_at.cmp(&b.1.created_at).then_with(|| a.0.cmp(&b.0)))
            }
            _ => candidates.sort_by(|a, b| a.0.cmp(&b.0)),
        }

        let mut rest = candidates.into_iter();
        if let Some((kept, _)) = rest.next() {
            debug!(id = %conflict.conflict_id, kept = %kept.display(), "keeping original ID");
        }

        let scope = conflict.conflict_id.scope();
        for (path, mut task) in rest {
            let new_id = self.allocate(&scope)?;
            let original = std::mem::replace(&mut task.id, new_id.clone());
            self.actions
                .push(Action::rename(original, new_id.clone(), path.clone(), "duplicate ID"));

            if self.strategy == Strategy::AutoRenumber && self.misplaced.contains(&path) {
                let parent = self.structural_parent(&new_id)?;
                if parent != task.parent {
                    self.actions
                        .push(Action::reparent(new_id, parent, self.store.path(&task)));
                }
            }
            self.claimed.insert(path);
        }
        Ok(())
    }

    /// Points an orphaned or misplaced task at the parent its ID implies
    ///
    /// Without an existing structural parent an orphan is detached to the
    /// root, while a hierarchy mismatch is left to a human.
    fn reattach(&mut self, conflict: &Conflict, path: &Path) -> Result<(), ResolveError> {
        let Some(task) = self.load(conflict, path) else {
            return Ok(());
        };

        let target = self.structural_parent(&task.id)?;
        if target.is_none() && conflict.kind == ConflictKind::InvalidHierarchy {
            self.manual(conflict);
            return Ok(());
        }

        self.actions.push(Action::reparent(task.id, target, path.to_path_buf()));
        self.claimed.insert(path.to_path_buf());
        Ok(())
    }
}

fn result_line(action: &Action) -> String {
    match action.kind {
        ActionKind::Manual => format!("Manual resolution required: {}", action.description),
        _ => action.description.clone(),
    }
}

fn summarize(strategy: Strategy, actions: &[Action]) -> String {
    if actions.is_empty() {
        return format!("{}: nothing to resolve", strategy);
    }

    let count = |kind| actions.iter().filter(|a| a.kind == kind).count();
    format!(
        "{}: {} rename, {} reparent, {} manual",
        strategy,
        count(ActionKind::Rename),
        count(ActionKind::Reparent),
        count(ActionKind::Manual)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::test_support::{put, put_task, setup, task_at};
    use crate::conflict::ConflictDetector;
    use std::collections::BTreeMap;
    use std::fs;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    fn snapshot(store: &TaskStore) -> BTreeMap<PathBuf, Vec<u8>> {
        store
            .task_files()
            .unwrap()
            .into_iter()
            .map(|p| {
                let bytes = fs::read(&p).unwrap();
                (p, bytes)
            })
            .collect()
    }

    fn plan(store: &TaskStore, strategy: Strategy) -> ResolutionPlan {
        let conflicts = ConflictDetector::new(store).detect_conflicts().unwrap();
        ConflictResolver::new(store)
            .create_resolution_plan(&conflicts, strategy)
            .unwrap()
    }

    fn by_title(store: &TaskStore, title: &str) -> Task {
        store
            .load_all()
            .unwrap()
            .into_iter()
            .find(|t| t.title == title)
            .unwrap()
    }

    #[test]
    fn no_conflicts_means_empty_plan() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        let before = snapshot(&store);

        for strategy in [Strategy::Chronological, Strategy::AutoRenumber, Strategy::Manual] {
            let plan = ConflictResolver::new(&store)
                .create_resolution_plan(&[], strategy)
                .unwrap();
            assert!(plan.is_empty());
            let lines = ConflictResolver::new(&store)
                .execute_with_references(&plan, false)
                .unwrap();
            assert!(lines.is_empty());
        }

        assert_eq!(snapshot(&store), before);
    }

    #[test]
    fn chronological_keeps_oldest() {
        let (_dir, store) = setup();
        // the newer task sorts first by path
        put(&store, "T5-alpha.md", "T5", "Newer", None, 20);
        put(&store, "T5-beta.md", "T5", "Older", None, 10);
        put(&store, "T6-other.md", "T6", "Other", None, 30);

        let plan = plan(&store, Strategy::Chronological);

        assert_eq!(plan.actions.len(), 1);
        let action = &plan.actions[0];
        assert_eq!(action.kind, ActionKind::Rename);
        assert!(action.file_path.ends_with("T5-alpha.md"));
        assert_eq!(action.new_id, Some(id("T7")));
        assert_eq!(plan.summary, "chronological: 1 rename, 0 reparent, 0 manual");

        ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        assert_eq!(by_title(&store, "Older").id, id("T5"));
        assert_eq!(by_title(&store, "Newer").id, id("T7"));
        assert!(ConflictDetector::new(&store).detect_conflicts().unwrap().is_empty());
    }

    #[test]
    fn chronological_references_stay_with_kept_task() {
        let (_dir, store) = setup();
        put(&store, "T5-kept.md", "T5", "Kept", None, 10);
        put(&store, "T5-moved.md", "T5", "Moved", None, 20);
        let mut third = task_at("T6", "Third", None, 30);
        third.dependencies = vec![id("T5")];
        put_task(&store, "T6-third.md", &third);

        let plan = plan(&store, Strategy::Chronological);
        ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        assert_eq!(by_title(&store, "Kept").id, id("T5"));
        assert_eq!(by_title(&store, "Moved").id, id("T7"));
        assert_eq!(by_title(&store, "Third").dependencies, vec![id("T5")]);
    }

    #[test]
    fn duplicate_resolution_preserves_count() {
        let (_dir, store) = setup();
        put(&store, "T2-a.md", "T2", "A", None, 1);
        put(&store, "T2-b.md", "T2", "B", None, 2);
        put(&store, "T2-c.md", "T2", "C", None, 3);

        let plan = plan(&store, Strategy::Chronological);
        assert_eq!(plan.count(ActionKind::Rename), 2);
        let targets: BTreeSet<_> = plan.actions.iter().filter_map(|a| a.new_id.clone()).collect();
        assert_eq!(targets.len(), 2);

        ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        let ids: BTreeSet<_> = store.load_all().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, BTreeSet::from([id("T2"), id("T3"), id("T4")]));
        assert!(ConflictDetector::new(&store).detect_conflicts().unwrap().is_empty());
    }

    #[test]
    fn nested_duplicates_stay_in_their_scope() {
        let (_dir, store) = setup();
        put(&store, "T1-root.md", "T1", "Root", None, 1);
        put(&store, "T1.1-a.md", "T1.1", "A", Some("T1"), 2);
        put(&store, "T1.1-b.md", "T1.1", "B", Some("T1"), 3);

        let plan = plan(&store, Strategy::AutoRenumber);

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].new_id, Some(id("T1.2")));
        assert!(plan.actions[0].file_path.ends_with("T1.1-b.md"));
    }

    #[test]
    fn archived_ids_are_not_reused() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1-b.md", "T1", "B", None, 2);
        fs::create_dir_all(store.archive_dir()).unwrap();
        put_task(&store, "archived/T2-gone.md", &task_at("T2", "Gone", None, 0));

        let plan = plan(&store, Strategy::Chronological);
        assert_eq!(plan.actions[0].new_id, Some(id("T3")));
    }

    #[test]
    fn rename_rewrites_references_to_retired_id() {
        let (_dir, store) = setup();
        put(&store, "T2-b.md", "T2", "B", None, 1);
        let moved = put(&store, "T1.1-c.md", "T1.1", "C", Some("T2"), 2);
        let mut child = task_at("T1.1.1", "Grandchild", Some("T1.1"), 3);
        child.dependencies = vec![id("T1.1")];
        put_task(&store, "T1.1.1-g.md", &child);

        let plan = ResolutionPlan {
            strategy: Strategy::AutoRenumber,
            summary: String::new(),
            actions: vec![Action::rename(id("T1.1"), id("T2.1"), moved.clone(), "moved under T2")],
        };
        ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        assert!(!moved.exists());
        assert_eq!(by_title(&store, "C").id, id("T2.1"));

        let grandchild = by_title(&store, "Grandchild");
        assert_eq!(grandchild.parent, Some(id("T2.1")));
        assert_eq!(grandchild.dependencies, vec![id("T2.1")]);
        assert!(store
            .load_all()
            .unwrap()
            .iter()
            .all(|t| !t.references(&id("T1.1"))));
    }

    #[test]
    fn auto_fixes_hierarchy_by_reparenting() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T2-b.md", "T2", "B", None, 2);
        let misplaced = put(&store, "T1.1-c.md", "T1.1", "C", Some("T2"), 3);
        put(&store, "T1.1.1-d.md", "T1.1.1", "D", Some("T1.1"), 4);

        let plan = plan(&store, Strategy::AutoRenumber);

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::Reparent);
        assert_eq!(plan.actions[0].new_parent, Some(id("T1")));
        assert_eq!(plan.actions[0].file_path, misplaced);

        ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        assert_eq!(by_title(&store, "C").id, id("T1.1"));
        assert_eq!(by_title(&store, "C").parent, Some(id("T1")));
        assert_eq!(by_title(&store, "D").parent, Some(id("T1.1")));
        assert!(ConflictDetector::new(&store).detect_conflicts().unwrap().is_empty());
    }

    #[test]
    fn hierarchy_without_structural_parent_is_manual() {
        let (_dir, store) = setup();
        put(&store, "T2-b.md", "T2", "B", None, 1);
        put(&store, "T3.1-c.md", "T3.1", "C", Some("T2"), 2);

        let plan = plan(&store, Strategy::AutoRenumber);

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::Manual);
    }

    #[test]
    fn renamed_duplicate_with_wrong_parent_is_fixed_once() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T2-b.md", "T2", "B", None, 2);
        put(&store, "T1.1-a.md", "T1.1", "Kept", Some("T1"), 3);
        let moved = put(&store, "T1.1-b.md", "T1.1", "Moved", Some("T2"), 4);

        let plan = plan(&store, Strategy::AutoRenumber);

        let kinds: Vec<_> = plan.actions.iter().map(|a| a.kind).collect();
        assert_eq!(kinds, vec![ActionKind::Rename, ActionKind::Reparent]);
        assert_eq!(plan.actions[0].file_path, moved);
        assert_eq!(plan.actions[0].new_id, Some(id("T1.2")));
        assert_eq!(plan.actions[1].original_id, id("T1.2"));
        assert_eq!(plan.actions[1].new_parent, Some(id("T1")));
        assert!(plan.actions[1].file_path.ends_with("T1.2-moved.md"));

        ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        let task = by_title(&store, "Moved");
        assert_eq!(task.id, id("T1.2"));
        assert_eq!(task.parent, Some(id("T1")));
        assert!(ConflictDetector::new(&store).detect_conflicts().unwrap().is_empty());
    }

    /// Runs detect, plan and execute, then checks the folder is clean
    fn assert_auto_converges(store: &TaskStore) {
        let detector = ConflictDetector::new(store);
        let conflicts = detector.detect_conflicts().unwrap();
        assert!(!conflicts.is_empty());

        let resolver = ConflictResolver::new(store);
        let plan = resolver
            .create_resolution_plan(&conflicts, Strategy::AutoRenumber)
            .unwrap();
        assert_eq!(plan.count(ActionKind::Manual), 0, "{:?}", plan.actions);

        let touched: Vec<_> = plan.actions.iter().map(|a| &a.file_path).collect();
        let unique: BTreeSet<_> = touched.iter().collect();
        assert_eq!(touched.len(), unique.len(), "{:?}", plan.actions);

        resolver.execute_with_references(&plan, false).unwrap();

        let remaining = detector.detect_conflicts().unwrap();
        assert!(remaining.is_empty(), "{:?}", remaining);
    }

    #[test]
    fn auto_converges_on_repairable_shapes() {
        // root duplicate
        let (_a, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1-b.md", "T1", "B", None, 2);
        put(&store, "T1.1-c.md", "T1.1", "C", Some("T1"), 3);
        assert_auto_converges(&store);

        // nested duplicate with a child under the shared ID
        let (_b, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1.1-a.md", "T1.1", "B", Some("T1"), 2);
        put(&store, "T1.1-b.md", "T1.1", "C", Some("T1"), 3);
        put(&store, "T1.1.1-d.md", "T1.1.1", "D", Some("T1.1"), 4);
        assert_auto_converges(&store);

        // misplaced subtree
        let (_c, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T2-b.md", "T2", "B", None, 2);
        put(&store, "T1.1-c.md", "T1.1", "C", Some("T2"), 3);
        put(&store, "T1.1.1-d.md", "T1.1.1", "D", Some("T1.1"), 4);
        assert_auto_converges(&store);

        // duplicate whose renamed side is also misplaced
        let (_d, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T2-b.md", "T2", "B", None, 2);
        put(&store, "T1.1-a.md", "T1.1", "C", Some("T1"), 3);
        put(&store, "T1.1-b.md", "T1.1", "D", Some("T2"), 4);
        assert_auto_converges(&store);

        // duplicate whose renamed side is orphaned
        let (_e, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1.1-a.md", "T1.1", "B", Some("T1"), 2);
        put(&store, "T1.1-b.md", "T1.1", "C", Some("T9"), 3);
        assert_auto_converges(&store);

        // duplicate under a missing parent
        let (_f, store) = setup();
        put(&store, "T5.1-a.md", "T5.1", "A", Some("T5"), 1);
        put(&store, "T5.1-b.md", "T5.1", "B", Some("T5"), 2);
        assert_auto_converges(&store);

        // orphans with and without a structural parent
        let (_g, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1.1-b.md", "T1.1", "B", Some("T9"), 2);
        put(&store, "T4-c.md", "T4", "C", Some("T8"), 3);
        assert_auto_converges(&store);
    }

    #[test]
    fn chronological_sends_structure_to_manual() {
        let (_dir, store) = setup();
        put(&store, "T4-orphan.md", "T4", "Orphan", Some("T9"), 1);

        let plan = plan(&store, Strategy::Chronological);

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::Manual);
        assert!(plan.is_manual_only());
    }

    #[test]
    fn auto_reattaches_or_detaches_orphans() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1.1-b.md", "T1.1", "B", Some("T9"), 2);
        put(&store, "T4-c.md", "T4", "C", Some("T8"), 3);

        let plan = plan(&store, Strategy::AutoRenumber);

        // T1.1 is both orphaned and mismatched; it gets one action
        assert_eq!(plan.actions.len(), 2);
        assert_eq!(plan.count(ActionKind::Reparent), 2);
        assert_eq!(plan.summary, "auto-renumber: 0 rename, 2 reparent, 0 manual");

        ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        assert_eq!(by_title(&store, "B").parent, Some(id("T1")));
        assert_eq!(by_title(&store, "C").parent, None);
        assert!(ConflictDetector::new(&store).detect_conflicts().unwrap().is_empty());
    }

    #[test]
    fn manual_plan_changes_nothing() {
        let (_dir, store) = setup();
        put(&store, "T3-a.md", "T3", "A", None, 1);
        put(&store, "T3-b.md", "T3", "B", None, 2);
        put(&store, "T4-orphan.md", "T4", "Orphan", Some("T9"), 3);
        let before = snapshot(&store);

        let plan = plan(&store, Strategy::Manual);
        assert_eq!(plan.count(ActionKind::Manual), 2);
        assert_eq!(plan.count(ActionKind::Rename), 0);

        let lines = ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap();

        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with("Manual resolution required")));
        assert_eq!(snapshot(&store), before);
    }

    #[test]
    fn dry_run_writes_nothing() {
        let (_dir, store) = setup();
        put(&store, "T3-a.md", "T3", "A", None, 1);
        put(&store, "T3-b.md", "T3", "B", None, 2);
        let before = snapshot(&store);

        let plan = plan(&store, Strategy::Chronological);
        let resolver = ConflictResolver::new(&store);
        let preview = resolver.execute_with_references(&plan, true).unwrap();

        assert_eq!(snapshot(&store), before);
        assert_eq!(preview.len(), 1);

        let applied = resolver.execute_with_references(&plan, false).unwrap();
        assert_eq!(preview[0], format!("[dry-run] {}", applied[0]));
    }

    #[test]
    fn unreadable_duplicate_falls_back_to_manual() {
        let (_dir, store) = setup();
        let a = put(&store, "T3-a.md", "T3", "A", None, 1);
        let b = put(&store, "T3-b.md", "T3", "B", None, 2);
        let conflicts = ConflictDetector::new(&store).detect_conflicts().unwrap();
        fs::write(&b, "garbage").unwrap();

        let plan = ConflictResolver::new(&store)
            .create_resolution_plan(&conflicts, Strategy::AutoRenumber)
            .unwrap();

        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].kind, ActionKind::Manual);
        assert_eq!(plan.actions[0].file_path, b);
        assert!(a.exists());
    }

    #[test]
    fn failure_reports_index_and_keeps_earlier_steps() {
        let (_dir, store) = setup();
        put(&store, "T3-a.md", "T3", "A", None, 1);
        put(&store, "T3-b.md", "T3", "B", None, 2);
        put(&store, "T5-a.md", "T5", "C", None, 3);
        put(&store, "T5-b.md", "T5", "D", None, 4);

        let plan = plan(&store, Strategy::Chronological);
        assert_eq!(plan.actions.len(), 2);

        // make the second step stale
        fs::remove_file(&plan.actions[1].file_path).unwrap();

        let err = ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap_err();

        assert_eq!(err.index, 1);
        assert_eq!(err.completed.len(), 1);
        assert_eq!(by_title(&store, "B").id, plan.actions[0].new_id.clone().unwrap());
    }

    #[test]
    fn stale_file_is_refused() {
        let (_dir, store) = setup();
        put(&store, "T3-a.md", "T3", "A", None, 1);
        let b = put(&store, "T3-b.md", "T3", "B", None, 2);

        let plan = plan(&store, Strategy::AutoRenumber);
        put_task(&store, "T3-b.md", &task_at("T9", "Edited", None, 5));

        let err = ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap_err();

        assert!(matches!(err.source, ResolveError::Stale { .. }));
        assert!(b.exists());
    }

    #[test]
    fn taken_target_is_refused() {
        let (_dir, store) = setup();
        put(&store, "T3-a.md", "T3", "A", None, 1);
        put(&store, "T3-b.md", "T3", "B", None, 2);

        let plan = plan(&store, Strategy::AutoRenumber);
        put(&store, "T4-late.md", "T4", "Late", None, 3);

        let err = ConflictResolver::new(&store)
            .execute_with_references(&plan, false)
            .unwrap_err();

        assert!(matches!(err.source, ResolveError::IdInUse(ref i) if *i == id("T4")));
        assert!(err.completed.is_empty());
    }
}
