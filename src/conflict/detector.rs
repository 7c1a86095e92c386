//! Conflict detection over a task folder
//!
//! Reads the ID each file declares in its frontmatter, not the one in its
//! name: after a merge the two can disagree, and the frontmatter is what
//! other tasks reference.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::domain::{Conflict, ConflictKind, ConflictSummary, Task, TaskId};
use crate::storage::{StoreError, TaskStore};

/// A task file that could not be parsed during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of scanning a task folder
#[derive(Debug, Clone, Default, Serialize)]
pub struct Scan {
    pub conflicts: Vec<Conflict>,
    pub malformed: Vec<MalformedFile>,
    /// Number of files that parsed
    pub scanned: usize,
}

impl Scan {
    pub fn is_clean(&self) -> bool {
        self.conflicts.is_empty() && self.malformed.is_empty()
    }
}

/// Finds duplicate IDs, orphaned children and parent/ID mismatches
pub struct ConflictDetector<'a> {
    store: &'a TaskStore,
}

impl<'a> ConflictDetector<'a> {
    pub fn new(store: &'a TaskStore) -> Self {
        Self { store }
    }

    /// Scans every active task file
    ///
    /// Unparseable files are collected in [`Scan::malformed`] and otherwise
    /// ignored; only listing the folder can fail.
    pub fn scan(&self) -> Result<Scan, StoreError> {
        let mut tasks: Vec<(PathBuf, Task)> = Vec::new();
        let mut malformed = Vec::new();

        for path in self.store.task_files()? {
            match self.store.read_file(&path) {
                Ok(task) => tasks.push((path, task)),
                Err(StoreError::MalformedFile { path, reason }) => {
                    warn!(path = %path.display(), %reason, "skipping malformed task file");
                    malformed.push(MalformedFile { path, reason });
                }
                Err(e) => return Err(e),
            }
        }

        let mut by_id: BTreeMap<&TaskId, Vec<&PathBuf>> = BTreeMap::new();
        for (path, task) in &tasks {
            by_id.entry(&task.id).or_default().push(path);
        }
        let known: BTreeSet<&TaskId> = by_id.keys().copied().collect();

        let mut conflicts = Vec::new();

        for (id, files) in &by_id {
            if files.len() > 1 {
                let mut files: Vec<PathBuf> = files.iter().map(|p| (*p).clone()).collect();
                files.sort();
                conflicts.push(Conflict {
                    kind: ConflictKind::DuplicateId,
                    conflict_id: (*id).clone(),
                    description: format!(
                        "Task ID {} appears in {} files: {}",
                        id,
                        files.len(),
                        display_names(&files)
                    ),
                    files,
                });
            }
        }

        for (path, task) in &tasks {
            let Some(parent) = &task.parent else {
                continue;
            };

            if !known.contains(parent) {
                conflicts.push(Conflict {
                    kind: ConflictKind::OrphanedChild,
                    conflict_id: task.id.clone(),
                    files: vec![path.clone()],
                    description: format!("Task {} references non-existent parent {}", task.id, parent),
                });
            }

            if let Some(structural) = task.id.parent() {
                if &structural != parent {
                    conflicts.push(Conflict {
                        kind: ConflictKind::InvalidHierarchy,
                        conflict_id: task.id.clone(),
                        files: vec![path.clone()],
                        description: format!(
                            "Task {} declares parent {} but its ID places it under {}",
                            task.id, parent, structural
                        ),
                    });
                }
            }
        }

        conflicts.sort_by(|a, b| {
            a.kind
                .cmp(&b.kind)
                .then_with(|| a.conflict_id.cmp(&b.conflict_id))
                .then_with(|| a.files.first().cmp(&b.files.first()))
        });

        debug!(
            scanned = tasks.len(),
            conflicts = conflicts.len(),
            malformed = malformed.len(),
            "scanned task folder"
        );

        Ok(Scan {
            conflicts,
            malformed,
            scanned: tasks.len(),
        })
    }

    /// Returns the conflicts of a fresh scan
    pub fn detect_conflicts(&self) -> Result<Vec<Conflict>, StoreError> {
        Ok(self.scan()?.conflicts)
    }

    /// Groups and counts conflicts
    pub fn summarize_conflicts(&self, conflicts: &[Conflict]) -> ConflictSummary {
        ConflictSummary::from_conflicts(conflicts)
    }
}

fn display_names(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::test_support::{put, setup};
    use std::fs;

    #[test]
    fn clean_folder_has_no_conflicts() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1.1-b.md", "T1.1", "B", Some("T1"), 2);

        let scan = ConflictDetector::new(&store).scan().unwrap();
        assert!(scan.is_clean());
        assert_eq!(scan.scanned, 2);
    }

    #[test]
    fn empty_folder_is_clean() {
        let (_dir, store) = setup();
        assert!(ConflictDetector::new(&store).detect_conflicts().unwrap().is_empty());
    }

    #[test]
    fn duplicate_id_lists_both_files() {
        let (_dir, store) = setup();
        let a = put(&store, "T3-first.md", "T3", "First", None, 1);
        let b = put(&store, "T3-second.md", "T3", "Second", None, 2);

        let conflicts = ConflictDetector::new(&store).detect_conflicts().unwrap();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::DuplicateId);
        assert_eq!(conflicts[0].conflict_id.to_string(), "T3");
        assert_eq!(conflicts[0].files, vec![a, b]);
    }

    #[test]
    fn orphan_uses_own_id() {
        let (_dir, store) = setup();
        put(&store, "T4-orphan.md", "T4", "Orphan", Some("T9"), 1);

        let conflicts = ConflictDetector::new(&store).detect_conflicts().unwrap();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::OrphanedChild);
        assert_eq!(conflicts[0].conflict_id.to_string(), "T4");
    }

    #[test]
    fn invalid_hierarchy_needs_structural_parent() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T2-b.md", "T2", "B", None, 2);
        put(&store, "T1.1-c.md", "T1.1", "C", Some("T2"), 3);
        // root-level tasks may declare any existing parent
        put(&store, "T3-d.md", "T3", "D", Some("T2"), 4);

        let conflicts = ConflictDetector::new(&store).detect_conflicts().unwrap();

        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::InvalidHierarchy);
        assert_eq!(conflicts[0].conflict_id.to_string(), "T1.1");
    }

    #[test]
    fn orphan_and_mismatch_are_both_reported_in_order() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        put(&store, "T1.1-b.md", "T1.1", "B", Some("T9"), 2);
        put(&store, "T2-x.md", "T2", "X", None, 3);
        put(&store, "T2-y.md", "T2", "Y", None, 4);

        let conflicts = ConflictDetector::new(&store).detect_conflicts().unwrap();
        let kinds: Vec<_> = conflicts.iter().map(|c| c.kind).collect();

        assert_eq!(
            kinds,
            vec![
                ConflictKind::DuplicateId,
                ConflictKind::OrphanedChild,
                ConflictKind::InvalidHierarchy
            ]
        );
    }

    #[test]
    fn frontmatter_id_wins_over_file_name() {
        let (_dir, store) = setup();
        put(&store, "T3-a.md", "T3", "A", None, 1);
        put(&store, "T8-b.md", "T3", "B", None, 2);

        let conflicts = ConflictDetector::new(&store).detect_conflicts().unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].files.len(), 2);
    }

    #[test]
    fn malformed_files_are_recorded_not_fatal() {
        let (_dir, store) = setup();
        put(&store, "T1-a.md", "T1", "A", None, 1);
        fs::write(store.dir().join("T2-bad.md"), "---\nid: [\n").unwrap();

        let scan = ConflictDetector::new(&store).scan().unwrap();

        assert!(scan.conflicts.is_empty());
        assert_eq!(scan.malformed.len(), 1);
        assert!(scan.malformed[0].path.ends_with("T2-bad.md"));
        assert!(!scan.is_clean());
    }

    #[test]
    fn non_utf8_file_does_not_hide_other_conflicts() {
        let (_dir, store) = setup();
        put(&store, "T3-a.md", "T3", "A", None, 1);
        put(&store, "T3-b.md", "T3", "B", None, 2);
        fs::write(store.dir().join("T4-latin1.md"), b"---\nid: T4\ntitle: Caf\xe9\n---\n").unwrap();

        let scan = ConflictDetector::new(&store).scan().unwrap();

        assert_eq!(scan.conflicts.len(), 1);
        assert_eq!(scan.conflicts[0].kind, ConflictKind::DuplicateId);
        assert_eq!(scan.malformed.len(), 1);
        assert!(scan.malformed[0].path.ends_with("T4-latin1.md"));
        assert_eq!(scan.scanned, 2);
    }

    #[test]
    fn detection_is_read_only_and_repeatable() {
        let (_dir, store) = setup();
        put(&store, "T3-first.md", "T3", "First", None, 1);
        put(&store, "T3-second.md", "T3", "Second", None, 2);
        put(&store, "T4-orphan.md", "T4", "Orphan", Some("T9"), 3);

        let detector = ConflictDetector::new(&store);
        let first = detector.detect_conflicts().unwrap();
        let second = detector.detect_conflicts().unwrap();

        assert_eq!(first, second);
        assert_eq!(store.task_files().unwrap().len(), 3);
    }

    #[test]
    fn summary_counts() {
        let (_dir, store) = setup();
        put(&store, "T3-first.md", "T3", "First", None, 1);
        put(&store, "T3-second.md", "T3", "Second", None, 2);
        put(&store, "T4-orphan.md", "T4", "Orphan", Some("T9"), 3);

        let detector = ConflictDetector::new(&store);
        let summary = detector.summarize_conflicts(&detector.detect_conflicts().unwrap());

        assert_eq!(summary.total, 2);
        assert_eq!(summary.duplicate_ids, 1);
        assert_eq!(summary.orphaned_children, 1);
    }
}
