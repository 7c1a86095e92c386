//! Hierarchical task IDs
//!
//! ID Format:
//! - Root tasks: `T{n}` (e.g., `T7`)
//! - Subtasks: `{parent}.{n}` (e.g., `T7.2`, `T7.2.1`)
//!
//! IDs are allocated per branch, so two branches can hand out the same ID.
//! Detecting and repairing those collisions is the job of [`crate::conflict`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid task ID format: expected 'T{{n}}' or 'T{{n}}.{{m}}...', got '{0}'")]
    InvalidFormat(String),

    #[error("No IDs left after {0}")]
    AllocationExhausted(TaskId),
}

/// Task ID as an ordered list of positive segments
///
/// The derived ordering compares segments numerically and puts a prefix
/// before its extensions: `T1 < T1.1 < T1.2 < T2 < T10`.
///
/// The empty ID ([`TaskId::root`]) stands for "no ID": it is the parent scope
/// of every root task and never appears in a task file.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskId {
    segments: Vec<u32>,
}

impl TaskId {
    /// Returns the empty ID used as the root scope
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds an ID from raw segments
    pub fn from_segments(segments: impl Into<Vec<u32>>) -> Result<Self, IdError> {
        let segments = segments.into();
        if segments.is_empty() || segments.contains(&0) {
            let rendered = segments
                .iter()
                .map(u32::to_string)
                .collect::<Vec<_>>()
                .join(".");
            return Err(IdError::InvalidFormat(rendered));
        }
        Ok(Self { segments })
    }

    /// Returns true for the empty ID
    pub fn is_zero(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the sequence segments (e.g., `[1, 2]` for `T1.2`)
    pub fn segments(&self) -> &[u32] {
        &self.segments
    }

    /// Returns the number of segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if the ID has a single segment
    pub fn is_root_task(&self) -> bool {
        self.segments.len() == 1
    }

    /// Returns the structural parent, or None for root tasks
    pub fn parent(&self) -> Option<TaskId> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(TaskId {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Returns the parent scope: the structural parent or the root scope
    pub fn scope(&self) -> TaskId {
        self.parent().unwrap_or_default()
    }

    /// Creates the child ID `{self}.{sequence}`
    ///
    /// On the root scope this yields the root task `T{sequence}`.
    pub fn child(&self, sequence: u32) -> TaskId {
        let mut segments = self.segments.clone();
        segments.push(sequence);
        TaskId { segments }
    }

    /// Returns the ID that follows this one among its siblings
    pub fn next_sibling(&self) -> Result<TaskId, IdError> {
        let mut segments = self.segments.clone();
        let last = segments
            .last_mut()
            .ok_or_else(|| IdError::InvalidFormat(String::new()))?;
        *last = last
            .checked_add(1)
            .ok_or_else(|| IdError::AllocationExhausted(self.clone()))?;
        Ok(TaskId { segments })
    }

    /// Returns the next child ID given the highest existing child, if any
    pub fn next_child(&self, last_child: Option<&TaskId>) -> Result<TaskId, IdError> {
        match last_child {
            Some(child) => child.next_sibling(),
            None => Ok(self.child(1)),
        }
    }

    /// Returns true if `other` is a direct child of this ID
    pub fn is_parent_of(&self, other: &TaskId) -> bool {
        other.depth() == self.depth() + 1 && other.segments.starts_with(&self.segments)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return Ok(());
        }
        write!(f, "T")?;
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{}", seg)?;
        }
        Ok(())
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    /// Parses `T1.2`, `t1.2`, `1.2` and zero-padded forms like `T01.02`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let rest = s
            .strip_prefix('T')
            .or_else(|| s.strip_prefix('t'))
            .unwrap_or(s);

        if rest.is_empty() {
            return Err(IdError::InvalidFormat(s.to_string()));
        }

        let segments = rest
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(IdError::InvalidFormat(s.to_string()));
                }
                match part.parse::<u32>() {
                    Ok(n) if n > 0 => Ok(n),
                    _ => Err(IdError::InvalidFormat(s.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }
}

impl TryFrom<String> for TaskId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn id(s: &str) -> TaskId {
        s.parse().unwrap()
    }

    #[test]
    fn renders_canonical_form() {
        assert_eq!(id("T1").to_string(), "T1");
        assert_eq!(id("T1.2.3").to_string(), "T1.2.3");
        assert_eq!(TaskId::root().to_string(), "");
    }

    #[test]
    fn parses_shorthand_and_padding() {
        assert_eq!(id("1.2"), id("T1.2"));
        assert_eq!(id("t1.2"), id("T1.2"));
        assert_eq!(id("T01.02"), id("T1.2"));
        assert_eq!(id("  T4 "), id("T4"));
    }

    #[test]
    fn rejects_invalid_format() {
        for bad in ["", "T", "T1.", "T.1", "T1..2", "Tx", "T1.a", "T0", "T1.0", "T-1", "T1.2 3"] {
            assert!(
                matches!(bad.parse::<TaskId>(), Err(IdError::InvalidFormat(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn orders_by_segments() {
        let mut ids = vec![id("T2"), id("T1.2"), id("T10"), id("T1"), id("T1.1")];
        ids.sort();
        let rendered: Vec<_> = ids.iter().map(|i| i.to_string()).collect();
        assert_eq!(rendered, vec!["T1", "T1.1", "T1.2", "T2", "T10"]);
    }

    #[test]
    fn parent_and_scope() {
        assert_eq!(id("T1.2.3").parent(), Some(id("T1.2")));
        assert_eq!(id("T1").parent(), None);
        assert!(id("T1").scope().is_zero());
        assert_eq!(id("T4.1").scope(), id("T4"));
    }

    #[test]
    fn sibling_and_child_allocation() {
        assert_eq!(id("T1.2").next_sibling().unwrap(), id("T1.3"));
        assert_eq!(id("T3").next_child(None).unwrap(), id("T3.1"));
        assert_eq!(id("T3").next_child(Some(&id("T3.4"))).unwrap(), id("T3.5"));
        assert_eq!(TaskId::root().next_child(None).unwrap(), id("T1"));
        assert_eq!(TaskId::root().next_child(Some(&id("T9"))).unwrap(), id("T10"));
    }

    #[test]
    fn sibling_overflow_is_exhausted() {
        let last = TaskId::from_segments(vec![u32::MAX]).unwrap();
        assert!(matches!(last.next_sibling(), Err(IdError::AllocationExhausted(_))));
    }

    #[test]
    fn is_parent_of_checks_direct_children_only() {
        assert!(id("T1").is_parent_of(&id("T1.3")));
        assert!(!id("T1").is_parent_of(&id("T1.3.1")));
        assert!(!id("T1").is_parent_of(&id("T2.1")));
        assert!(TaskId::root().is_parent_of(&id("T5")));
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&id("T2.1")).unwrap();
        assert_eq!(json, "\"T2.1\"");
        let back: TaskId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id("T2.1"));
    }

    proptest! {
        #[test]
        fn ordering_matches_segment_comparison(
            a in prop::collection::vec(1u32..50, 1..4),
            b in prop::collection::vec(1u32..50, 1..4),
        ) {
            let ia = TaskId::from_segments(a.clone()).unwrap();
            let ib = TaskId::from_segments(b.clone()).unwrap();
            prop_assert_eq!(ia.cmp(&ib), a.cmp(&b));
            prop_assert_eq!(ia.to_string().parse::<TaskId>().unwrap(), ia);
        }
    }
}
