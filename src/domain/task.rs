//! Task domain model
//!
//! A task is one Markdown file in the task folder. Its identity is a
//! hierarchical [`TaskId`]; parent and dependency links point at other IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use super::id::TaskId;

/// Status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    #[default]
    Todo,
    InProgress,
    InReview,
    Done,
    Cancelled,
    Rejected,
    Archived,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Todo,
        Status::InProgress,
        Status::InReview,
        Status::Done,
        Status::Cancelled,
        Status::Rejected,
        Status::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Todo => "todo",
            Status::InProgress => "in-progress",
            Status::InReview => "in-review",
            Status::Done => "done",
            Status::Cancelled => "cancelled",
            Status::Rejected => "rejected",
            Status::Archived => "archived",
        }
    }

    /// Returns true if no more work is expected on the task
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Status::Done | Status::Cancelled | Status::Rejected | Status::Archived
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    /// Accepts the canonical names plus `_`/space separated and a few aliases
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();

        match normalized.as_str() {
            "todo" | "to-do" | "pending" | "open" => Ok(Status::Todo),
            "in-progress" | "inprogress" | "wip" | "doing" => Ok(Status::InProgress),
            "in-review" | "inreview" | "review" => Ok(Status::InReview),
            "done" | "complete" | "completed" => Ok(Status::Done),
            "cancelled" | "canceled" => Ok(Status::Cancelled),
            "rejected" => Ok(Status::Rejected),
            "archived" => Ok(Status::Archived),
            _ => Err(format!(
                "unknown status '{}' (expected one of: {})",
                s,
                Status::ALL.map(|st| st.as_str()).join(", ")
            )),
        }
    }
}

/// Priority of a task, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" | "med" | "normal" | "unknown" | "" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" | "urgent" => Ok(Priority::Critical),
            _ => Err(format!(
                "unknown priority '{}' (expected low, medium, high or critical)",
                s
            )),
        }
    }
}

// Files are hand-edited, so both enums load through their lenient FromStr
impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Priority {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// One checklist item; its number is its position in the list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub text: String,
    pub checked: bool,
}

impl AcceptanceCriterion {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            checked: false,
        }
    }
}

/// A timestamped line in the task's change log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub change: String,
}

/// A field update that distinguishes "leave alone" from "set to this value"
///
/// `Patch::Set(String::new())` clears a text field, `Patch::Unchanged`
/// keeps it; `Patch::Set(None)` on an optional field clears it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch<T> {
    Unchanged,
    Set(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Unchanged
    }
}

impl<T> Patch<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Patch::Set(_))
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Patch::Unchanged => None,
            Patch::Set(v) => Some(v),
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    /// `None` means "not provided"
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Patch::Set(v),
            None => Patch::Unchanged,
        }
    }
}

/// A task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub status: Status,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assigned: Vec<String>,
    #[serde(default)]
    pub parent: Option<TaskId>,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
    #[serde(default)]
    pub plan: String,
    #[serde(default)]
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl Task {
    /// Creates a new task in `todo` state
    pub fn new(id: TaskId, title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: title.into(),
            status: Status::Todo,
            priority: Priority::Medium,
            labels: Vec::new(),
            assigned: Vec::new(),
            parent: None,
            dependencies: Vec::new(),
            description: String::new(),
            acceptance_criteria: Vec::new(),
            plan: String::new(),
            notes: String::new(),
            created_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    /// Appends a history entry and bumps `updated_at`
    pub fn record(&mut self, change: impl Into<String>, now: DateTime<Utc>) {
        self.history.push(HistoryEntry {
            timestamp: now,
            change: change.into(),
        });
        self.updated_at = now;
    }

    /// Returns true if this task points at `id` as parent or dependency
    pub fn references(&self, id: &TaskId) -> bool {
        self.parent.as_ref() == Some(id) || self.dependencies.contains(id)
    }

    /// Rewrites parent and dependency links from `old` to `new`
    ///
    /// Returns true if anything changed. A dependency that already points at
    /// `new` is not duplicated.
    pub fn replace_reference(&mut self, old: &TaskId, new: &TaskId) -> bool {
        let mut changed = false;

        if self.parent.as_ref() == Some(old) {
            self.parent = Some(new.clone());
            changed = true;
        }

        if self.dependencies.contains(old) {
            let already = self.dependencies.contains(new);
            let mut rewritten = Vec::with_capacity(self.dependencies.len());
            for dep in self.dependencies.drain(..) {
                if &dep == old {
                    if !already && !rewritten.contains(new) {
                        rewritten.push(new.clone());
                    }
                } else {
                    rewritten.push(dep);
                }
            }
            self.dependencies = rewritten;
            changed = true;
        }

        changed
    }

    /// Returns true if the task has no assignee
    pub fn is_unassigned(&self) -> bool {
        self.assigned.is_empty()
    }

    /// Returns the number of checked acceptance criteria
    pub fn checked_criteria(&self) -> usize {
        self.acceptance_criteria.iter().filter(|ac| ac.checked).count()
    }
}

/// Deserializes a list that may be written as a single scalar
///
/// Hand-edited files often say `labels: backend` instead of
/// `labels: [backend]`; both load. `null` loads as an empty list.
pub(crate) fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    use serde::de::{self, SeqAccess, Visitor};
    use std::marker::PhantomData;

    struct OneOrMany<T>(PhantomData<T>);

    impl<'de, T> Visitor<'de> for OneOrMany<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        type Value = Vec<T>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a sequence of strings")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            if value.trim().is_empty() {
                return Ok(Vec::new());
            }
            value.parse().map(|v| vec![v]).map_err(E::custom)
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            self.visit_str(&value.to_string())
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            self.visit_str(&value.to_string())
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut items = Vec::new();
            while let Some(raw) = seq.next_element::<String>()? {
                items.push(raw.parse().map_err(de::Error::custom)?);
            }
            Ok(items)
        }
    }

    deserializer.deserialize_any(OneOrMany(PhantomData))
}
