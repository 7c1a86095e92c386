//! Domain models for backlog
//!
//! Contains the core business logic without any I/O concerns.

mod id;
mod task;
mod graph;
mod conflict;

pub use id::{IdError, TaskId};
pub use task::{AcceptanceCriterion, HistoryEntry, Patch, Priority, Status, Task};
pub(crate) use task::one_or_many;
pub use graph::{DependencyGraph, GraphError};
pub use conflict::{
    Action, ActionKind, Conflict, ConflictKind, ConflictSummary, InvalidStrategy, ResolutionPlan,
    Strategy,
};
