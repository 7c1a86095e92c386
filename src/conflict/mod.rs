//! # ID conflict repair
//!
//! Task IDs are allocated independently on every branch, so a merge can
//! leave a folder with problems no single branch had:
//!
//! | Kind | Meaning |
//! |------|---------|
//! | `duplicate_id` | two or more files declare the same ID |
//! | `orphaned_child` | a declared parent does not exist |
//! | `invalid_hierarchy` | a declared parent disagrees with the dotted ID |
//!
//! [`ConflictDetector`] finds them, [`ConflictResolver`] turns them into a
//! [`crate::domain::ResolutionPlan`] and applies it, rewriting references to
//! renumbered IDs.

mod detector;
mod resolver;

pub use detector::{ConflictDetector, MalformedFile, Scan};
pub use resolver::{ConflictResolver, ExecutionError, ResolveError};
