//! backlog - git-native task tracking
//!
//! Tasks are markdown files addressed by hierarchical IDs (`T1`, `T1.2`).
//! IDs are allocated per branch, so merges can collide; [`conflict`] finds
//! and repairs those collisions without breaking parent or dependency links.

pub mod domain;
pub mod storage;
pub mod conflict;
pub mod git;
pub mod mcp;
pub mod cli;

pub use domain::{Task, TaskId};
