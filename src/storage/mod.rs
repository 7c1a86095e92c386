//! # Storage Layer
//!
//! Persistence for backlog in plain, git-friendly files.
//!
//! ## Storage Formats
//!
//! | Data | Format | Location |
//! |------|--------|----------|
//! | Tasks | Markdown + YAML frontmatter | `.backlog/T{id}-{slug}.md` |
//! | Archived tasks | Same as tasks | `.backlog/archived/T{id}-{slug}.md` |
//! | Config | TOML | `.backlog/config.toml` |
//!
//! ## Concurrency
//!
//! - Writes are atomic (temp file + rename)
//! - No locking: concurrent edits happen on git branches and come back
//!   as conflicts for [`crate::conflict`] to repair
//!
//! ## Key Types
//!
//! - [`Project`] - An initialized task folder plus its config
//! - [`TaskStore`] - Read/write tasks as markdown files
//! - [`Config`] - Project and global configuration

pub mod markdown;
pub mod query;
mod store;
mod config;
mod project;

pub use markdown::CodecError;
pub use query::{ListParams, ListResult, Pagination, SortKey};
pub use store::{CreateParams, StoreError, StoreResult, TaskStore, UpdateParams};
pub use config::{Config, ConfigError, GlobalConfig, OutputFormat, ProjectConfig};
pub use project::{Project, ProjectError};
