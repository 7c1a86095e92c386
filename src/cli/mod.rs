//! # Command-Line Interface
//!
//! | Command | Purpose |
//! |---------|---------|
//! | `init` | create the task folder |
//! | `task create\|list\|view\|edit\|archive\|search` | work with tasks |
//! | `doctor [--fix]` | find and repair ID conflicts after merges |
//! | `mcp` | serve the task tools over MCP (stdio) |
//!
//! ## Output Formats
//!
//! All commands support `--format`:
//! - `text` (default) - Human-readable output
//! - `json` - Machine-parseable JSON
//!
//! Logs go to stderr; `--verbose` or `RUST_LOG` turns them up.
//!
//! ## Entry Point
//!
//! Parse a [`Cli`] and hand it to [`run()`].

mod app;
mod doctor;
mod output;
mod session;
mod task;

pub use app::{run, Cli, Commands};
pub use output::{Output, OutputFormat};
