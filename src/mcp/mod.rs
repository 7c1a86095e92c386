//! # MCP Server
//!
//! `backlog mcp` speaks the Model Context Protocol over stdio so agents can
//! work with the task folder directly. Requests are newline-delimited
//! JSON-RPC 2.0; logs stay on stderr.
//!
//! | Tool | Purpose |
//! |------|---------|
//! | `task_create`, `task_batch_create` | create tasks |
//! | `task_edit` | change fields, criteria, links |
//! | `task_view` | one task |
//! | `task_list`, `task_search` | filtered, sorted, paged listings |
//! | `task_archive` | move a task into the archive |
//!
//! Tool payloads use the same JSON shapes as `--format json`. Failures come
//! back as tool results with `isError` set and a `{code, message}` payload.

mod protocol;
mod server;
mod tools;

pub use protocol::JsonRpcRequest;
pub use server::McpServer;
pub use tools::{Change, ToolError};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
