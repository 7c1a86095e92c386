//! Request dispatch and the stdio loop

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::protocol::{self, JsonRpcRequest};
use super::tools::{self, ToolError};
use super::PROTOCOL_VERSION;
use crate::git::{AutoCommit, Committer, GitCli};
use crate::storage::{ProjectConfig, TaskStore};

/// MCP server over one task folder
///
/// Requests are handled one at a time, so tool calls never interleave.
pub struct McpServer<C = GitCli> {
    store: TaskStore,
    config: ProjectConfig,
    commits: Option<AutoCommit<C>>,
    initialized: bool,
}

impl<C: Committer> McpServer<C> {
    pub fn new(store: TaskStore, config: ProjectConfig, commits: Option<AutoCommit<C>>) -> Self {
        Self {
            store,
            config,
            commits,
            initialized: false,
        }
    }

    /// Handles one request; notifications get `None`
    pub fn handle(&mut self, request: JsonRpcRequest) -> Option<Value> {
        let JsonRpcRequest {
            method, id, params, ..
        } = request;

        if method == "initialize" {
            self.initialized = true;
            return Some(protocol::response(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "serverInfo": { "name": "backlog", "version": env!("CARGO_PKG_VERSION") },
                    "capabilities": { "tools": {} },
                    "instructions": "Tasks are markdown files addressed by IDs like T1 and T1.2. Use task_list or task_search to find work and task_edit to update it."
                }),
            ));
        }

        if id.is_none() {
            debug!(%method, "notification");
            return None;
        }

        if !self.initialized {
            return Some(protocol::error(id, protocol::NOT_INITIALIZED, "Server not initialized"));
        }

        let response = match method.as_str() {
            "ping" => protocol::response(id, json!({})),
            "tools/list" => protocol::response(id, json!({ "tools": tools::definitions() })),
            "tools/call" => self.call_tool(id, params),
            _ => protocol::error(
                id,
                protocol::METHOD_NOT_FOUND,
                &format!("Method not found: {}", method),
            ),
        };
        Some(response)
    }

    fn call_tool(&mut self, id: Option<Value>, params: Option<Value>) -> Value {
        let Some(params) = params.as_ref().and_then(Value::as_object) else {
            return protocol::error(id, protocol::INVALID_PARAMS, "params must be an object");
        };
        let Some(name) = params.get("name").and_then(Value::as_str) else {
            return protocol::error(id, protocol::INVALID_PARAMS, "params.name is required");
        };
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args) => args.clone(),
        };

        let mut changes = Vec::new();
        let result = tools::call(&self.store, &self.config, name, arguments, &mut changes);

        if let Some(commits) = &self.commits {
            for change in &changes {
                commits.record(change.action, &change.subject, &change.paths, &change.old_paths);
            }
        }

        match result {
            Ok(payload) => {
                debug!(tool = name, "tool call succeeded");
                protocol::response(id, protocol::tool_result(&payload, false))
            }
            Err(ToolError::UnknownTool(tool)) => protocol::error(
                id,
                protocol::INVALID_PARAMS,
                &format!("Unknown tool: {}", tool),
            ),
            Err(e) => {
                warn!(tool = name, code = e.code(), error = %e, "tool call failed");
                let payload = json!({ "code": e.code(), "message": e.to_string() });
                protocol::response(id, protocol::tool_result(&payload, true))
            }
        }
    }

    /// Serves newline-delimited JSON-RPC until the reader is exhausted
    pub fn serve<R: BufRead, W: Write>(&mut self, reader: R, mut writer: W) -> io::Result<()> {
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle(request),
                Err(e) => {
                    warn!(error = %e, "unparseable request");
                    Some(protocol::error(
                        None,
                        protocol::PARSE_ERROR,
                        &format!("Parse error: {}", e),
                    ))
                }
            };

            if let Some(response) = response {
                serde_json::to_writer(&mut writer, &response)?;
                writer.write_all(b"\n")?;
                writer.flush()?;
            }
        }
        Ok(())
    }
}
