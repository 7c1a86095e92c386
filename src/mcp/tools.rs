//! Task tools exposed over MCP
//!
//! Each tool takes a JSON object of arguments and returns the same task and
//! list shapes the CLI prints with `--format json`.

use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::{GraphError, IdError, Patch, Priority, Status, TaskId};
use crate::storage::{
    CreateParams, ListParams, ProjectConfig, SortKey, StoreError, TaskStore, UpdateParams,
};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Created {created} of {total} tasks, then: {source}")]
    Batch {
        created: usize,
        total: usize,
        #[source]
        source: StoreError,
    },
}

impl ToolError {
    /// Stable code reported to clients next to the message
    pub fn code(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "UNKNOWN_TOOL",
            ToolError::InvalidArguments(_) => "INVALID_INPUT",
            ToolError::Store(e) | ToolError::Batch { source: e, .. } => store_code(e),
        }
    }
}

fn store_code(e: &StoreError) -> &'static str {
    match e {
        StoreError::NotFound(_) => "TASK_NOT_FOUND",
        StoreError::ParentNotFound(_) => "PARENT_TASK_NOT_FOUND",
        StoreError::AlreadyArchived(_) => "ALREADY_ARCHIVED",
        StoreError::Id(IdError::InvalidFormat(_)) => "INVALID_TASK_ID",
        StoreError::Dependency(GraphError::CycleDetected(..)) => "CYCLIC_DEPENDENCY",
        StoreError::Dependency(_) | StoreError::SelfParent(_) | StoreError::CriterionNotFound(_) => {
            "INVALID_INPUT"
        }
        StoreError::MalformedFile { .. } => "PARSE_ERROR",
        _ => "STORAGE_ERROR",
    }
}

/// Files a tool call touched, for auto-commit
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub action: &'static str,
    pub subject: String,
    pub paths: Vec<PathBuf>,
    pub old_paths: Vec<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateArgs {
    pub title: String,
    pub description: String,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub parent: Option<TaskId>,
    pub assigned: Vec<String>,
    pub labels: Vec<String>,
    pub dependencies: Vec<TaskId>,
    pub ac: Vec<String>,
    pub plan: String,
    pub notes: String,
}

impl CreateArgs {
    fn into_params(self) -> Result<CreateParams, ToolError> {
        if self.title.trim().is_empty() {
            return Err(ToolError::InvalidArguments("title must not be empty".to_string()));
        }
        Ok(CreateParams {
            title: self.title,
            description: self.description,
            status: self.status,
            priority: self.priority,
            parent: self.parent,
            assigned: self.assigned,
            labels: self.labels,
            dependencies: self.dependencies,
            acceptance_criteria: self.ac,
            plan: self.plan,
            notes: self.notes,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchCreateArgs {
    pub new_tasks: Vec<CreateArgs>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EditArgs {
    pub id: String,
    pub new_title: Option<String>,
    pub new_description: Option<String>,
    pub new_status: Option<Status>,
    pub new_priority: Option<Priority>,
    /// An empty string detaches the task from its parent
    pub new_parent: Option<String>,
    pub add_assigned: Vec<String>,
    pub remove_assigned: Vec<String>,
    pub add_labels: Vec<String>,
    pub remove_labels: Vec<String>,
    pub new_dependencies: Option<Vec<TaskId>>,
    pub new_notes: Option<String>,
    pub append_notes: Vec<String>,
    pub new_plan: Option<String>,
    pub add_ac: Vec<String>,
    pub check_ac: Vec<usize>,
    pub uncheck_ac: Vec<usize>,
    pub remove_ac: Vec<usize>,
}

impl EditArgs {
    fn into_params(self) -> Result<UpdateParams, ToolError> {
        let parent = match self.new_parent {
            None => Patch::Unchanged,
            Some(p) if p.trim().is_empty() => Patch::Set(None),
            Some(p) => Patch::Set(Some(p.trim().parse::<TaskId>().map_err(StoreError::from)?)),
        };
        Ok(UpdateParams {
            title: self.new_title.into(),
            description: self.new_description.into(),
            status: self.new_status.into(),
            priority: self.new_priority.into(),
            parent,
            dependencies: self.new_dependencies.into(),
            add_assigned: self.add_assigned,
            remove_assigned: self.remove_assigned,
            add_labels: self.add_labels,
            remove_labels: self.remove_labels,
            notes: self.new_notes.into(),
            append_notes: self.append_notes,
            plan: self.new_plan.into(),
            remove_criteria: self.remove_ac,
            check_criteria: self.check_ac,
            uncheck_criteria: self.uncheck_ac,
            add_criteria: self.add_ac,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdArgs {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListArgs {
    pub parent: Option<TaskId>,
    pub status: Vec<Status>,
    pub assigned: Vec<String>,
    pub labels: Vec<String>,
    pub priority: Option<Priority>,
    pub unassigned: bool,
    pub has_dependency: bool,
    pub depended_on: bool,
    pub sort: Vec<String>,
    pub reverse: bool,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl ListArgs {
    fn into_params(self, config: &ProjectConfig) -> ListParams {
        let sort = if self.sort.is_empty() {
            config.default_sort.clone()
        } else {
            self.sort.join(",")
        };
        ListParams {
            statuses: self.status,
            assigned: self.assigned,
            labels: self.labels,
            parent: self.parent,
            priority: self.priority,
            unassigned: self.unassigned,
            has_dependency: self.has_dependency,
            depended_on: self.depended_on,
            sort: SortKey::parse_list(&sort),
            reverse: self.reverse,
            limit: self.limit.unwrap_or(config.page_size),
            offset: self.offset,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchArgs {
    pub query: String,
    #[serde(default)]
    pub filters: Option<ListArgs>,
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Runs one tool; files it writes are appended to `changes`
pub fn call(
    store: &TaskStore,
    config: &ProjectConfig,
    name: &str,
    arguments: Value,
    changes: &mut Vec<Change>,
) -> Result<Value, ToolError> {
    match name {
        "task_create" => {
            let params = parse::<CreateArgs>(arguments)?.into_params()?;
            let task = store.create(params)?;
            changes.push(Change {
                action: "create",
                subject: task.id.to_string(),
                paths: vec![store.path(&task)],
                old_paths: Vec::new(),
            });
            Ok(to_value(&task))
        }

        "task_batch_create" => {
            let args: BatchCreateArgs = parse(arguments)?;
            let total = args.new_tasks.len();
            let params = args
                .new_tasks
                .into_iter()
                .map(CreateArgs::into_params)
                .collect::<Result<Vec<_>, _>>()?;

            let mut tasks = Vec::with_capacity(total);
            let mut failure = None;
            for p in params {
                match store.create(p) {
                    Ok(task) => tasks.push(task),
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }

            if !tasks.is_empty() {
                let ids: Vec<String> = tasks.iter().map(|t| t.id.to_string()).collect();
                changes.push(Change {
                    action: "create",
                    subject: ids.join(", "),
                    paths: tasks.iter().map(|t| store.path(t)).collect(),
                    old_paths: Vec::new(),
                });
            }
            match failure {
                Some(source) => Err(ToolError::Batch {
                    created: tasks.len(),
                    total,
                    source,
                }),
                None => Ok(json!({ "tasks": tasks })),
            }
        }

        "task_edit" => {
            let args: EditArgs = parse(arguments)?;
            let task = store.get(&args.id)?;
            let old_path = store.find(&task.id)?.unwrap_or_else(|| store.path(&task));

            let updated = store.update(&task, args.into_params()?)?;
            if updated.history.len() != task.history.len() {
                let new_path = store.path(&updated);
                let old_paths = if old_path != new_path { vec![old_path] } else { Vec::new() };
                changes.push(Change {
                    action: "edit",
                    subject: updated.id.to_string(),
                    paths: vec![new_path],
                    old_paths,
                });
            }
            Ok(to_value(&updated))
        }

        "task_view" => {
            let args: IdArgs = parse(arguments)?;
            Ok(to_value(&store.get(&args.id)?))
        }

        "task_list" => {
            let params = parse::<ListArgs>(arguments)?.into_params(config);
            Ok(to_value(&store.list(&params)?))
        }

        "task_search" => {
            let args: SearchArgs = parse(arguments)?;
            if args.query.trim().is_empty() {
                return Err(ToolError::InvalidArguments("query must not be empty".to_string()));
            }
            let params = args.filters.unwrap_or_default().into_params(config);
            Ok(to_value(&store.search(&args.query, &params)?))
        }

        "task_archive" => {
            let args: IdArgs = parse(arguments)?;
            let id: TaskId = args.id.trim().parse().map_err(StoreError::from)?;
            let old_path = store.find(&id)?;

            let archived = store.archive(&id)?;
            changes.push(Change {
                action: "archive",
                subject: id.to_string(),
                paths: vec![archived.clone()],
                old_paths: old_path.into_iter().collect(),
            });
            Ok(to_value(&store.read_file(&archived)?))
        }

        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

fn create_properties() -> Value {
    json!({
        "title": { "type": "string", "description": "Task title" },
        "description": { "type": "string" },
        "status": { "type": "string", "description": "todo, in-progress, in-review, done, cancelled or rejected" },
        "priority": { "type": "string", "enum": ["low", "medium", "high", "critical"] },
        "parent": { "type": "string", "description": "Parent task ID; the new ID is allocated under it" },
        "assigned": { "type": "array", "items": { "type": "string" } },
        "labels": { "type": "array", "items": { "type": "string" } },
        "dependencies": { "type": "array", "items": { "type": "string" } },
        "ac": { "type": "array", "items": { "type": "string" }, "description": "Acceptance criteria" },
        "plan": { "type": "string" },
        "notes": { "type": "string" }
    })
}

fn list_properties() -> Value {
    json!({
        "parent": { "type": "string" },
        "status": { "type": "array", "items": { "type": "string" } },
        "assigned": { "type": "array", "items": { "type": "string" } },
        "labels": { "type": "array", "items": { "type": "string" } },
        "priority": { "type": "string", "enum": ["low", "medium", "high", "critical"] },
        "unassigned": { "type": "boolean" },
        "has_dependency": { "type": "boolean" },
        "depended_on": { "type": "boolean" },
        "sort": { "type": "array", "items": { "type": "string", "enum": ["id", "title", "status", "priority", "created", "updated"] } },
        "reverse": { "type": "boolean" },
        "limit": { "type": "integer", "minimum": 0 },
        "offset": { "type": "integer", "minimum": 0 }
    })
}

/// `tools/list` entries
pub fn definitions() -> Vec<Value> {
    let id_only = json!({
        "type": "object",
        "properties": { "id": { "type": "string", "description": "Task ID, e.g. T1.2" } },
        "required": ["id"],
        "additionalProperties": false
    });

    vec![
        json!({
            "name": "task_create",
            "description": "Create a task. Returns the new task.",
            "inputSchema": {
                "type": "object",
                "properties": create_properties(),
                "required": ["title"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "task_batch_create",
            "description": "Create several tasks in order. Stops at the first failure.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "new_tasks": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": create_properties(),
                            "required": ["title"]
                        }
                    }
                },
                "required": ["new_tasks"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "task_edit",
            "description": "Edit a task. Only the fields given are changed. Criteria indices are 1-based.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "id": { "type": "string" },
                    "new_title": { "type": "string" },
                    "new_description": { "type": "string" },
                    "new_status": { "type": "string" },
                    "new_priority": { "type": "string", "enum": ["low", "medium", "high", "critical"] },
                    "new_parent": { "type": "string", "description": "Empty string removes the parent" },
                    "add_assigned": { "type": "array", "items": { "type": "string" } },
                    "remove_assigned": { "type": "array", "items": { "type": "string" } },
                    "add_labels": { "type": "array", "items": { "type": "string" } },
                    "remove_labels": { "type": "array", "items": { "type": "string" } },
                    "new_dependencies": { "type": "array", "items": { "type": "string" } },
                    "new_notes": { "type": "string" },
                    "append_notes": { "type": "array", "items": { "type": "string" } },
                    "new_plan": { "type": "string" },
                    "add_ac": { "type": "array", "items": { "type": "string" } },
                    "check_ac": { "type": "array", "items": { "type": "integer", "minimum": 1 } },
                    "uncheck_ac": { "type": "array", "items": { "type": "integer", "minimum": 1 } },
                    "remove_ac": { "type": "array", "items": { "type": "integer", "minimum": 1 } }
                },
                "required": ["id"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "task_view",
            "description": "Show one task.",
            "inputSchema": id_only.clone()
        }),
        json!({
            "name": "task_list",
            "description": "List active tasks with filters, sorting and paging.",
            "inputSchema": {
                "type": "object",
                "properties": list_properties(),
                "additionalProperties": false
            }
        }),
        json!({
            "name": "task_search",
            "description": "Search task text, labels and assignees (case-insensitive).",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "filters": { "type": "object", "properties": list_properties() }
                },
                "required": ["query"],
                "additionalProperties": false
            }
        }),
        json!({
            "name": "task_archive",
            "description": "Move a task into the archive.",
            "inputSchema": id_only
        }),
    ]
}
