//! Dependency graph for tasks
//!
//! Answers "who depends on this task" for queries and refuses dependency
//! edits that would close a cycle. Uses petgraph for graph operations.
//!
//! Merged task folders are not guaranteed to be clean, so building a graph
//! from existing tasks is lenient: dependencies on unknown IDs are skipped
//! and pre-existing cycles are kept as they are. Only new edges added with
//! [`DependencyGraph::add_dependency`] are checked.

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;
use thiserror::Error;

use super::id::TaskId;
use super::task::Task;

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("Adding dependency would create a cycle: {0} -> {1}")]
    CycleDetected(TaskId, TaskId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Self-dependency not allowed: {0}")]
    SelfDependency(TaskId),
}

/// A dependency graph for tasks
///
/// Edges point from a dependency to the task that waits on it.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<TaskId, ()>,
    node_map: HashMap<TaskId, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a collection of tasks
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut graph = Self::new();

        let tasks: Vec<_> = tasks.into_iter().collect();
        for task in &tasks {
            graph.add_task(task.id.clone());
        }

        for task in &tasks {
            let task_idx = graph.node_map[&task.id];
            for dep_id in &task.dependencies {
                if let Some(&dep_idx) = graph.node_map.get(dep_id) {
                    if dep_idx != task_idx && graph.graph.find_edge(dep_idx, task_idx).is_none() {
                        graph.graph.add_edge(dep_idx, task_idx, ());
                    }
                }
            }
        }

        graph
    }

    /// Adds a task to the graph
    pub fn add_task(&mut self, task_id: TaskId) {
        if !self.node_map.contains_key(&task_id) {
            let idx = self.graph.add_node(task_id.clone());
            self.node_map.insert(task_id, idx);
        }
    }

    /// Adds a dependency edge: `task` depends on `depends_on`
    pub fn add_dependency(&mut self, task: &TaskId, depends_on: &TaskId) -> Result<(), GraphError> {
        if task == depends_on {
            return Err(GraphError::SelfDependency(task.clone()));
        }

        let task_idx = *self
            .node_map
            .get(task)
            .ok_or_else(|| GraphError::TaskNotFound(task.clone()))?;

        let dep_idx = *self
            .node_map
            .get(depends_on)
            .ok_or_else(|| GraphError::TaskNotFound(depends_on.clone()))?;

        if self.graph.find_edge(dep_idx, task_idx).is_some() {
            return Ok(());
        }

        // dep -> task closes a cycle iff task already reaches dep
        if has_path_connecting(&self.graph, task_idx, dep_idx, None) {
            return Err(GraphError::CycleDetected(task.clone(), depends_on.clone()));
        }

        self.graph.add_edge(dep_idx, task_idx, ());
        Ok(())
    }

    /// Drops every dependency edge of `task`
    pub fn clear_dependencies(&mut self, task: &TaskId) {
        let Some(&task_idx) = self.node_map.get(task) else {
            return;
        };

        // removal shifts edge indices, so always take the first remaining edge
        while let Some(edge) = self
            .graph
            .edges_directed(task_idx, petgraph::Direction::Incoming)
            .next()
            .map(|edge| edge.id())
        {
            self.graph.remove_edge(edge);
        }
    }

    /// Returns the direct dependencies of a task
    pub fn dependencies(&self, task_id: &TaskId) -> Vec<TaskId> {
        self.neighbors(task_id, petgraph::Direction::Incoming)
    }

    /// Returns the direct dependents of a task (tasks that depend on it)
    pub fn dependents(&self, task_id: &TaskId) -> Vec<TaskId> {
        self.neighbors(task_id, petgraph::Direction::Outgoing)
    }

    /// Returns true if any task depends on `task_id`
    pub fn has_dependents(&self, task_id: &TaskId) -> bool {
        self.node_map.get(task_id).is_some_and(|&idx| {
            self.graph
                .neighbors_directed(idx, petgraph::Direction::Outgoing)
                .next()
                .is_some()
        })
    }

    fn neighbors(&self, task_id: &TaskId, direction: petgraph::Direction) -> Vec<TaskId> {
        let Some(&idx) = self.node_map.get(task_id) else {
            return vec![];
        };

        let mut ids: Vec<_> = self
            .graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        ids.sort();
        ids
    }

    /// Returns true if the graph contains the task
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.node_map.contains_key(task_id)
    }

    /// Returns the number of tasks in the graph
    pub fn len(&self) -> usize {
        self.node_map.len()
    }

    /// Returns true if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.node_map.is_empty()
    }
}
