//! Dependency resolution.
//!
//! # Invariants
//! - A task already complete at resolution time is not expanded: its dependencies are
//!   neither inspected nor scheduled
//! - Equal specs collapse into one node
//! - No two distinct specs share an output path

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use super::registry::{TaskContext, TaskHandler, TaskRegistry};
use super::spec::{TaskKind, TaskSpec};
use crate::error::PipelineError;
use crate::storage::Target;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Circular dependency between tasks: {}", .0.join(", "))]
    Cycle(Vec<String>),

    #[error("Tasks {first} and {second} both write to {path}")]
    OutputCollision {
        path: String,
        first: String,
        second: String,
    },

    #[error("No handler registered for {0} tasks")]
    Unregistered(TaskKind),

    #[error("Task {0} ran but its output is not marked complete")]
    IncompleteAfterRun(String),

    #[error("Handler for {expected} received a {found} task")]
    KindMismatch { expected: TaskKind, found: TaskKind },

    #[error("Task execution aborted: {0}")]
    Join(String),
}

/// A pending task with its resolved handler and incomplete dependencies.
pub struct TaskNode {
    pub spec: TaskSpec,
    pub handler: Arc<dyn TaskHandler>,
    pub output: Target,
    /// Indices of pending nodes this task waits on
    pub dependencies: Vec<usize>,
}

/// Pending tasks reachable from a root, plus the tasks found already complete.
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    already_complete: Vec<TaskSpec>,
}

impl TaskGraph {
    pub async fn resolve(
        root: TaskSpec,
        registry: &TaskRegistry,
        ctx: &TaskContext,
    ) -> Result<Self, PipelineError> {
        let mut nodes: Vec<TaskNode> = Vec::new();
        let mut already_complete = Vec::new();
        // None marks a spec found complete
        let mut seen: HashMap<TaskSpec, Option<usize>> = HashMap::new();
        let mut outputs: HashMap<String, TaskSpec> = HashMap::new();
        // (spec, dependent node)
        let mut queue: Vec<(TaskSpec, Option<usize>)> = vec![(root, None)];

        while let Some((spec, dependent)) = queue.pop() {
            let index = match seen.get(&spec) {
                Some(index) => *index,
                None => {
                    let handler = registry.get(spec.kind())?;
                    let output = handler.output(&spec, ctx)?;
                    if let Some(other) = outputs.get(output.path()) {
                        return Err(GraphError::OutputCollision {
                            path: output.path().to_string(),
                            first: other.to_string(),
                            second: spec.to_string(),
                        }
                        .into());
                    }
                    outputs.insert(output.path().to_string(), spec.clone());

                    if handler.complete(&spec, ctx).await? {
                        info!("Skipping {}: already complete", spec);
                        seen.insert(spec.clone(), None);
                        already_complete.push(spec);
                        None
                    } else {
                        let index = nodes.len();
                        for dep in handler.requires(&spec, ctx)? {
                            queue.push((dep, Some(index)));
                        }
                        seen.insert(spec.clone(), Some(index));
                        nodes.push(TaskNode {
                            spec,
                            handler,
                            output,
                            dependencies: Vec::new(),
                        });
                        Some(index)
                    }
                }
            };

            if let (Some(index), Some(dependent)) = (index, dependent) {
                let deps = &mut nodes[dependent].dependencies;
                if !deps.contains(&index) {
                    deps.push(index);
                }
            }
        }

        let graph = Self {
            nodes,
            already_complete,
        };
        graph.execution_order()?;
        Ok(graph)
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn already_complete(&self) -> &[TaskSpec] {
        &self.already_complete
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pending node indices, dependencies first.
    ///
    /// # Errors
    /// Returns `GraphError::Cycle` naming the tasks that can never become ready.
    pub fn execution_order(&self) -> Result<Vec<usize>, GraphError> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, node) in self.nodes.iter().enumerate() {
            for &dep in &node.dependencies {
                dependents[dep].push(i);
                in_degree[i] += 1;
            }
        }

        let mut queue: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(node) = queue.pop() {
            order.push(node);
            for &next in &dependents[node] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }

        if order.len() != n {
            let stuck = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| self.nodes[i].spec.to_string())
                .collect();
            return Err(GraphError::Cycle(stuck));
        }
        Ok(order)
    }
}
