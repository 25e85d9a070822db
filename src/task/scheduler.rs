//! Executes a resolved task graph.
//!
//! Ready tasks run concurrently on a `JoinSet`, at most `workers` at a time. The first
//! failure stops new work; tasks already running are drained before the error returns.
//! Outputs of tasks that finished stay in place, so a rerun resumes from them.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info};

use super::graph::{GraphError, TaskGraph};
use super::registry::{TaskContext, TaskRegistry};
use super::spec::TaskSpec;
use crate::error::PipelineError;

/// What one invocation did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tasks run, in completion order
    pub executed: Vec<String>,
    /// Tasks found complete during resolution
    pub already_complete: Vec<String>,
}

pub struct Scheduler {
    registry: Arc<TaskRegistry>,
    ctx: Arc<TaskContext>,
    workers: usize,
}

impl Scheduler {
    pub fn new(registry: Arc<TaskRegistry>, ctx: Arc<TaskContext>) -> Self {
        let workers = ctx.config.workers.max(1);
        Self {
            registry,
            ctx,
            workers,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Resolve `root` and run every pending task it depends on, then `root` itself.
    pub async fn run(&self, root: TaskSpec) -> Result<RunSummary, PipelineError> {
        let graph = TaskGraph::resolve(root, &self.registry, &self.ctx).await?;
        let mut summary = RunSummary {
            executed: Vec::new(),
            already_complete: graph
                .already_complete()
                .iter()
                .map(|spec| spec.to_string())
                .collect(),
        };
        if graph.is_empty() {
            info!("Nothing to do: all requested tasks are complete");
            return Ok(summary);
        }

        let nodes = graph.nodes();
        let mut waiting_on: Vec<usize> = nodes.iter().map(|n| n.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for &dep in &node.dependencies {
                dependents[dep].push(i);
            }
        }
        let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| waiting_on[i] == 0).collect();
        let mut running: JoinSet<(usize, Result<(), PipelineError>)> = JoinSet::new();
        let mut first_error: Option<PipelineError> = None;

        loop {
            while first_error.is_none() && running.len() < self.workers {
                let Some(index) = ready.pop() else { break };
                let node = &nodes[index];
                let handler = Arc::clone(&node.handler);
                let spec = node.spec.clone();
                let ctx = Arc::clone(&self.ctx);
                info!("Running {}", spec);
                running.spawn(async move {
                    let result = match handler.run(&spec, &ctx).await {
                        Ok(()) => match handler.complete(&spec, &ctx).await {
                            Ok(true) => Ok(()),
                            Ok(false) => Err(GraphError::IncompleteAfterRun(spec.to_string()).into()),
                            Err(e) => Err(e),
                        },
                        Err(e) => Err(e),
                    };
                    (index, result)
                });
            }

            let Some(joined) = running.join_next().await else { break };
            match joined {
                Ok((index, Ok(()))) => {
                    let spec = &nodes[index].spec;
                    info!("Finished {} -> {}", spec, nodes[index].output);
                    summary.executed.push(spec.to_string());
                    for &next in &dependents[index] {
                        waiting_on[next] -= 1;
                        if waiting_on[next] == 0 {
                            ready.push(next);
                        }
                    }
                }
                Ok((index, Err(e))) => {
                    let spec = &nodes[index].spec;
                    error!("{} failed: {}", spec, e);
                    if first_error.is_none() {
                        first_error = Some(PipelineError::task_failed(spec, e));
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(GraphError::Join(join_err.to_string()).into());
                    }
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }
}
