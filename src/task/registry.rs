use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::graph::GraphError;
use super::handlers;
use super::spec::{TaskKind, TaskSpec};
use crate::config::Config;
use crate::engine::DataFrameEngine;
use crate::error::PipelineError;
use crate::paths::PathLayout;
use crate::search::SearchCluster;
use crate::storage::{StorageRouter, Target};

/// Collaborators shared by every task of a run.
#[derive(Clone)]
pub struct TaskContext {
    pub config: Config,
    pub layout: PathLayout,
    pub engine: Arc<dyn DataFrameEngine>,
    pub storage: StorageRouter,
    /// Required only by export tasks
    pub cluster: Option<Arc<dyn SearchCluster>>,
}

impl TaskContext {
    pub fn new(
        config: Config,
        engine: Arc<dyn DataFrameEngine>,
        storage: StorageRouter,
        cluster: Option<Arc<dyn SearchCluster>>,
    ) -> Self {
        Self {
            layout: config.layout(),
            config,
            engine,
            storage,
            cluster,
        }
    }
}

/// Behaviour of one task variant.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn kind(&self) -> TaskKind;

    fn requires(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<Vec<TaskSpec>, PipelineError>;

    fn output(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<Target, PipelineError>;

    /// Complete once the output carries its durable marker.
    async fn complete(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<bool, PipelineError> {
        Ok(self.output(spec, ctx)?.is_complete(&ctx.storage).await?)
    }

    async fn run(&self, spec: &TaskSpec, ctx: &TaskContext) -> Result<(), PipelineError>;
}

pub struct TaskRegistry {
    handlers: HashMap<TaskKind, Arc<dyn TaskHandler>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with a handler for every task variant.
    pub fn with_builtin_handlers() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(handlers::SourceFileHandler));
        registry.register(Arc::new(handlers::ReferenceTableHandler));
        registry.register(Arc::new(handlers::ImportCallsetHandler));
        registry.register(Arc::new(handlers::ReconcileSamplesHandler));
        registry.register(Arc::new(handlers::AnnotateVariantsHandler));
        registry.register(Arc::new(handlers::ExportToIndexHandler));
        registry
    }

    /// Register a handler, replacing any previous handler of the same kind.
    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn get(&self, kind: TaskKind) -> Result<Arc<dyn TaskHandler>, GraphError> {
        self.handlers
            .get(&kind)
            .cloned()
            .ok_or(GraphError::Unregistered(kind))
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<_> = self.handlers.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::with_builtin_handlers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_every_kind() {
        let registry = TaskRegistry::with_builtin_handlers();
        assert_eq!(
            registry.kinds(),
            vec![
                TaskKind::SourceFile,
                TaskKind::ReferenceTable,
                TaskKind::ImportCallset,
                TaskKind::ReconcileSamples,
                TaskKind::AnnotateVariants,
                TaskKind::ExportToIndex,
            ]
        );
        assert!(matches!(
            TaskRegistry::new().get(TaskKind::SourceFile),
            Err(GraphError::Unregistered(TaskKind::SourceFile))
        ));
    }
}
