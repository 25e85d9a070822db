//! Top-level error taxonomy of a pipeline run.

use thiserror::Error;

use crate::config::ConfigError;
use crate::engine::EngineError;
use crate::export::ExportError;
use crate::samples::SampleSetError;
use crate::search::SearchError;
use crate::storage::StorageError;
use crate::task::GraphError;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A required input does not exist. Detected during dependency resolution.
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Sample reconciliation failed: {0}")]
    SampleSet(#[from] SampleSetError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Search cluster error: {0}")]
    Search(#[from] SearchError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Task {task} failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl From<ExportError> for PipelineError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Engine(e) => Self::Engine(e),
            ExportError::Search(e) => Self::Search(e),
        }
    }
}

impl PipelineError {
    pub fn task_failed(task: impl ToString, source: PipelineError) -> Self {
        Self::TaskFailed {
            task: task.to_string(),
            source: Box::new(source),
        }
    }

    /// Whether retrying the run could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::Search(e) => e.is_transient(),
            Self::TaskFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }
}
