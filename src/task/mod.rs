//! Task module - pipeline tasks, dependency resolution, and execution.
//!
//! Every task names its output location and its dependencies. A task is complete
//! exactly when its output carries the durable completion marker, so rerunning a
//! request after a failure resumes from the last published output.

mod graph;
mod handlers;
mod registry;
mod scheduler;
mod spec;

pub use graph::{GraphError, TaskGraph, TaskNode};
pub use handlers::{
    AnnotateVariantsHandler, ExportToIndexHandler, ImportCallsetHandler,
    ReconcileSamplesHandler, ReferenceTableHandler, SourceFileHandler,
};
pub use registry::{TaskContext, TaskHandler, TaskRegistry};
pub use scheduler::{RunSummary, Scheduler};
pub use spec::{
    AnnotateParams, CallsetParams, ExportParams, ReconcileParams, SampleParams, TaskKind,
    TaskSpec,
};
