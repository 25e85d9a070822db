//! # seqr-loading
//!
//! Restartable orchestration for loading genomic variant callsets into a search index.
//!
//! This library provides:
//! - A task graph whose nodes are complete exactly when their outputs carry a durable
//!   `_SUCCESS` marker, so an interrupted run resumes where it stopped
//! - Callset import, contig and sample-type validation, and sample remapping/subsetting
//!   issued against a dataframe engine
//! - Index export with shard sizing and loading-node routing
//!
//! ## Task Flow
//! 1. Resolve the requested task and its incomplete dependencies
//! 2. Run ready tasks concurrently, dependencies first
//! 3. Each task publishes its output atomically, then marks it complete
//!
//! ## Modules
//! - `task`: Task variants, dependency resolution and the scheduler
//! - `storage`: Local and GCS storage backends and output targets
//! - `engine`: Dataframe engine interface and the local engine
//! - `search`: Search cluster interface, HTTP client and in-memory cluster

pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod importer;
pub mod model;
pub mod paths;
pub mod samples;
pub mod search;
pub mod storage;
pub mod task;
pub mod util;
pub mod validation;

pub use config::Config;
pub use error::PipelineError;
pub use model::{DatasetType, GenomeVersion, SampleType};
pub use task::{RunSummary, Scheduler, TaskRegistry, TaskSpec};
