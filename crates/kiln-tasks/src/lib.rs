//! Kiln Tasks - Task orchestration engine
//!
//! This crate provides the task registry and scheduler, pipeline steps,
//! file watching, live-reload notifications and the step cache.

pub mod asset;
pub mod cache;
pub mod clean;
pub mod graph;
pub mod orchestrator;
pub mod pipeline;
pub mod reload;
pub mod reporter;
pub mod scheduler;
pub mod server;
pub mod source;
pub mod steps;
pub mod task;
pub mod watch;

pub use asset::Asset;
pub use cache::{CacheEntry, CacheError, CacheKey, CacheStats, PruneStats, TaskCache};
pub use graph::{GraphError, PlanNode, TaskGraph};
pub use orchestrator::{Orchestrator, OrchestratorError, DEFAULT_EXPORT};
pub use reload::{ReloadChannel, ReloadEvent};
pub use reporter::{CollectingReporter, TaskEvent, TaskReporter, TaskReporterRegistry, TracingReporter};
pub use scheduler::{RunReport, SchedulerOptions, TaskResult, TaskScheduler, TaskStatus};
pub use server::DevServer;
pub use source::SourceError;
pub use steps::{PipelineOutcome, StepError};
pub use task::{Runnable, TaskError};
pub use watch::{WatchError, WatchRule};
