//! Task scheduler: recursive async executor over series and parallel groups

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use kiln_core::{GroupMode, TaskConfig};
use tracing::instrument;

use crate::graph::TaskGraph;
use crate::orchestrator::{Orchestrator, OrchestratorError};
use crate::reporter::TaskEvent;
use crate::task::Runnable;

/// Result of a single task execution
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Task that was executed
    pub name: String,
    /// How the task ended
    pub status: TaskStatus,
    /// How long the task took
    pub duration: Duration,
    /// Files written
    pub outputs: Vec<PathBuf>,
    /// Recoverable errors logged while running
    pub warnings: Vec<String>,
}

impl TaskResult {
    fn new(name: &str, status: TaskStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
            duration: Duration::ZERO,
            outputs: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Task execution status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Task completed successfully
    Success,
    /// Every external step was served from the cache
    CacheHit,
    /// Task completed after logging recoverable errors
    Recovered,
    /// Task failed
    Failed(String),
    /// Task was skipped
    Skipped,
}

impl TaskStatus {
    /// Check if this status represents success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::CacheHit | Self::Recovered)
    }

    /// Check if this status represents a failure
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Options for a run
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Report every task as skipped instead of running it
    pub dry_run: bool,
    /// Whether to use the step cache
    pub use_cache: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            use_cache: true,
        }
    }
}

/// Outcome of running one target
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Target that was run
    pub target: String,
    /// Per-task results in plan order
    pub results: Vec<TaskResult>,
    /// Wall-clock time of the run
    pub duration: Duration,
}

impl RunReport {
    /// Whether no task failed
    pub fn success(&self) -> bool {
        !self.results.iter().any(|r| r.status.is_failure())
    }

    /// Number of tasks that succeeded (including cached and recovered)
    pub fn succeeded(&self) -> usize {
        self.count(TaskStatus::is_success)
    }

    /// Number of failed tasks
    pub fn failed(&self) -> usize {
        self.count(TaskStatus::is_failure)
    }

    /// Number of tasks served from the cache
    pub fn cached(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::CacheHit))
    }

    /// Number of skipped tasks
    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, TaskStatus::Skipped))
    }

    /// Result of a task by name (first occurrence)
    pub fn result(&self, name: &str) -> Option<&TaskResult> {
        self.results.iter().find(|r| r.name == name)
    }

    fn count(&self, pred: impl Fn(&TaskStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }
}

/// Task scheduler: runs a target's tree of tasks and groups
pub struct TaskScheduler {
    orchestrator: Arc<Orchestrator>,
    options: SchedulerOptions,
}

impl TaskScheduler {
    /// Create a new scheduler
    pub fn new(orchestrator: Arc<Orchestrator>, options: SchedulerOptions) -> Self {
        Self {
            orchestrator,
            options,
        }
    }

    /// Run a registered task or group
    #[instrument(skip(self), fields(dry_run = self.options.dry_run))]
    pub async fn execute(&self, target: &str) -> Result<RunReport, OrchestratorError> {
        let graph = self.orchestrator.graph()?;
        if !graph.contains(target) {
            return Err(OrchestratorError::UnknownTask(target.to_string()));
        }

        let start = Instant::now();
        let results = self.run_node(target, &graph).await;
        let report = RunReport {
            target: target.to_string(),
            results,
            duration: start.elapsed(),
        };

        self.orchestrator.reporter().report(&TaskEvent::AllCompleted {
            total: report.results.len(),
            succeeded: report.succeeded(),
            failed: report.failed(),
            cached: report.cached(),
            duration: report.duration,
        });

        Ok(report)
    }

    fn run_node<'a>(&'a self, name: &'a str, graph: &'a TaskGraph) -> BoxFuture<'a, Vec<TaskResult>> {
        async move {
            let Some(runnable) = self.orchestrator.get(name) else {
                // The graph was built from the same registry
                return vec![TaskResult::new(
                    name,
                    TaskStatus::Failed(format!("unknown task '{}'", name)),
                )];
            };

            match runnable {
                Runnable::Task(task) => vec![self.run_task(name, task).await],
                Runnable::Group(group) => {
                    self.orchestrator.reporter().report(&TaskEvent::GroupStarted {
                        name: name.to_string(),
                        mode: group.mode,
                        members: group.tasks.len(),
                    });

                    match group.mode {
                        GroupMode::Series => {
                            let mut results = Vec::new();
                            for (i, member) in group.tasks.iter().enumerate() {
                                let member_results = self.run_node(member, graph).await;
                                let failed = member_results.iter().any(|r| r.status.is_failure());
                                results.extend(member_results);
                                if failed {
                                    for rest in &group.tasks[i + 1..] {
                                        results.extend(self.skip(rest, graph, "an earlier task failed"));
                                    }
                                    break;
                                }
                            }
                            results
                        }
                        GroupMode::Parallel => join_all(
                            group.tasks.iter().map(|member| self.run_node(member, graph)),
                        )
                        .await
                        .into_iter()
                        .flatten()
                        .collect(),
                    }
                }
            }
        }
        .boxed()
    }

    /// Mark every task under `name` as skipped
    fn skip(&self, name: &str, graph: &TaskGraph, reason: &str) -> Vec<TaskResult> {
        graph
            .leaves(name)
            .into_iter()
            .map(|leaf| {
                self.orchestrator.reporter().report(&TaskEvent::Skipped {
                    name: leaf.clone(),
                    reason: reason.to_string(),
                });
                TaskResult::new(&leaf, TaskStatus::Skipped)
            })
            .collect()
    }

    async fn run_task(&self, name: &str, task: &TaskConfig) -> TaskResult {
        let reporter = self.orchestrator.reporter();

        if self.options.dry_run {
            reporter.report(&TaskEvent::Skipped {
                name: name.to_string(),
                reason: "dry run".to_string(),
            });
            return TaskResult::new(name, TaskStatus::Skipped);
        }

        let start = Instant::now();
        reporter.report(&TaskEvent::Started {
            name: name.to_string(),
            kind: task.kind().to_string(),
        });

        match self.orchestrator.execute_task(name, task, &self.options).await {
            Ok(outcome) => {
                let duration = start.elapsed();
                let cached = outcome.fully_cached();
                let status = if !outcome.warnings.is_empty() {
                    TaskStatus::Recovered
                } else if cached {
                    TaskStatus::CacheHit
                } else {
                    TaskStatus::Success
                };
                reporter.report(&TaskEvent::Completed {
                    name: name.to_string(),
                    duration,
                    outputs: outcome.written.len(),
                    cached,
                });
                TaskResult {
                    name: name.to_string(),
                    status,
                    duration,
                    outputs: outcome.written,
                    warnings: outcome.warnings,
                }
            }
            Err(e) => {
                let duration = start.elapsed();
                let error = e.to_string();
                reporter.report(&TaskEvent::Failed {
                    name: name.to_string(),
                    duration,
                    error: error.clone(),
                });
                TaskResult {
                    duration,
                    ..TaskResult::new(name, TaskStatus::Failed(error))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{GroupConfig, PipelineConfig, StepConfig};

    use crate::reporter::CollectingReporter;

    #[test]
    fn test_task_status_is_success() {
        assert!(TaskStatus::Success.is_success());
        assert!(TaskStatus::CacheHit.is_success());
        assert!(TaskStatus::Recovered.is_success());
        assert!(!TaskStatus::Failed("error".to_string()).is_success());
        assert!(TaskStatus::Failed("error".to_string()).is_failure());
        assert!(!TaskStatus::Skipped.is_success());
        assert!(!TaskStatus::Skipped.is_failure());
    }

    #[test]
    fn test_scheduler_options_default() {
        let opts = SchedulerOptions::default();
        assert!(opts.use_cache);
        assert!(!opts.dry_run);
    }

    #[test]
    fn test_run_report_counts() {
        let report = RunReport {
            target: "build".to_string(),
            results: vec![
                TaskResult::new("a", TaskStatus::Success),
                TaskResult::new("b", TaskStatus::CacheHit),
                TaskResult::new("c", TaskStatus::Failed("boom".to_string())),
                TaskResult::new("d", TaskStatus::Skipped),
            ],
            duration: Duration::ZERO,
        };
        assert!(!report.success());
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cached(), 1);
        assert_eq!(report.skipped(), 1);
        assert!(report.result("c").is_some());
    }

    #[tokio::test]
    async fn test_execute_dry_run() {
        let reporter = Arc::new(CollectingReporter::default());
        let mut orchestrator = Orchestrator::new("/nonexistent").with_reporter(reporter.clone());
        orchestrator
            .register_task(
                "common-js",
                TaskConfig::Pipeline(
                    PipelineConfig::new(["src/js/common.js"]).step(StepConfig::dest("dist/js")),
                ),
            )
            .unwrap();
        orchestrator.register_task("reload", TaskConfig::Reload).unwrap();
        orchestrator
            .register_group("js", GroupConfig::series(["common-js", "reload"]))
            .unwrap();

        let scheduler = TaskScheduler::new(
            Arc::new(orchestrator),
            SchedulerOptions {
                dry_run: true,
                ..Default::default()
            },
        );
        let report = scheduler.execute("js").await.unwrap();

        assert_eq!(report.results.len(), 2);
        assert!(report.results.iter().all(|r| r.status == TaskStatus::Skipped));
        assert!(report.success());
        assert!(reporter.started().is_empty());
    }

    #[tokio::test]
    async fn test_execute_unknown_target() {
        let scheduler = TaskScheduler::new(
            Arc::new(Orchestrator::new("/nonexistent")),
            SchedulerOptions::default(),
        );
        assert!(matches!(
            scheduler.execute("missing").await.unwrap_err(),
            OrchestratorError::UnknownTask(_)
        ));
    }
}
