//! Task execution reporting

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use kiln_core::GroupMode;

/// Events emitted during task execution
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task is starting execution
    Started {
        name: String,
        kind: String,
    },
    /// An external tool produced output
    Output {
        name: String,
        line: String,
        is_stderr: bool,
    },
    /// A task completed successfully
    Completed {
        name: String,
        duration: Duration,
        outputs: usize,
        cached: bool,
    },
    /// A task hit a recoverable error and carried on
    Recovered {
        name: String,
        warning: String,
    },
    /// A task failed
    Failed {
        name: String,
        duration: Duration,
        error: String,
    },
    /// A task was not run
    Skipped {
        name: String,
        reason: String,
    },
    /// A task group is starting
    GroupStarted {
        name: String,
        mode: GroupMode,
        members: usize,
    },
    /// A watched file changed and a run was spawned
    WatchTriggered {
        path: PathBuf,
        target: String,
    },
    /// A run finished
    AllCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        cached: usize,
        duration: Duration,
    },
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { name, kind } => {
                tracing::info!("Starting {} ({})", name, kind);
            }
            TaskEvent::Output {
                name,
                line,
                is_stderr,
            } => {
                if *is_stderr {
                    tracing::warn!("[{}] {}", name, line);
                } else {
                    tracing::debug!("[{}] {}", name, line);
                }
            }
            TaskEvent::Completed {
                name,
                duration,
                outputs,
                cached,
            } => {
                tracing::info!(
                    "{} completed{} in {:.1}s ({} file{} written)",
                    name,
                    if *cached { " (cached)" } else { "" },
                    duration.as_secs_f64(),
                    outputs,
                    if *outputs == 1 { "" } else { "s" }
                );
            }
            TaskEvent::Recovered { name, warning } => {
                tracing::error!("{}: {}", name, warning);
            }
            TaskEvent::Failed {
                name,
                duration,
                error,
            } => {
                tracing::error!("{} failed after {:.1}s: {}", name, duration.as_secs_f64(), error);
            }
            TaskEvent::Skipped { name, reason } => {
                tracing::info!("{} skipped: {}", name, reason);
            }
            TaskEvent::GroupStarted {
                name,
                mode,
                members,
            } => {
                tracing::info!("Starting {:?} group {} ({} members)", mode, name, members);
            }
            TaskEvent::WatchTriggered { path, target } => {
                tracing::info!("{} changed, running {}", path.display(), target);
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cached,
                duration,
            } => {
                tracing::info!(
                    "All tasks complete: {}/{} succeeded, {} failed, {} cached ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    cached,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection (useful for testing)
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: std::sync::Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Names of tasks that reported `Started`, in order
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                TaskEvent::Started { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Registry of task reporters; itself a reporter that fans out to all of them
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self {
            reporters: Vec::new(),
        }
    }

    pub fn register<R: TaskReporter + 'static>(&mut self, reporter: R) {
        self.reporters.push(Arc::new(reporter));
    }

    pub fn register_shared(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }

    /// Broadcast an event to all registered reporters
    pub fn broadcast(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

impl Default for TaskReporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        self.broadcast(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();

        reporter.report(&TaskEvent::Started {
            name: "common-js".to_string(),
            kind: "pipeline".to_string(),
        });
        reporter.report(&TaskEvent::Completed {
            name: "common-js".to_string(),
            duration: Duration::from_secs(1),
            outputs: 1,
            cached: false,
        });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.started(), vec!["common-js"]);
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;

        // Just verify it doesn't panic
        reporter.report(&TaskEvent::GroupStarted {
            name: "css".to_string(),
            mode: GroupMode::Series,
            members: 2,
        });
        reporter.report(&TaskEvent::Recovered {
            name: "main-sass".to_string(),
            warning: "expected '}'".to_string(),
        });
    }

    #[test]
    fn test_empty_registry() {
        let registry = TaskReporterRegistry::empty();
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_broadcast() {
        let collecting = Arc::new(CollectingReporter::default());
        let mut registry = TaskReporterRegistry::empty();
        registry.register_shared(collecting.clone());

        registry.broadcast(&TaskEvent::Skipped {
            name: "serve".to_string(),
            reason: "dry run".to_string(),
        });

        assert_eq!(collecting.events().len(), 1);
    }

    #[test]
    fn test_register() {
        let mut registry = TaskReporterRegistry::empty();
        registry.register(TracingReporter);
        assert_eq!(registry.all().len(), 1);

        registry.register(CollectingReporter::default());
        assert_eq!(registry.all().len(), 2);
    }
}
