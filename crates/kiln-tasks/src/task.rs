//! Registered units of work

use kiln_core::{GroupConfig, GroupMode, TaskConfig};

use crate::cache::CacheError;
use crate::steps::StepError;
use crate::watch::WatchError;

/// Something registered under a name: a task or a group of names
#[derive(Debug, Clone, PartialEq)]
pub enum Runnable {
    /// A single task
    Task(TaskConfig),
    /// A series or parallel composition
    Group(GroupConfig),
}

impl Runnable {
    /// Short label for listings and plans
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Task(task) => task.kind(),
            Self::Group(group) => match group.mode {
                GroupMode::Series => "series",
                GroupMode::Parallel => "parallel",
            },
        }
    }

    /// Member names of a group; empty for tasks
    pub fn members(&self) -> &[String] {
        match self {
            Self::Task(_) => &[],
            Self::Group(group) => &group.tasks,
        }
    }

    /// Whether this is a group
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl From<TaskConfig> for Runnable {
    fn from(task: TaskConfig) -> Self {
        Self::Task(task)
    }
}

impl From<GroupConfig> for Runnable {
    fn from(group: GroupConfig) -> Self {
        Self::Group(group)
    }
}

/// Errors that fail a single task
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// A transform step failed
    #[error(transparent)]
    Step(#[from] StepError),

    /// The step cache could not be cleared
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A serve task ran without a server attached
    #[error("No development server is attached; configure [server] and run through the kiln CLI")]
    NoServer,

    /// The development server stopped with an error
    #[error("Development server failed: {0}")]
    Server(#[source] std::io::Error),

    /// The watch loop could not start
    #[error(transparent)]
    Watch(#[from] WatchError),
}
