//! Exit codes for the CLI

use kiln_core::{ConfigError, KilnError};
use kiln_tasks::OrchestratorError;

use crate::cli::CliError;

/// Success
#[allow(dead_code)]
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error
pub const CONFIG_ERROR: i32 = 2;

/// One or more tasks failed
pub const TASK_FAILED: i32 = 3;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// Map an error to the process exit code
pub fn for_error(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(cli) = cause.downcast_ref::<CliError>() {
            return match cli {
                CliError::TasksFailed { .. } => TASK_FAILED,
                CliError::Cancelled => CANCELLED,
                CliError::Invalid { .. } => CONFIG_ERROR,
            };
        }
        if let Some(kiln) = cause.downcast_ref::<KilnError>() {
            if kiln.is_config() {
                return CONFIG_ERROR;
            }
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return CONFIG_ERROR;
        }
        if let Some(orchestrator) = cause.downcast_ref::<OrchestratorError>() {
            return match orchestrator {
                OrchestratorError::DuplicateTask(_)
                | OrchestratorError::UnknownWatchTarget { .. }
                | OrchestratorError::UnknownExport { .. }
                | OrchestratorError::Graph(_)
                | OrchestratorError::Watch(_) => CONFIG_ERROR,
                _ => ERROR,
            };
        }
        if let Some(dialog) = cause.downcast_ref::<dialoguer::Error>() {
            #[allow(irrefutable_let_patterns)]
            if let dialoguer::Error::IO(io) = dialog {
                if io.kind() == std::io::ErrorKind::Interrupted {
                    return CANCELLED;
                }
            }
        }
    }
    ERROR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_failure_code() {
        let err = anyhow::Error::new(CliError::TasksFailed { failed: 2 });
        assert_eq!(for_error(&err), TASK_FAILED);
        assert_eq!(for_error(&anyhow::Error::new(CliError::Cancelled)), CANCELLED);
    }

    #[test]
    fn test_config_error_code() {
        let err = anyhow::Error::new(KilnError::from(ConfigError::invalid("tasks", "empty")));
        assert_eq!(for_error(&err), CONFIG_ERROR);

        let err = anyhow::Error::new(OrchestratorError::DuplicateTask("css".to_string()))
            .context("Failed to build task graph");
        assert_eq!(for_error(&err), CONFIG_ERROR);
    }

    #[test]
    fn test_other_error_code() {
        let err = anyhow::Error::new(OrchestratorError::NotExposed("css".to_string()));
        assert_eq!(for_error(&err), ERROR);
        assert_eq!(for_error(&anyhow::anyhow!("boom")), ERROR);
    }
}
