//! Validate command

use std::collections::BTreeSet;

use clap::Args;
use console::style;
use tracing::info;

use kiln_core::{Config, TaskConfig};
use kiln_tasks::steps::ExternalTool;
use kiln_tasks::Orchestrator;

use crate::cli::{Cli, CliError, OutputFormat};

/// Validate configuration and the task graph
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Only validate configuration, skip the tool check
    #[arg(long)]
    pub config_only: bool,

    /// Strict mode - treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(
            config_only = self.config_only,
            strict = self.strict,
            "executing validate command"
        );

        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        // Load and validate configuration
        let project = match cli.load_project() {
            Ok(project) => Some(project),
            Err(e) => {
                errors.push(format!("Configuration: {:#}", e));
                None
            }
        };

        if let Some(ref project) = project {
            if project.config_path.is_none() {
                warnings.push("No configuration file found; the built-in preset is used".to_string());
            }

            // Build the task graph
            match Orchestrator::from_config(&project.config, &project.root) {
                Ok(orchestrator) => {
                    if orchestrator.default_export().is_none() {
                        warnings.push(
                            "No default export; `kiln` without a task name will fail".to_string(),
                        );
                    }
                }
                Err(e) => errors.push(format!("Task graph: {}", e)),
            }

            if !self.config_only {
                warnings.extend(missing_tools(&project.config));
            }
        }

        let config_path = project
            .as_ref()
            .and_then(|p| p.config_path.as_ref())
            .map(|p| p.display().to_string());

        // Output results
        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "valid": errors.is_empty() && (!self.strict || warnings.is_empty()),
                "config_path": config_path,
                "errors": errors,
                "warnings": warnings,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!("{}", style("Validation Results").bold());
            println!();

            if let Some(path) = &config_path {
                println!("  Config: {}", style(path).cyan());
                println!();
            }

            if errors.is_empty() && warnings.is_empty() {
                println!("{} All checks passed", style("✓").green().bold());
            } else {
                for error in &errors {
                    println!("  {} {}", style("✗").red().bold(), error);
                }
                for warning in &warnings {
                    println!("  {} {}", style("⚠").yellow().bold(), warning);
                }
                println!();
                println!(
                    "  {} error(s), {} warning(s)",
                    style(errors.len()).red(),
                    style(warnings.len()).yellow()
                );
            }
        }

        let failures = if self.strict {
            errors.len() + warnings.len()
        } else {
            errors.len()
        };
        if failures > 0 {
            return Err(CliError::Invalid { errors: failures }.into());
        }

        Ok(())
    }
}

/// One warning per external program that is not on `PATH`
fn missing_tools(config: &Config) -> Vec<String> {
    let mut missing = BTreeSet::new();
    for (name, task) in &config.tasks {
        let TaskConfig::Pipeline(pipeline) = task else {
            continue;
        };
        for step in &pipeline.steps {
            if let Some(program) = ExternalTool::for_step(step).and_then(|t| t.missing_program()) {
                missing.insert((program, name.clone(), step.name()));
            }
        }
    }

    missing
        .into_iter()
        .map(|(program, task, step)| {
            format!("Tool '{}' not found on PATH (task '{}', step {})", program, task, step)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{PipelineConfig, StepConfig};

    #[test]
    fn test_missing_tools() {
        let mut config = Config::default();
        config.tasks.insert(
            "js".to_string(),
            TaskConfig::Pipeline(
                PipelineConfig::new(["src/*.js"])
                    .step(StepConfig::Command {
                        command: "kiln-no-such-minifier --stdin".to_string(),
                    })
                    .step(StepConfig::MinifyCss { command: None })
                    .step(StepConfig::dest("dist")),
            ),
        );

        let warnings = missing_tools(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("kiln-no-such-minifier"));
        assert!(warnings[0].contains("task 'js'"));
    }
}
