//! Run command - execute an exported task or group

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use kiln_core::GroupMode;
use kiln_serve::LiveServer;
use kiln_tasks::{
    Orchestrator, RunReport, TaskCache, TaskEvent, TaskReporter, TaskStatus, TracingReporter,
};

use crate::cli::output::{self, elapsed, plural};
use crate::cli::{Cli, CliError, OutputFormat, Project};

/// Run an exported task or group
#[derive(Debug, Default, Args)]
pub struct RunCommand {
    /// Exported name to run (default export when omitted)
    pub name: Option<String>,

    /// Show execution plan without running
    #[arg(long)]
    pub dry_run: bool,

    /// Disable the step cache
    #[arg(long)]
    pub no_cache: bool,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        let project = cli.load_project()?;
        info!(
            name = self.name.as_deref().unwrap_or("default"),
            dry_run = self.dry_run,
            no_cache = self.no_cache,
            "executing run command"
        );

        let orchestrator = Arc::new(self.build_orchestrator(&project, cli)?);
        let target = match &self.name {
            Some(name) => orchestrator.resolve(name)?,
            None => orchestrator.default_target()?,
        }
        .to_string();

        if self.dry_run {
            return print_plan(&orchestrator, &target, cli);
        }

        if cli.is_text() {
            let persistent = orchestrator
                .plan(&target)?
                .leaves()
                .into_iter()
                .filter_map(|leaf| match orchestrator.get(leaf) {
                    Some(kiln_tasks::Runnable::Task(task)) => Some(task.is_persistent()),
                    _ => None,
                })
                .any(|p| p);
            output::info(&format!(
                "Running {}{}",
                style(&target).bold(),
                if persistent {
                    style(" (Ctrl-C to stop)").dim().to_string()
                } else {
                    String::new()
                }
            ));
            println!();
        }

        let options = orchestrator.default_options();
        let report = tokio::select! {
            report = orchestrator.run_target(&target, options) => report?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                return Err(CliError::Cancelled.into());
            }
        };

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&report_json(&report))?);
        }

        let failed = report.failed();
        if failed > 0 {
            if cli.is_text() {
                println!();
                println!(
                    "  {} {}/{} tasks failed:",
                    style("✗").red().bold(),
                    failed,
                    report.results.len()
                );
                for r in &report.results {
                    if let TaskStatus::Failed(ref err) = r.status {
                        println!("    {} {}: {}", style("✗").red(), r.name, err);
                    }
                }
            }
            return Err(CliError::TasksFailed { failed }.into());
        }

        Ok(())
    }

    fn build_orchestrator(&self, project: &Project, cli: &Cli) -> anyhow::Result<Orchestrator> {
        let reporter: Arc<dyn TaskReporter> = if cli.is_text() {
            Arc::new(ConsoleReporter::new(cli.verbose))
        } else {
            Arc::new(TracingReporter)
        };

        let mut orchestrator = Orchestrator::from_config(&project.config, &project.root)?
            .with_reporter(reporter)
            .with_server(Arc::new(LiveServer));

        if self.no_cache {
            let cache = TaskCache::new(project.root.join(&project.config.cache.dir));
            orchestrator = orchestrator.with_cache(cache, false);
        }

        Ok(orchestrator)
    }
}

fn print_plan(orchestrator: &Orchestrator, target: &str, cli: &Cli) -> anyhow::Result<()> {
    let plan = orchestrator.plan(target)?;
    let leaves = plan.leaves();

    if cli.format == OutputFormat::Json {
        let json = serde_json::json!({
            "target": target,
            "tasks": leaves,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    if !cli.quiet {
        println!();
        println!(
            "{} {} task{} in {}",
            style("→").blue(),
            leaves.len(),
            plural(leaves.len()),
            style(target).bold()
        );
        println!();
        print!("{}", plan);
        println!();
        println!("{}", style("[DRY RUN - no tasks will be executed]").yellow().bold());
    }
    Ok(())
}

fn report_json(report: &RunReport) -> serde_json::Value {
    serde_json::json!({
        "target": report.target,
        "total": report.results.len(),
        "succeeded": report.succeeded(),
        "failed": report.failed(),
        "cached": report.cached(),
        "skipped": report.skipped(),
        "duration_ms": report.duration.as_millis(),
        "tasks": report.results.iter().map(|r| {
            serde_json::json!({
                "name": r.name,
                "status": status_label(&r.status),
                "error": match &r.status {
                    TaskStatus::Failed(e) => Some(e.as_str()),
                    _ => None,
                },
                "duration_ms": r.duration.as_millis(),
                "outputs": r.outputs,
                "warnings": r.warnings,
            })
        }).collect::<Vec<_>>(),
    })
}

fn status_label(status: &TaskStatus) -> &'static str {
    match status {
        TaskStatus::Success => "success",
        TaskStatus::CacheHit => "cached",
        TaskStatus::Recovered => "recovered",
        TaskStatus::Failed(_) => "failed",
        TaskStatus::Skipped => "skipped",
    }
}

/// Console reporter with live output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { name, kind } => {
                println!(
                    "  {} {} {}",
                    style("▸").dim(),
                    style(name).bold(),
                    if self.verbose {
                        style(format!("({})", kind)).dim().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            TaskEvent::Output {
                name,
                line,
                is_stderr,
            } => {
                if self.verbose {
                    if *is_stderr {
                        println!("    {} {}", style(format!("[{}]", name)).red().dim(), line);
                    } else {
                        println!("    {} {}", style(format!("[{}]", name)).dim(), line);
                    }
                }
            }
            TaskEvent::Completed {
                name,
                duration,
                outputs,
                cached,
            } => {
                let written = if *outputs > 0 {
                    style(format!("{} file{}", outputs, plural(*outputs))).dim().to_string()
                } else {
                    String::new()
                };
                if *cached {
                    println!(
                        "  {} {} {} {} {}",
                        style("✓").green(),
                        style(name).green(),
                        style("(cached)").cyan(),
                        elapsed(*duration),
                        written
                    );
                } else {
                    println!(
                        "  {} {} {} {}",
                        style("✓").green(),
                        style(name).green(),
                        elapsed(*duration),
                        written
                    );
                }
            }
            TaskEvent::Recovered { name, warning } => {
                println!(
                    "  {} {} {}",
                    style("!").yellow().bold(),
                    style(name).yellow(),
                    style(warning).yellow().dim()
                );
            }
            TaskEvent::Failed {
                name,
                duration,
                error,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(name).red(),
                    elapsed(*duration),
                    style(error).red().dim()
                );
            }
            TaskEvent::Skipped { name, reason } => {
                println!(
                    "  {} {} {}",
                    style("○").yellow(),
                    style(name).yellow(),
                    style(format!("({})", reason)).dim()
                );
            }
            TaskEvent::GroupStarted {
                name,
                mode,
                members,
            } => {
                if self.verbose {
                    let mode = match mode {
                        GroupMode::Series => "series",
                        GroupMode::Parallel => "parallel",
                    };
                    println!(
                        "  {} {} ({}, {} member{})",
                        style("─").dim(),
                        name,
                        mode,
                        members,
                        plural(*members)
                    );
                }
            }
            TaskEvent::WatchTriggered { path, target } => {
                println!();
                println!(
                    "  {} {} changed, running {}",
                    style("↻").cyan(),
                    output::path_style().apply_to(path.display()),
                    output::task_style().apply_to(target)
                );
            }
            TaskEvent::AllCompleted {
                total,
                succeeded,
                failed,
                cached,
                duration,
            } => {
                println!();
                println!(
                    "  {} {}/{} succeeded, {} failed, {} cached ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use kiln_tasks::TaskResult;

    #[test]
    fn test_report_json() {
        let report = RunReport {
            target: "css".to_string(),
            results: vec![
                TaskResult {
                    name: "css-compile".to_string(),
                    status: TaskStatus::Recovered,
                    duration: Duration::from_millis(12),
                    outputs: Vec::new(),
                    warnings: vec!["bad.scss: syntax error".to_string()],
                },
                TaskResult {
                    name: "css-dist".to_string(),
                    status: TaskStatus::Failed("boom".to_string()),
                    duration: Duration::ZERO,
                    outputs: Vec::new(),
                    warnings: Vec::new(),
                },
            ],
            duration: Duration::from_millis(20),
        };

        let json = report_json(&report);
        assert_eq!(json["total"], 2);
        assert_eq!(json["failed"], 1);
        assert_eq!(json["tasks"][0]["status"], "recovered");
        assert_eq!(json["tasks"][0]["warnings"][0], "bad.scss: syntax error");
        assert_eq!(json["tasks"][1]["error"], "boom");
    }

    #[test]
    fn test_default_run_command() {
        let cmd = RunCommand::default();
        assert!(cmd.name.is_none());
        assert!(!cmd.dry_run);
        assert!(!cmd.no_cache);
    }
}
