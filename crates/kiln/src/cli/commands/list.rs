//! List command

use clap::Args;
use console::style;
use serde::Serialize;
use tracing::info;

use kiln_tasks::Orchestrator;

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};

/// List exports, tasks, groups and watch rules
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Also list tasks and groups that are not exported
    #[arg(short, long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
struct Listing<'a> {
    default: Option<&'a str>,
    exports: Vec<ExportEntry<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tasks: Vec<TaskEntry<'a>>,
    watch: Vec<WatchEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct ExportEntry<'a> {
    alias: &'a str,
    target: &'a str,
}

#[derive(Debug, Serialize)]
struct TaskEntry<'a> {
    name: &'a str,
    kind: &'static str,
    members: &'a [String],
}

#[derive(Debug, Serialize)]
struct WatchEntry<'a> {
    patterns: &'a [String],
    run: &'a str,
}

impl ListCommand {
    /// Execute the list command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(all = self.all, "executing list command");
        let project = cli.load_project()?;
        let orchestrator = Orchestrator::from_config(&project.config, &project.root)?;
        let listing = self.listing(&orchestrator);

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&listing)?);
            return Ok(());
        }
        if cli.quiet {
            return Ok(());
        }

        if let Some(path) = &project.config_path {
            println!("{}", output::key_value("Config", &path.display().to_string()));
        } else {
            output::warning("No configuration file found, using the built-in preset");
        }
        println!();

        println!("{}", output::header("Exports"));
        match listing.default {
            Some(target) => println!(
                "  {} {} {}",
                style("default").green().bold(),
                style("→").dim(),
                target
            ),
            None => println!("  {}", style("(no default export)").dim()),
        }
        for export in &listing.exports {
            println!(
                "  {} {} {}",
                output::task_style().apply_to(export.alias),
                style("→").dim(),
                export.target
            );
        }

        if !listing.tasks.is_empty() {
            println!();
            println!("{}", output::header("Tasks"));
            for task in &listing.tasks {
                if task.members.is_empty() {
                    println!("  {} {}", task.name, style(format!("[{}]", task.kind)).dim());
                } else {
                    println!(
                        "  {} {} {}",
                        task.name,
                        style(format!("({})", task.kind)).dim(),
                        task.members.join(", ")
                    );
                }
            }
        }

        if !listing.watch.is_empty() {
            println!();
            println!("{}", output::header("Watch"));
            for rule in &listing.watch {
                println!(
                    "  {} {} {}",
                    output::path_style().apply_to(rule.patterns.join(" ")),
                    style("→").dim(),
                    rule.run
                );
            }
        }

        Ok(())
    }

    fn listing<'a>(&self, orchestrator: &'a Orchestrator) -> Listing<'a> {
        let tasks = if self.all {
            orchestrator
                .entries()
                .map(|(name, runnable)| TaskEntry {
                    name,
                    kind: runnable.kind(),
                    members: runnable.members(),
                })
                .collect()
        } else {
            Vec::new()
        };

        Listing {
            default: orchestrator.default_export(),
            exports: orchestrator
                .named_exports()
                .iter()
                .map(|(alias, target)| ExportEntry { alias, target })
                .collect(),
            tasks,
            watch: orchestrator
                .watch_rules()
                .iter()
                .map(|rule| WatchEntry {
                    patterns: rule.patterns(),
                    run: rule.target(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::Preset;

    #[test]
    fn test_listing_of_preset() {
        let orchestrator = Orchestrator::from_config(&Preset::Sass.config(), "/project").unwrap();

        let listing = ListCommand { all: false }.listing(&orchestrator);
        assert!(listing.default.is_some());
        assert!(listing.tasks.is_empty());
        assert!(!listing.watch.is_empty());

        let listing = ListCommand { all: true }.listing(&orchestrator);
        assert_eq!(listing.tasks.len(), orchestrator.entries().count());
        assert!(listing.tasks.iter().any(|t| !t.members.is_empty()));
    }
}
