//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kiln_core::config::{load_config, load_config_or_default, project_root};
use kiln_core::Config;

use commands::{
    CacheCommand, CompletionsCommand, InitCommand, ListCommand, RunCommand, ValidateCommand,
};

/// Kiln - front-end asset task runner
#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (skips discovery)
    #[arg(short, long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Runs the default export when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run an exported task or group (the default export when no name is given)
    Run(RunCommand),

    /// List exports, tasks, groups and watch rules
    List(ListCommand),

    /// Validate configuration and the task graph
    Validate(ValidateCommand),

    /// Write a starter configuration
    Init(InitCommand),

    /// Step cache management
    Cache(CacheCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Errors the CLI raises itself
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// A run finished with failed tasks
    #[error("{failed} task{} failed", plural(.failed))]
    TasksFailed { failed: usize },

    /// Interrupted by the user
    #[error("Interrupted")]
    Cancelled,

    /// Validation found problems
    #[error("Validation failed with {errors} error{}", plural(.errors))]
    Invalid { errors: usize },
}

fn plural(count: &usize) -> &'static str {
    output::plural(*count)
}

/// Loaded configuration and the directory its paths are relative to
#[derive(Debug, Clone)]
pub struct Project {
    /// Parsed and validated configuration
    pub config: Config,
    /// File it came from; `None` when the built-in preset is used
    pub config_path: Option<PathBuf>,
    /// Project root
    pub root: PathBuf,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)
                .with_context(|| format!("Cannot change to {}", dir.display()))?;
        }

        match self.command {
            Some(Commands::Run(ref cmd)) => cmd.execute(&self),
            Some(Commands::List(ref cmd)) => cmd.execute(&self),
            Some(Commands::Validate(ref cmd)) => cmd.execute(&self),
            Some(Commands::Init(ref cmd)) => cmd.execute(&self),
            Some(Commands::Cache(ref cmd)) => cmd.execute(&self),
            Some(Commands::Completions(ref cmd)) => cmd.execute(&self),
            None => RunCommand::default().execute(&self),
        }
    }

    /// Load the configuration named by `--config`, or discover one
    pub fn load_project(&self) -> anyhow::Result<Project> {
        let cwd = std::env::current_dir()?;

        let (config, config_path) = match &self.config {
            Some(path) => {
                let path = cwd.join(path);
                let config = load_config(&path)
                    .with_context(|| format!("Failed to load {}", path.display()))?;
                (config, Some(path))
            }
            None => load_config_or_default(&cwd)?,
        };

        let root = project_root(config_path.as_deref(), &cwd);
        Ok(Project {
            config,
            config_path,
            root,
        })
    }

    /// Whether human-readable output should be printed
    pub fn is_text(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_runs_default() {
        let cli = Cli::parse_from(["kiln"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::parse_from(["kiln", "run", "css", "-q", "--format", "json", "-c", "kiln.yaml"]);
        assert!(cli.quiet);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("kiln.yaml")));
        match cli.command {
            Some(Commands::Run(cmd)) => assert_eq!(cmd.name.as_deref(), Some("css")),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_load_project_from_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("custom.toml");
        std::fs::write(
            &path,
            "[tasks.js]\nkind = \"pipeline\"\nsrc = [\"src/*.js\"]\nsteps = [{ kind = \"dest\", dir = \"dist\" }]\n",
        )
        .unwrap();

        let cli = Cli::parse_from(["kiln", "list", "--config", path.to_str().unwrap()]);
        let project = cli.load_project().unwrap();
        assert!(project.config.tasks.contains_key("js"));
        assert_eq!(project.root, temp.path());
        assert_eq!(project.config_path, Some(path));
    }
}
