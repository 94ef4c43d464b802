//! `kiln completions`

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use tracing::info;

use crate::cli::output;
use crate::cli::Cli;

const BIN_NAME: &str = "kiln";

/// Print or install a completion script
#[derive(Debug, Args)]
pub struct CompletionsCommand {
    /// Target shell; taken from `$SHELL` when omitted
    #[arg(value_enum)]
    pub shell: Option<Shell>,

    /// Write the script here (parent directories are created)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl CompletionsCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let shell = self
            .shell
            .or_else(Shell::from_env)
            .context("cannot detect the shell from $SHELL; pass one, e.g. `kiln completions zsh`")?;
        info!(%shell, output = ?self.output, "generating completions");

        let script = render(shell);
        match &self.output {
            Some(path) => {
                if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                    fs::create_dir_all(dir)
                        .with_context(|| format!("cannot create {}", dir.display()))?;
                }
                fs::write(path, &script)
                    .with_context(|| format!("cannot write {}", path.display()))?;
                if cli.is_text() {
                    output::success(&format!(
                        "{} completions written to {}",
                        shell,
                        output::path_style().apply_to(path.display())
                    ));
                }
            }
            None => io::stdout().write_all(&script)?,
        }
        Ok(())
    }
}

/// The completion script for `shell`, covering every subcommand and flag
fn render(shell: Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut script = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut script);
    script
}
