//! Init command

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use console::style;
use dialoguer::{Confirm, Select};
use tracing::info;

use kiln_core::config::{preset_toml, preset_yaml, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML};
use kiln_core::Preset;

use crate::cli::Cli;

/// Write a starter configuration from a built-in preset
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Preset to start from (sass or scss)
    #[arg(long, value_parser = parse_preset)]
    pub preset: Option<Preset>,

    /// Configuration file format
    #[arg(long, value_enum)]
    pub config_format: Option<ConfigFormat>,

    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Use defaults without prompting
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Configuration file formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    /// kiln.toml
    #[default]
    Toml,
    /// kiln.yaml
    Yaml,
}

impl ConfigFormat {
    fn file_name(self) -> &'static str {
        match self {
            Self::Toml => DEFAULT_CONFIG_TOML,
            Self::Yaml => DEFAULT_CONFIG_YAML,
        }
    }

    fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

fn parse_preset(s: &str) -> Result<Preset, String> {
    s.parse()
}

/// Render a preset in the given format
fn render(preset: Preset, format: ConfigFormat) -> anyhow::Result<String> {
    Ok(match format {
        ConfigFormat::Toml => preset_toml(preset)?,
        ConfigFormat::Yaml => preset_yaml(preset)?,
    })
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, yes = self.yes, "executing init command");
        let cwd = std::env::current_dir()?;

        let preset = match self.preset {
            Some(preset) => preset,
            None if self.yes => Preset::default(),
            None => {
                let names: Vec<&str> = Preset::ALL.iter().map(Preset::as_str).collect();
                let selection = Select::new()
                    .with_prompt("Preset")
                    .items(&names)
                    .default(0)
                    .interact()?;
                Preset::ALL[selection]
            }
        };

        // An explicit output path decides the format unless one was given
        let format = match (self.config_format, self.output.as_deref().and_then(ConfigFormat::from_path)) {
            (Some(format), _) | (None, Some(format)) => format,
            (None, None) if self.yes => ConfigFormat::default(),
            (None, None) => {
                let formats = ["toml", "yaml"];
                let selection = Select::new()
                    .with_prompt("Configuration format")
                    .items(&formats)
                    .default(0)
                    .interact()?;
                if selection == 0 {
                    ConfigFormat::Toml
                } else {
                    ConfigFormat::Yaml
                }
            }
        };

        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(format.file_name()));

        // Check if config already exists
        if config_path.exists() && !self.force {
            if self.yes {
                anyhow::bail!(
                    "Configuration file already exists at {}. Use --force to overwrite.",
                    config_path.display()
                );
            }

            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "Configuration file already exists at {}. Overwrite?",
                    config_path.display()
                ))
                .default(false)
                .interact()?;

            if !overwrite {
                println!("{}", style("Aborted.").yellow());
                return Ok(());
            }
        }

        let content = render(preset, format)?;
        std::fs::write(&config_path, &content)?;
        info!(path = %config_path.display(), preset = preset.as_str(), "wrote configuration");

        if !cli.quiet {
            println!(
                "{} Created configuration at {} ({} preset)",
                style("✓").green().bold(),
                style(config_path.display()).cyan(),
                preset.as_str()
            );
            println!();
            println!("Next steps:");
            println!("  1. Edit {} to match your source layout", config_path.display());
            println!("  2. Run {} to check tools and tasks", style("kiln validate").cyan());
            println!("  3. Run {} to build and watch", style("kiln").cyan());
        }

        Ok(())
    }
}
