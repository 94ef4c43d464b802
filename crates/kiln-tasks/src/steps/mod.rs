//! Transform steps
//!
//! Every step maps the assets of a pipeline to new assets. Steps that need an
//! external tool (style compiler, transpiler, JS minifier, autoprefixer)
//! pipe each asset through a shell command; the rest are implemented here.

mod concat;
mod dest;
pub mod external;
pub mod minify_css;
mod rename;
mod replace;

use std::path::{Path, PathBuf};

use kiln_core::StepConfig;
use tracing::debug;

use crate::asset::Asset;
use crate::cache::TaskCache;
use crate::reload::ReloadChannel;
use crate::reporter::TaskReporter;
use crate::source::SourceError;

pub use concat::concat;
pub use dest::write_assets;
pub use external::ExternalTool;
pub use rename::rename;
pub use replace::replace;

/// Everything a step may touch while running
pub struct StepContext<'a> {
    /// Name of the task running the step
    pub task: &'a str,
    /// Project root; relative paths resolve against it
    pub root: &'a Path,
    /// Step cache, when enabled
    pub cache: Option<&'a TaskCache>,
    /// Live-reload channel
    pub reload: &'a ReloadChannel,
    /// Progress reporter
    pub reporter: &'a dyn TaskReporter,
}

/// What a pipeline produced besides its assets
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// Files written by `dest` steps
    pub written: Vec<PathBuf>,
    /// Recoverable errors that were logged
    pub warnings: Vec<String>,
    /// External invocations served from the cache
    pub cache_hits: usize,
    /// External invocations actually run
    pub cache_misses: usize,
}

impl PipelineOutcome {
    /// Whether every external invocation was served from the cache
    pub fn fully_cached(&self) -> bool {
        self.cache_hits > 0 && self.cache_misses == 0
    }
}

/// Errors raised by transform steps
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Source selection failed
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The external program is not installed
    #[error("Tool '{program}' not found on PATH (needed by `{command}`)")]
    ToolNotFound { program: String, command: String },

    /// The external program could not be started
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The external program exited unsuccessfully
    #[error("`{command}` failed on {path} (exit {code}): {stderr}")]
    CommandFailed {
        command: String,
        path: String,
        code: String,
        stderr: String,
    },

    /// A text-only step received binary contents
    #[error("{step}: {path} is not valid UTF-8")]
    NotUtf8 { step: &'static str, path: String },

    /// Invalid regular expression
    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Failed to write a destination file
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A clean pattern points outside the project
    #[error("Refusing to delete {0}: outside the project root")]
    OutsideRoot(PathBuf),

    /// Failed to delete a file
    #[error("Failed to delete {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StepError {
    /// Whether the error came from a failing external command
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

/// Apply one step to the assets
pub async fn apply(
    step: &StepConfig,
    assets: Vec<Asset>,
    ctx: &StepContext<'_>,
    outcome: &mut PipelineOutcome,
) -> Result<Vec<Asset>, StepError> {
    debug!(task = ctx.task, step = step.name(), assets = assets.len(), "applying step");

    match step {
        StepConfig::StyleCompile {
            output_style,
            command,
        } => {
            let tool = ExternalTool::style_compile(*output_style, command.as_deref());
            external::style_compile(&tool, assets, ctx, outcome).await
        }
        StepConfig::Concat { file } => Ok(concat(assets, file)),
        StepConfig::Transpile { preset, command } => {
            let tool = ExternalTool::transpile(preset, command.as_deref());
            external::filter_all(&tool, assets, ctx, outcome).await
        }
        StepConfig::MinifyJs { command } => {
            let tool = ExternalTool::minify_js(command.as_deref());
            external::filter_all(&tool, assets, ctx, outcome).await
        }
        StepConfig::MinifyCss { command: None } => assets
            .into_iter()
            .map(minify_css::minify_asset)
            .collect(),
        StepConfig::MinifyCss {
            command: Some(command),
        } => {
            let tool = ExternalTool::command("minify-css", command);
            external::filter_all(&tool, assets, ctx, outcome).await
        }
        StepConfig::Autoprefix { browsers, command } => {
            let tool = ExternalTool::autoprefix(browsers, command.as_deref());
            external::filter_all(&tool, assets, ctx, outcome).await
        }
        StepConfig::Rename {
            to,
            suffix,
            extname,
        } => Ok(rename(
            assets,
            to.as_deref(),
            suffix.as_deref(),
            extname.as_deref(),
        )),
        StepConfig::Replace {
            pattern,
            replacement,
        } => replace(assets, pattern, replacement),
        StepConfig::Command { command } => {
            let tool = ExternalTool::command("command", command);
            external::filter_all(&tool, assets, ctx, outcome).await
        }
        StepConfig::Dest { dir } => write_assets(assets, &ctx.root.join(dir), outcome).await,
        StepConfig::Reload => {
            let paths = assets.iter().map(Asset::display_path).collect();
            ctx.reload.changed(paths);
            Ok(assets)
        }
    }
}
