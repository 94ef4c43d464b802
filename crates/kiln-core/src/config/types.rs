//! Configuration types

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration for Kiln
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Named tasks
    pub tasks: BTreeMap<String, TaskConfig>,

    /// Named compositions of tasks
    pub groups: BTreeMap<String, GroupConfig>,

    /// File-change bindings
    pub watch: Vec<WatchConfig>,

    /// Names invocable from the command line
    pub exports: ExportsConfig,

    /// Development server settings (required by `serve` tasks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    /// Step cache settings
    pub cache: CacheConfig,
}

impl Config {
    /// Check whether a name refers to a task or a group
    pub fn defines(&self, name: &str) -> bool {
        self.tasks.contains_key(name) || self.groups.contains_key(name)
    }
}

/// A task definition.
///
/// Tagged by `kind` in configuration files:
///
/// ```toml
/// [tasks.common-js-dist]
/// kind = "pipeline"
/// src = ["src/js/common.js"]
/// steps = [{ kind = "minify-js" }, { kind = "dest", dir = "dist/js" }]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TaskConfig {
    /// Read a file selection and run it through transform steps
    Pipeline(PipelineConfig),

    /// Delete every file matching the patterns
    Clean {
        /// Glob patterns to delete
        patterns: Vec<String>,
    },

    /// Drop all step cache entries
    ClearCache,

    /// Push a full-page reload to connected browsers
    Reload,

    /// Run the development server until the process exits
    Serve,

    /// Run the watch loop over all watch rules until the process exits
    Watch,
}

impl TaskConfig {
    /// Short label for the task kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Pipeline(_) => "pipeline",
            Self::Clean { .. } => "clean",
            Self::ClearCache => "clear-cache",
            Self::Reload => "reload",
            Self::Serve => "serve",
            Self::Watch => "watch",
        }
    }

    /// Whether this task never completes on its own
    pub fn is_persistent(&self) -> bool {
        matches!(self, Self::Serve | Self::Watch)
    }
}

/// A file selection plus ordered transform steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Ordered glob patterns; `!` prefix excludes
    pub src: Vec<String>,

    /// Transform steps applied in order
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

impl PipelineConfig {
    /// Create a pipeline over the given source patterns
    pub fn new<I, S>(src: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            src: src.into_iter().map(Into::into).collect(),
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: StepConfig) -> Self {
        self.steps.push(step);
        self
    }

    /// Whether the last step produces something observable
    pub fn has_output(&self) -> bool {
        self.steps.last().is_some_and(StepConfig::is_terminal)
    }
}

/// Output style of the style compiler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStyle {
    /// One declaration per line
    #[default]
    Expanded,
    /// Everything on one line
    Compressed,
}

impl OutputStyle {
    /// The value passed to the compiler's `--style` flag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expanded => "expanded",
            Self::Compressed => "compressed",
        }
    }
}

/// A single transform step of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepConfig {
    /// Compile stylesheets to CSS (errors are logged, not fatal)
    StyleCompile {
        #[serde(default)]
        output_style: OutputStyle,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },

    /// Join all files into one, in selection order
    Concat { file: String },

    /// Transpile JavaScript for older targets
    Transpile {
        #[serde(default = "default_transpile_preset")]
        preset: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },

    /// Minify JavaScript
    MinifyJs {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },

    /// Minify CSS (built in unless a command is given)
    MinifyCss {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },

    /// Add vendor prefixes for the browser targets
    Autoprefix {
        #[serde(default = "default_browsers")]
        browsers: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        command: Option<String>,
    },

    /// Rename files, either to a fixed name or by suffix/extension rewrite
    Rename {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        to: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extname: Option<String>,
    },

    /// Regex search-and-replace on file contents
    Replace { pattern: String, replacement: String },

    /// Filter contents through an arbitrary shell command
    Command { command: String },

    /// Write files under a directory
    Dest { dir: String },

    /// Notify live-reload clients about the files
    Reload,
}

impl StepConfig {
    /// Short label used in logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::StyleCompile { .. } => "style-compile",
            Self::Concat { .. } => "concat",
            Self::Transpile { .. } => "transpile",
            Self::MinifyJs { .. } => "minify-js",
            Self::MinifyCss { .. } => "minify-css",
            Self::Autoprefix { .. } => "autoprefix",
            Self::Rename { .. } => "rename",
            Self::Replace { .. } => "replace",
            Self::Command { .. } => "command",
            Self::Dest { .. } => "dest",
            Self::Reload => "reload",
        }
    }

    /// Whether the step produces observable output
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Dest { .. } | Self::Reload)
    }

    /// Shorthand for a `concat` step
    pub fn concat(file: impl Into<String>) -> Self {
        Self::Concat { file: file.into() }
    }

    /// Shorthand for a `dest` step
    pub fn dest(dir: impl Into<String>) -> Self {
        Self::Dest { dir: dir.into() }
    }

    /// Shorthand for a `rename` step to a fixed file name
    pub fn rename_to(file: impl Into<String>) -> Self {
        Self::Rename {
            to: Some(file.into()),
            suffix: None,
            extname: None,
        }
    }
}

fn default_transpile_preset() -> String {
    "@babel/env".to_string()
}

fn default_browsers() -> Vec<String> {
    super::defaults::DEFAULT_BROWSERS
        .iter()
        .map(|b| b.to_string())
        .collect()
}

/// How a group runs its members
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    /// Strict order, each member waits for the previous one
    Series,
    /// All members start together
    Parallel,
}

/// A named composition of tasks and groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Execution mode
    pub mode: GroupMode,

    /// Member task or group names
    pub tasks: Vec<String>,
}

impl GroupConfig {
    /// A serial group
    pub fn series<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: GroupMode::Series,
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }

    /// A parallel group
    pub fn parallel<I, S>(tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: GroupMode::Parallel,
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }
}

/// A file-change binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Glob patterns, relative to the project root
    pub patterns: Vec<String>,

    /// Task or group to run when a matching file changes
    pub run: String,
}

impl WatchConfig {
    /// Create a rule with a single pattern
    pub fn new(pattern: impl Into<String>, run: impl Into<String>) -> Self {
        Self {
            patterns: vec![pattern.into()],
            run: run.into(),
        }
    }
}

/// Names made invocable from the command line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportsConfig {
    /// Target run when no name is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,

    /// Alias -> task or group name
    pub named: BTreeMap<String, String>,
}

/// Development server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory served as the site root
    pub base_dir: PathBuf,

    /// Interface to bind
    pub host: String,

    /// Port to bind
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Step cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether external step results are cached
    pub enabled: bool,

    /// Cache directory, relative to the project root
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".kiln").join("cache"),
        }
    }
}
