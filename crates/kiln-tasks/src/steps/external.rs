//! Steps delegated to external command-line tools
//!
//! Contents go to the tool on stdin and the transformed contents are read
//! back from stdout. `{path}` in a command is replaced by the asset's
//! shell-quoted relative path.
//!
//! Results are cached per asset. The style compiler also reads imported
//! partials from disk, so its cache key covers every stylesheet under the
//! asset's source base as well.

use std::process::Stdio;

use kiln_core::{OutputStyle, StepConfig};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{error, warn};

use crate::asset::Asset;
use crate::cache::{self, CacheKey};
use crate::reporter::TaskEvent;

use super::{PipelineOutcome, StepContext, StepError};

/// An external filter command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalTool {
    /// Step label for logs and cache entries
    pub step: &'static str,
    /// Command line, possibly containing `{path}`
    pub template: String,
    /// Extra environment for the command
    pub env: Vec<(String, String)>,
    /// Extensions of files the tool may pull in besides its input
    pub imports: &'static [&'static str],
    /// Default `sass` invocation: gets a load path and `--indented` for `.sass`
    sass_flags: bool,
}

const STYLESHEET_IMPORTS: &[&str] = &["scss", "sass"];

impl ExternalTool {
    /// A user-provided command
    pub fn command(step: &'static str, template: &str) -> Self {
        Self {
            step,
            template: template.to_string(),
            env: Vec::new(),
            imports: &[],
            sass_flags: false,
        }
    }

    /// Stylesheet compiler
    pub fn style_compile(style: OutputStyle, command: Option<&str>) -> Self {
        let tool = match command {
            Some(cmd) => Self::command("style-compile", cmd),
            None => Self {
                sass_flags: true,
                ..Self::command(
                    "style-compile",
                    &format!("sass --stdin --style={}", style.as_str()),
                )
            },
        };
        Self {
            imports: STYLESHEET_IMPORTS,
            ..tool
        }
    }

    /// JavaScript transpiler
    pub fn transpile(preset: &str, command: Option<&str>) -> Self {
        match command {
            Some(cmd) => Self::command("transpile", cmd),
            None => Self::command(
                "transpile",
                &format!("npx babel --presets {} --filename {{path}}", preset),
            ),
        }
    }

    /// JavaScript minifier
    pub fn minify_js(command: Option<&str>) -> Self {
        Self::command(
            "minify-js",
            command.unwrap_or("npx terser --compress --mangle"),
        )
    }

    /// Vendor prefixer; the browser targets travel in `BROWSERSLIST`
    pub fn autoprefix(browsers: &[String], command: Option<&str>) -> Self {
        let mut tool = Self::command(
            "autoprefix",
            command.unwrap_or("npx postcss --use autoprefixer"),
        );
        tool.env
            .push(("BROWSERSLIST".to_string(), browsers.join(", ")));
        tool
    }

    /// The tool a step runs, if it runs one
    pub fn for_step(step: &StepConfig) -> Option<Self> {
        match step {
            StepConfig::StyleCompile {
                output_style,
                command,
            } => Some(Self::style_compile(*output_style, command.as_deref())),
            StepConfig::Transpile { preset, command } => {
                Some(Self::transpile(preset, command.as_deref()))
            }
            StepConfig::MinifyJs { command } => Some(Self::minify_js(command.as_deref())),
            StepConfig::MinifyCss {
                command: Some(command),
            } => Some(Self::command("minify-css", command)),
            StepConfig::Autoprefix { browsers, command } => {
                Some(Self::autoprefix(browsers, command.as_deref()))
            }
            StepConfig::Command { command } => Some(Self::command("command", command)),
            _ => None,
        }
    }

    /// Program the command starts with when it is not on `PATH`
    pub fn missing_program(&self) -> Option<String> {
        match ensure_program(&self.template) {
            Err(StepError::ToolNotFound { program, .. }) => Some(program),
            _ => None,
        }
    }

    /// Render the command line for one asset
    pub fn render(&self, asset: &Asset) -> String {
        let mut rendered = self
            .template
            .replace("{path}", &shell_quote(&asset.display_path()));
        if self.sass_flags {
            // Relative imports resolve against the file's own directory
            if let Some(dir) = asset.path().parent() {
                rendered.push_str(" --load-path=");
                rendered.push_str(&shell_quote(&dir.to_string_lossy()));
            }
            if asset.extension().as_deref() == Some("sass") {
                rendered.push_str(" --indented");
            }
        }
        rendered
    }
}

/// Quote a string for `sh`
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// The program a command line starts with, if it can be determined
fn program_of(command: &str) -> Option<&str> {
    let first = command.split_whitespace().next()?;
    if first.contains('=') || first.starts_with(['(', '{', '\'', '"']) {
        return None;
    }
    Some(first)
}

fn ensure_program(command: &str) -> Result<(), StepError> {
    if let Some(program) = program_of(command) {
        if which::which(program).is_err() {
            return Err(StepError::ToolNotFound {
                program: program.to_string(),
                command: command.to_string(),
            });
        }
    }
    Ok(())
}

/// Run `command` with `input` on stdin and return its stdout
async fn run_command(
    command: &str,
    env: &[(String, String)],
    input: &[u8],
    path: &str,
    ctx: &StepContext<'_>,
) -> Result<Vec<u8>, StepError> {
    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(ctx.root)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| StepError::Spawn {
            command: command.to_string(),
            source,
        })?;

    let stdin = child.stdin.take();
    let input = input.to_vec();
    let writer = tokio::spawn(async move {
        if let Some(mut stdin) = stdin {
            stdin.write_all(&input).await?;
            stdin.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    });

    let output = child
        .wait_with_output()
        .await
        .map_err(|source| StepError::Spawn {
            command: command.to_string(),
            source,
        })?;

    // A tool may exit without draining stdin; the broken pipe is not an error
    if let Ok(Err(e)) = writer.await {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            warn!(command, error = %e, "failed to write tool input");
        }
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
        ctx.reporter.report(&TaskEvent::Output {
            name: ctx.task.to_string(),
            line: line.to_string(),
            is_stderr: true,
        });
    }

    if !output.status.success() {
        return Err(StepError::CommandFailed {
            command: command.to_string(),
            path: path.to_string(),
            code: output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Run a tool on one asset, consulting the cache first
pub async fn run_tool(
    tool: &ExternalTool,
    asset: &Asset,
    ctx: &StepContext<'_>,
    outcome: &mut PipelineOutcome,
) -> Result<Vec<u8>, StepError> {
    let invocation = tool.render(asset);

    let key = match ctx.cache {
        Some(_) => cache_key(tool, &invocation, asset),
        None => None,
    };
    if let (Some(cache), Some(key)) = (ctx.cache, key.as_ref()) {
        match cache.lookup(key) {
            Ok(Some(output)) => {
                outcome.cache_hits += 1;
                return Ok(output);
            }
            Ok(None) => {}
            Err(e) => warn!(step = tool.step, error = %e, "cache lookup failed"),
        }
    }

    ensure_program(&invocation)?;
    let output = run_command(
        &invocation,
        &tool.env,
        &asset.contents,
        &asset.display_path(),
        ctx,
    )
    .await?;
    outcome.cache_misses += 1;

    if let (Some(cache), Some(key)) = (ctx.cache, key.as_ref()) {
        if let Err(e) = cache.store(key, tool.step, asset, &output) {
            warn!(step = tool.step, error = %e, "failed to store cache entry");
        }
    }

    Ok(output)
}

/// Key for one tool run, or `None` when the imports cannot be hashed
fn cache_key(tool: &ExternalTool, invocation: &str, asset: &Asset) -> Option<CacheKey> {
    if tool.imports.is_empty() {
        return Some(CacheKey::compute(invocation, &tool.env, asset));
    }
    match cache::dependency_digest(&asset.base, tool.imports) {
        Ok(digest) => Some(CacheKey::with_dependencies(
            invocation, &tool.env, &digest, asset,
        )),
        Err(e) => {
            warn!(step = tool.step, error = %e, "cannot hash imports, skipping cache");
            None
        }
    }
}

/// Pass every asset through the tool; any failure is fatal
pub async fn filter_all(
    tool: &ExternalTool,
    assets: Vec<Asset>,
    ctx: &StepContext<'_>,
    outcome: &mut PipelineOutcome,
) -> Result<Vec<Asset>, StepError> {
    let mut out = Vec::with_capacity(assets.len());
    for mut asset in assets {
        asset.contents = run_tool(tool, &asset, ctx, outcome).await?;
        out.push(asset);
    }
    Ok(out)
}

/// Compile stylesheets to CSS.
///
/// Partials (`_name.scss`) are dropped. A file the compiler rejects is
/// logged, reported as recovered and dropped; the remaining files carry on.
pub async fn style_compile(
    tool: &ExternalTool,
    assets: Vec<Asset>,
    ctx: &StepContext<'_>,
    outcome: &mut PipelineOutcome,
) -> Result<Vec<Asset>, StepError> {
    let mut out = Vec::with_capacity(assets.len());
    for mut asset in assets {
        let is_partial = asset
            .relative
            .file_name()
            .is_some_and(|n| n.to_string_lossy().starts_with('_'));
        if is_partial {
            continue;
        }

        match run_tool(tool, &asset, ctx, outcome).await {
            Ok(css) => {
                asset.contents = css;
                asset.relative.set_extension("css");
                out.push(asset);
            }
            Err(e) if e.is_command_failure() => {
                let warning = format!("{}: {}", asset.display_path(), e);
                error!(task = ctx.task, %warning, "style compile failed");
                ctx.reporter.report(&TaskEvent::Recovered {
                    name: ctx.task.to_string(),
                    warning: warning.clone(),
                });
                outcome.warnings.push(warning);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(out)
}
