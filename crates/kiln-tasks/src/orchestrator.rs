//! Task registry, exports and run entry points
//!
//! An [`Orchestrator`] is built once at start-up, either by registering tasks
//! by hand or from a [`Config`], and then shared behind an `Arc`. It is never
//! mutated while tasks run.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kiln_core::{Config, GroupConfig, ServerConfig, TaskConfig};
use tracing::{debug, info, instrument};

use crate::cache::TaskCache;
use crate::clean;
use crate::graph::{GraphError, PlanNode, TaskGraph};
use crate::pipeline::run_pipeline;
use crate::reload::ReloadChannel;
use crate::reporter::{TaskReporter, TaskReporterRegistry};
use crate::scheduler::{RunReport, SchedulerOptions, TaskScheduler};
use crate::server::DevServer;
use crate::steps::{PipelineOutcome, StepContext};
use crate::task::{Runnable, TaskError};
use crate::watch::{self, WatchError, WatchRule};

/// Alias that always resolves to the default export
pub const DEFAULT_EXPORT: &str = "default";

/// Registry of tasks, groups, watch rules and exports
pub struct Orchestrator {
    root: PathBuf,
    entries: HashMap<String, Runnable>,
    /// Registration order
    order: Vec<String>,
    rules: Vec<WatchRule>,
    default_export: Option<String>,
    named_exports: BTreeMap<String, String>,
    cache: TaskCache,
    use_cache: bool,
    reload: ReloadChannel,
    reporter: Arc<dyn TaskReporter>,
    server: Option<Arc<dyn DevServer>>,
    server_config: Option<ServerConfig>,
}

impl Orchestrator {
    /// Create an empty orchestrator for a project root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            cache: TaskCache::default_dir(&root),
            root,
            entries: HashMap::new(),
            order: Vec::new(),
            rules: Vec::new(),
            default_export: None,
            named_exports: BTreeMap::new(),
            use_cache: true,
            reload: ReloadChannel::new(),
            reporter: Arc::new(TaskReporterRegistry::new()),
            server: None,
            server_config: None,
        }
    }

    /// Build an orchestrator from configuration.
    ///
    /// Registers tasks, then groups, then watch rules, then exports, and
    /// validates the result.
    #[instrument(skip_all, fields(root = %root.as_ref().display()))]
    pub fn from_config(config: &Config, root: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let root = root.as_ref();
        let mut orchestrator = Self::new(root)
            .with_cache(TaskCache::new(root.join(&config.cache.dir)), config.cache.enabled);
        orchestrator.server_config = config.server.clone();

        for (name, task) in &config.tasks {
            orchestrator.register_task(name.clone(), task.clone())?;
        }
        for (name, group) in &config.groups {
            orchestrator.register_group(name.clone(), group.clone())?;
        }
        for rule in &config.watch {
            orchestrator.watch(WatchRule::from_config(rule)?);
        }
        if let Some(default) = &config.exports.default {
            orchestrator.expose_default(default.clone());
        }
        for (alias, name) in &config.exports.named {
            orchestrator.expose_named(alias.clone(), name.clone());
        }

        orchestrator.validate()?;
        info!(
            entries = orchestrator.entries.len(),
            rules = orchestrator.rules.len(),
            "orchestrator ready"
        );
        Ok(orchestrator)
    }

    /// Use a different reporter
    pub fn with_reporter(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Use a different step cache
    pub fn with_cache(mut self, cache: TaskCache, enabled: bool) -> Self {
        self.cache = cache;
        self.use_cache = enabled;
        self
    }

    /// Share an existing live-reload channel
    pub fn with_reload(mut self, reload: ReloadChannel) -> Self {
        self.reload = reload;
        self
    }

    /// Attach the development server used by `serve` tasks
    pub fn with_server(mut self, server: Arc<dyn DevServer>) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the development server configuration
    pub fn with_server_config(mut self, config: ServerConfig) -> Self {
        self.server_config = Some(config);
        self
    }

    fn register(&mut self, name: String, runnable: Runnable) -> Result<(), OrchestratorError> {
        if self.entries.contains_key(&name) {
            return Err(OrchestratorError::DuplicateTask(name));
        }
        debug!(name = %name, kind = runnable.kind(), "registered");
        self.order.push(name.clone());
        self.entries.insert(name, runnable);
        Ok(())
    }

    /// Register a task; names are unique across tasks and groups
    pub fn register_task(
        &mut self,
        name: impl Into<String>,
        task: TaskConfig,
    ) -> Result<(), OrchestratorError> {
        self.register(name.into(), Runnable::Task(task))
    }

    /// Register a series or parallel group
    pub fn register_group(
        &mut self,
        name: impl Into<String>,
        group: GroupConfig,
    ) -> Result<(), OrchestratorError> {
        self.register(name.into(), Runnable::Group(group))
    }

    /// Register a watch rule
    pub fn watch(&mut self, rule: WatchRule) {
        debug!(target = rule.target(), patterns = ?rule.patterns(), "watch rule registered");
        self.rules.push(rule);
    }

    /// Make a task or group the default export
    pub fn expose_default(&mut self, name: impl Into<String>) {
        self.default_export = Some(name.into());
    }

    /// Export a task or group under an alias
    pub fn expose_named(&mut self, alias: impl Into<String>, name: impl Into<String>) {
        self.named_exports.insert(alias.into(), name.into());
    }

    /// Build the group graph
    pub fn graph(&self) -> Result<TaskGraph, OrchestratorError> {
        Ok(TaskGraph::build(&self.entries)?)
    }

    /// Check group references, cycles, watch targets and exports
    pub fn validate(&self) -> Result<TaskGraph, OrchestratorError> {
        let graph = self.graph()?;

        for rule in &self.rules {
            if !graph.contains(rule.target()) {
                return Err(OrchestratorError::UnknownWatchTarget {
                    patterns: rule.patterns().join(", "),
                    target: rule.target().to_string(),
                });
            }
        }
        let exports = self
            .default_export
            .iter()
            .map(|target| (DEFAULT_EXPORT, target))
            .chain(self.named_exports.iter().map(|(a, t)| (a.as_str(), t)));
        for (alias, target) in exports {
            if !graph.contains(target) {
                return Err(OrchestratorError::UnknownExport {
                    alias: alias.to_string(),
                    target: target.clone(),
                });
            }
        }

        Ok(graph)
    }

    /// Resolve an exported name to its task or group
    pub fn resolve(&self, name: &str) -> Result<&str, OrchestratorError> {
        if name == DEFAULT_EXPORT {
            return self.default_target();
        }
        self.named_exports
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| OrchestratorError::NotExposed(name.to_string()))
    }

    /// Target of the default export
    pub fn default_target(&self) -> Result<&str, OrchestratorError> {
        self.default_export
            .as_deref()
            .ok_or(OrchestratorError::NoDefault)
    }

    /// Execution tree of a registered task or group
    pub fn plan(&self, target: &str) -> Result<PlanNode, OrchestratorError> {
        self.graph()?
            .plan(target)
            .ok_or_else(|| OrchestratorError::UnknownTask(target.to_string()))
    }

    /// Run an exported name
    pub async fn run(self: &Arc<Self>, name: &str) -> Result<RunReport, OrchestratorError> {
        let target = self.resolve(name)?.to_string();
        self.run_target(&target, self.default_options()).await
    }

    /// Run the default export
    pub async fn run_default(self: &Arc<Self>) -> Result<RunReport, OrchestratorError> {
        let target = self.default_target()?.to_string();
        self.run_target(&target, self.default_options()).await
    }

    /// Run any registered task or group, exported or not
    pub async fn run_target(
        self: &Arc<Self>,
        target: &str,
        options: SchedulerOptions,
    ) -> Result<RunReport, OrchestratorError> {
        TaskScheduler::new(self.clone(), options).execute(target).await
    }

    /// Options for runs started without explicit options
    pub fn default_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            dry_run: false,
            use_cache: self.use_cache,
        }
    }

    /// Run one task
    pub(crate) async fn execute_task(
        self: &Arc<Self>,
        name: &str,
        task: &TaskConfig,
        options: &SchedulerOptions,
    ) -> Result<PipelineOutcome, TaskError> {
        match task {
            TaskConfig::Pipeline(pipeline) => {
                let ctx = StepContext {
                    task: name,
                    root: &self.root,
                    cache: options.use_cache.then_some(&self.cache),
                    reload: &self.reload,
                    reporter: &*self.reporter,
                };
                Ok(run_pipeline(pipeline, &ctx).await?)
            }
            TaskConfig::Clean { patterns } => {
                clean::remove_matching(&self.root, patterns).await?;
                Ok(PipelineOutcome::default())
            }
            TaskConfig::ClearCache => {
                self.cache.clear()?;
                Ok(PipelineOutcome::default())
            }
            TaskConfig::Reload => {
                self.reload.reload();
                Ok(PipelineOutcome::default())
            }
            TaskConfig::Serve => {
                let server = self.server.as_ref().ok_or(TaskError::NoServer)?;
                let mut config = self.server_config.clone().unwrap_or_default();
                config.base_dir = self.root.join(&config.base_dir);
                server
                    .serve(config, self.reload.clone())
                    .await
                    .map_err(TaskError::Server)?;
                Ok(PipelineOutcome::default())
            }
            TaskConfig::Watch => {
                watch::run_watch_loop(self.clone()).await?;
                Ok(PipelineOutcome::default())
            }
        }
    }

    /// Project root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Look up a registered task or group
    pub fn get(&self, name: &str) -> Option<&Runnable> {
        self.entries.get(name)
    }

    /// Registered names with their entries, in registration order
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Runnable)> {
        self.order
            .iter()
            .filter_map(|name| self.entries.get(name).map(|r| (name.as_str(), r)))
    }

    /// Registered watch rules
    pub fn watch_rules(&self) -> &[WatchRule] {
        &self.rules
    }

    /// Default export target, if any
    pub fn default_export(&self) -> Option<&str> {
        self.default_export.as_deref()
    }

    /// Named exports: alias -> target
    pub fn named_exports(&self) -> &BTreeMap<String, String> {
        &self.named_exports
    }

    /// Live-reload channel
    pub fn reload(&self) -> &ReloadChannel {
        &self.reload
    }

    /// Reporter receiving task events
    pub fn reporter(&self) -> &Arc<dyn TaskReporter> {
        &self.reporter
    }

    /// Step cache location
    pub fn cache(&self) -> &TaskCache {
        &self.cache
    }

    /// Development server configuration, if any
    pub fn server_config(&self) -> Option<&ServerConfig> {
        self.server_config.as_ref()
    }
}

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// A name is registered twice
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    /// A name is not registered
    #[error("Unknown task '{0}'")]
    UnknownTask(String),

    /// A name is not exported
    #[error("'{0}' is not exported; run `kiln list` to see available names")]
    NotExposed(String),

    /// Nothing is exported as default
    #[error("No default task is exported")]
    NoDefault,

    /// A watch rule targets an unregistered name
    #[error("Watch rule '{patterns}' runs unknown task '{target}'")]
    UnknownWatchTarget { patterns: String, target: String },

    /// An export targets an unregistered name
    #[error("Export '{alias}' points to unknown task '{target}'")]
    UnknownExport { alias: String, target: String },

    /// Invalid group graph
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Invalid watch rule
    #[error(transparent)]
    Watch(#[from] WatchError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::{PipelineConfig, Preset, StepConfig, WatchConfig};

    fn pipeline(src: &str) -> TaskConfig {
        TaskConfig::Pipeline(PipelineConfig::new([src]).step(StepConfig::dest("dist")))
    }

    #[test]
    fn test_duplicate_task_rejected() {
        let mut orchestrator = Orchestrator::new("/p");
        orchestrator.register_task("styles", pipeline("a.css")).unwrap();

        let err = orchestrator
            .register_task("styles", pipeline("b.css"))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateTask(ref n) if n == "styles"));

        let err = orchestrator
            .register_group("styles", GroupConfig::series(["styles"]))
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateTask(_)));

        // The first registration is kept
        assert_eq!(orchestrator.get("styles"), Some(&Runnable::Task(pipeline("a.css"))));
    }

    #[test]
    fn test_group_cycle_rejected() {
        let mut orchestrator = Orchestrator::new("/p");
        orchestrator
            .register_group("a", GroupConfig::series(["b"]))
            .unwrap();
        orchestrator
            .register_group("b", GroupConfig::parallel(["a"]))
            .unwrap();

        assert!(matches!(
            orchestrator.validate().unwrap_err(),
            OrchestratorError::Graph(GraphError::Cycle(_))
        ));
    }

    #[test]
    fn test_resolve_exports() {
        let mut orchestrator = Orchestrator::new("/p");
        orchestrator.register_task("main-sass", pipeline("a.sass")).unwrap();
        orchestrator
            .register_group("dev", GroupConfig::parallel(["main-sass"]))
            .unwrap();

        assert!(matches!(
            orchestrator.resolve(DEFAULT_EXPORT).unwrap_err(),
            OrchestratorError::NoDefault
        ));

        orchestrator.expose_default("dev");
        orchestrator.expose_named("sass", "main-sass");

        assert_eq!(orchestrator.resolve("sass").unwrap(), "main-sass");
        assert_eq!(orchestrator.resolve(DEFAULT_EXPORT).unwrap(), "dev");
        assert!(matches!(
            orchestrator.resolve("main-sass").unwrap_err(),
            OrchestratorError::NotExposed(_)
        ));
        assert!(orchestrator.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_watch_target() {
        let mut orchestrator = Orchestrator::new("/p");
        orchestrator.watch(WatchRule::new(["*.html"], "reload").unwrap());

        assert!(matches!(
            orchestrator.validate().unwrap_err(),
            OrchestratorError::UnknownWatchTarget { .. }
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_export() {
        let mut orchestrator = Orchestrator::new("/p");
        orchestrator.expose_named("build", "missing");

        assert!(matches!(
            orchestrator.validate().unwrap_err(),
            OrchestratorError::UnknownExport { .. }
        ));
    }

    #[test]
    fn test_from_preset_config() {
        let config = Preset::Sass.config();
        let orchestrator = Orchestrator::from_config(&config, "/p").unwrap();

        assert_eq!(orchestrator.default_export(), Some("dev"));
        assert!(matches!(orchestrator.get("css"), Some(Runnable::Group(_))));
        assert_eq!(orchestrator.watch_rules().len(), config.watch.len());
        assert_eq!(orchestrator.cache().cache_dir(), Path::new("/p/.kiln/cache"));

        // Tasks are registered before groups
        let names: Vec<&str> = orchestrator.entries().map(|(name, _)| name).collect();
        let first_group = names
            .iter()
            .position(|n| orchestrator.get(n).is_some_and(Runnable::is_group))
            .unwrap();
        assert!(names[first_group..]
            .iter()
            .all(|n| orchestrator.get(n).is_some_and(Runnable::is_group)));
    }

    #[test]
    fn test_from_config_rejects_bad_watch_pattern() {
        let mut config = Config::default();
        config.tasks.insert("reload".to_string(), TaskConfig::Reload);
        config.watch.push(WatchConfig::new("src/[", "reload"));

        assert!(matches!(
            Orchestrator::from_config(&config, "/p").err(),
            Some(OrchestratorError::Watch(_))
        ));
    }

    #[test]
    fn test_plan() {
        let mut orchestrator = Orchestrator::new("/p");
        orchestrator.register_task("a", pipeline("a.js")).unwrap();
        orchestrator.register_task("b", pipeline("b.js")).unwrap();
        orchestrator
            .register_group("js", GroupConfig::series(["a", "b"]))
            .unwrap();

        let plan = orchestrator.plan("js").unwrap();
        assert_eq!(plan.leaves(), vec!["a", "b"]);
        assert!(matches!(
            orchestrator.plan("missing").unwrap_err(),
            OrchestratorError::UnknownTask(_)
        ));
    }

    #[tokio::test]
    async fn test_serve_without_server_fails() {
        let mut orchestrator = Orchestrator::new("/p")
            .with_reporter(Arc::new(TaskReporterRegistry::empty()));
        orchestrator.register_task("serve", TaskConfig::Serve).unwrap();
        orchestrator.expose_named("serve", "serve");

        let report = Arc::new(orchestrator).run("serve").await.unwrap();
        assert!(!report.success());
    }
}
