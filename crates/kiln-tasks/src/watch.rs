//! File watching: glob rules bound to task names

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::GlobSet;
use kiln_core::WatchConfig;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::orchestrator::Orchestrator;
use crate::reporter::TaskEvent;
use crate::source::{self, SourceError};

/// Buffered filesystem events between the watcher thread and the loop
const EVENT_BUFFER: usize = 256;

/// Glob patterns bound to a task or group
#[derive(Clone)]
pub struct WatchRule {
    patterns: Vec<String>,
    target: String,
    include: GlobSet,
    exclude: GlobSet,
}

impl WatchRule {
    /// Create a rule; patterns are relative to the project root and may be
    /// negated with `!`
    pub fn new<I, S>(patterns: I, target: impl Into<String>) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let (excludes, includes): (Vec<&String>, Vec<&String>) =
            patterns.iter().partition(|p| p.starts_with('!'));
        let include = source::compile_globset(includes.iter().copied().map(String::as_str))?;
        let exclude = source::compile_globset(excludes.iter().copied().map(|p| &p[1..]))?;

        Ok(Self {
            patterns,
            target: target.into(),
            include,
            exclude,
        })
    }

    /// Create a rule from configuration
    pub fn from_config(config: &WatchConfig) -> Result<Self, WatchError> {
        Self::new(config.patterns.iter().cloned(), config.run.clone())
    }

    /// Watched patterns
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Task or group run on a match
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Whether a root-relative path is covered by the rule
    pub fn matches(&self, path: &Path) -> bool {
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

impl fmt::Debug for WatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRule")
            .field("patterns", &self.patterns)
            .field("target", &self.target)
            .finish()
    }
}

/// Rules triggered by one batch of root-relative paths, each paired with the
/// first path that matched it. A rule is returned at most once.
pub fn triggered_rules<'a>(rules: &'a [WatchRule], paths: &[PathBuf]) -> Vec<(&'a WatchRule, PathBuf)> {
    rules
        .iter()
        .filter_map(|rule| {
            paths
                .iter()
                .find(|path| rule.matches(path))
                .map(|path| (rule, path.clone()))
        })
        .collect()
}

/// Whether an event kind can change a build input
fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Make an event path relative to the project root
fn relative_to(path: &Path, roots: &[PathBuf]) -> Option<PathBuf> {
    roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .map(Path::to_path_buf)
}

/// Watch the project root and run rule targets on matching changes.
///
/// Every matching event spawns its own run; runs are not deduplicated and
/// their failures never stop the loop. Returns when the event stream ends.
pub async fn run_watch_loop(orchestrator: Arc<Orchestrator>) -> Result<(), WatchError> {
    let root = orchestrator.root().to_path_buf();
    let mut roots = vec![root.clone()];
    if let Ok(canonical) = root.canonicalize() {
        if canonical != root {
            roots.push(canonical);
        }
    }

    let (event_tx, mut event_rx) = mpsc::channel::<notify::Result<Event>>(EVENT_BUFFER);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = event_tx.blocking_send(res);
        },
        Config::default(),
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    info!(
        root = %root.display(),
        rules = orchestrator.watch_rules().len(),
        "watching for changes"
    );

    while let Some(res) = event_rx.recv().await {
        let event = match res {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "watch error");
                continue;
            }
        };
        if !is_relevant(&event.kind) {
            continue;
        }

        let mut seen = HashSet::new();
        let paths: Vec<PathBuf> = event
            .paths
            .iter()
            .filter_map(|p| relative_to(p, &roots))
            .filter(|p| seen.insert(p.clone()))
            .collect();
        debug!(kind = ?event.kind, paths = ?paths, "filesystem event");

        for (rule, path) in triggered_rules(orchestrator.watch_rules(), &paths) {
            let target = rule.target().to_string();
            orchestrator.reporter().report(&TaskEvent::WatchTriggered {
                path,
                target: target.clone(),
            });

            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                let options = orchestrator.default_options();
                match orchestrator.run_target(&target, options).await {
                    Ok(report) if !report.success() => {
                        warn!(target = %target, failed = report.failed(), "triggered run failed");
                    }
                    Ok(_) => {}
                    Err(e) => error!(target = %target, error = %e, "triggered run could not start"),
                }
            });
        }
    }

    // Keep the watcher alive for the whole loop
    drop(watcher);
    info!("watch loop stopped");
    Ok(())
}

/// Watch errors
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// Invalid watch pattern
    #[error(transparent)]
    Pattern(#[from] SourceError),

    /// The platform watcher failed
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> Vec<WatchRule> {
        vec![
            WatchRule::new(["*.html"], "reload").unwrap(),
            WatchRule::new(["src/sass/**/*.sass"], "css").unwrap(),
            WatchRule::new(["src/js/main/**/*.js", "!src/js/main/vendor/**"], "js").unwrap(),
        ]
    }

    fn targets(rules: &[WatchRule], paths: &[&str]) -> Vec<String> {
        let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
        triggered_rules(rules, &paths)
            .into_iter()
            .map(|(rule, _)| rule.target().to_string())
            .collect()
    }

    #[test]
    fn test_rule_matching() {
        let rules = rules();
        assert_eq!(targets(&rules, &["index.html"]), vec!["reload"]);
        assert_eq!(targets(&rules, &["src/sass/main.sass"]), vec!["css"]);
        assert_eq!(targets(&rules, &["src/sass/parts/_vars.sass"]), vec!["css"]);
        assert_eq!(targets(&rules, &["src/js/main/app.js"]), vec!["js"]);
        assert!(targets(&rules, &["src/js/main/vendor/x.js"]).is_empty());
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let rules = rules();
        assert!(targets(&rules, &["dist/index.html"]).is_empty());
    }

    #[test]
    fn test_multiple_paths_trigger_rule_once() {
        let rules = rules();
        let paths: Vec<PathBuf> = vec!["src/sass/a.sass".into(), "src/sass/b.sass".into()];
        let triggered = triggered_rules(&rules, &paths);

        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].1, PathBuf::from("src/sass/a.sass"));
    }

    #[test]
    fn test_one_path_may_trigger_several_rules() {
        let rules = vec![
            WatchRule::new(["src/**/*.scss"], "styles").unwrap(),
            WatchRule::new(["src/scss/*.scss"], "lint").unwrap(),
        ];
        assert_eq!(targets(&rules, &["src/scss/a.scss"]), vec!["styles", "lint"]);
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(matches!(
            WatchRule::new(["src/[.scss"], "x").unwrap_err(),
            WatchError::Pattern(_)
        ));
    }

    #[test]
    fn test_relative_to_roots() {
        let roots = vec![PathBuf::from("/tmp/p"), PathBuf::from("/private/tmp/p")];
        assert_eq!(
            relative_to(Path::new("/private/tmp/p/src/a.scss"), &roots),
            Some(PathBuf::from("src/a.scss"))
        );
        assert_eq!(relative_to(Path::new("/elsewhere/a.scss"), &roots), None);
    }

    #[test]
    fn test_relevant_kinds() {
        use notify::event::{AccessKind, CreateKind};
        assert!(is_relevant(&EventKind::Create(CreateKind::File)));
        assert!(!is_relevant(&EventKind::Access(AccessKind::Any)));
    }
}
