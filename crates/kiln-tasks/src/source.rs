//! File selection: ordered glob patterns resolved to assets

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::asset::Asset;

/// Errors while resolving a file selection
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A wildcard-free pattern matched nothing
    #[error("Source file not found: {0}")]
    NotFound(String),

    /// Invalid glob pattern
    #[error("Invalid source pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Failed to read a matched file
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether a pattern contains glob syntax
pub fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '[', '{'])
}

/// The directory part of a pattern before its first wildcard component.
///
/// `src/js/**/*.js` -> `src/js`, `src/sass/main.sass` -> `src/sass`.
pub fn glob_base(pattern: &str) -> PathBuf {
    let mut base = PathBuf::new();
    let components: Vec<&str> = pattern.split('/').collect();
    for (i, component) in components.iter().enumerate() {
        let is_last = i + 1 == components.len();
        if is_glob(component) || is_last {
            break;
        }
        base.push(component);
    }
    base
}

/// Compile patterns into a matcher where `*` does not cross directories
pub fn compile_globset<'a, I>(patterns: I) -> Result<GlobSet, SourceError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| SourceError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| SourceError::InvalidPattern {
        pattern: "<set>".to_string(),
        reason: e.to_string(),
    })
}

/// Resolve patterns (relative to `root`) into assets.
///
/// Matches of one pattern are sorted by path; pattern order is preserved
/// across patterns and a file matched twice keeps its first position.
/// Patterns starting with `!` exclude files from every other pattern.
#[instrument(skip_all, fields(root = %root.display(), patterns = patterns.len()))]
pub fn resolve(root: &Path, patterns: &[String]) -> Result<Vec<Asset>, SourceError> {
    let (excludes, includes): (Vec<&String>, Vec<&String>) =
        patterns.iter().partition(|p| p.starts_with('!'));
    let excludes = compile_globset(excludes.into_iter().map(|p| &p[1..]))?;

    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut assets = Vec::new();

    for pattern in includes {
        let base = root.join(glob_base(pattern));
        let mut matches: Vec<PathBuf> = if is_glob(pattern) {
            walk_matches(root, pattern)?
                .into_iter()
                .filter(|p| p.is_file())
                .collect()
        } else {
            let path = root.join(pattern);
            if !path.is_file() {
                return Err(SourceError::NotFound(pattern.clone()));
            }
            vec![path]
        };
        matches.sort();
        debug!(pattern = %pattern, matched = matches.len(), "resolved source pattern");

        for path in matches {
            let rel_to_root = path.strip_prefix(root).unwrap_or(&path);
            if excludes.is_match(rel_to_root) || !seen.insert(path.clone()) {
                continue;
            }
            let contents = std::fs::read(&path).map_err(|source| SourceError::Read {
                path: path.clone(),
                source,
            })?;
            let relative = path
                .strip_prefix(&base)
                .map(Path::to_path_buf)
                .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));
            assets.push(Asset::new(base.clone(), relative, contents));
        }
    }

    Ok(assets)
}

/// Every path under `root` whose root-relative form matches `pattern`.
///
/// Only the directory before the first wildcard is walked. Results are
/// sorted, so a directory comes before its contents.
pub fn walk_matches(root: &Path, pattern: &str) -> Result<Vec<PathBuf>, SourceError> {
    let matcher = compile_globset([pattern])?;
    let mut matches: Vec<PathBuf> = WalkDir::new(root.join(glob_base(pattern)))
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.into_path())
        .filter(|p| matcher.is_match(p.strip_prefix(root).unwrap_or(p)))
        .collect();
    matches.sort();
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    fn pats(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_glob_base() {
        assert_eq!(glob_base("src/js/**/*.js"), PathBuf::from("src/js"));
        assert_eq!(glob_base("src/sass/main.sass"), PathBuf::from("src/sass"));
        assert_eq!(glob_base("*.html"), PathBuf::new());
        assert_eq!(glob_base("main.js"), PathBuf::new());
    }

    #[test]
    fn test_is_glob() {
        assert!(is_glob("src/**/*.js"));
        assert!(is_glob("a?.js"));
        assert!(!is_glob("src/js/main.js"));
    }

    #[test]
    fn test_pattern_order_preserved() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/a.js", "a");
        write(temp.path(), "js/b.js", "b");
        write(temp.path(), "js/c.js", "c");

        let assets = resolve(temp.path(), &pats(&["js/c.js", "js/a.js", "js/b.js"])).unwrap();
        let names: Vec<String> = assets.iter().map(|a| a.display_path()).collect();
        assert_eq!(names, vec!["c.js", "a.js", "b.js"]);
    }

    #[test]
    fn test_duplicate_match_keeps_first_position() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/a.js", "a");
        write(temp.path(), "js/b.js", "b");

        let assets = resolve(temp.path(), &pats(&["js/b.js", "js/*.js"])).unwrap();
        let names: Vec<String> = assets.iter().map(|a| a.display_path()).collect();
        assert_eq!(names, vec!["b.js", "a.js"]);
    }

    #[test]
    fn test_recursive_glob_keeps_relative_layout() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/main.js", "m");
        write(temp.path(), "src/js/lib/util.js", "u");

        let assets = resolve(temp.path(), &pats(&["src/js/**/*.js"])).unwrap();
        let names: Vec<String> = assets.iter().map(|a| a.display_path()).collect();
        assert_eq!(names, vec!["lib/util.js", "main.js"]);
        assert_eq!(assets[0].base, temp.path().join("src/js"));
    }

    #[test]
    fn test_exclusion() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "js/a.js", "a");
        write(temp.path(), "js/a.min.js", "a");

        let assets = resolve(temp.path(), &pats(&["js/*.js", "!js/*.min.js"])).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].display_path(), "a.js");
    }

    #[test]
    fn test_missing_literal_is_error() {
        let temp = TempDir::new().unwrap();
        let err = resolve(temp.path(), &pats(&["src/missing.js"])).unwrap_err();
        assert!(matches!(err, SourceError::NotFound(_)));
    }

    #[test]
    fn test_unmatched_glob_is_empty() {
        let temp = TempDir::new().unwrap();
        let assets = resolve(temp.path(), &pats(&["src/**/*.scss"])).unwrap();
        assert!(assets.is_empty());
    }

    #[test]
    fn test_brace_alternatives_match() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/js/a.js", "a");
        write(temp.path(), "src/js/b.js", "b");
        write(temp.path(), "src/js/c.js", "c");

        let assets = resolve(temp.path(), &pats(&["src/js/{b,a}.js"])).unwrap();
        let names: Vec<String> = assets.iter().map(|a| a.display_path()).collect();
        assert_eq!(names, vec!["a.js", "b.js"]);
    }

    #[test]
    fn test_walk_matches_lists_directories_before_contents() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "dist/css/a.css", "a");
        write(temp.path(), "dist/js/{b}.js", "b");

        let matches = walk_matches(temp.path(), "dist/**").unwrap();
        let rel: Vec<PathBuf> = matches
            .iter()
            .map(|p| p.strip_prefix(temp.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("dist/css"),
                PathBuf::from("dist/css/a.css"),
                PathBuf::from("dist/js"),
                PathBuf::from("dist/js/{b}.js"),
            ]
        );
    }

    #[test]
    fn test_globset_star_does_not_cross_directories() {
        let set = compile_globset(["*.html"]).unwrap();
        assert!(set.is_match("index.html"));
        assert!(!set.is_match("dist/index.html"));

        let deep = compile_globset(["src/scss/**/*.scss"]).unwrap();
        assert!(deep.is_match("src/scss/main.scss"));
        assert!(deep.is_match("src/scss/parts/_vars.scss"));
    }
}
