//! Destination wipes

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::source;
use crate::steps::StepError;

/// Delete everything matching the patterns (relative to `root`).
///
/// Patterns starting with `!` protect matching files; directories are then
/// only removed once empty. Returns the paths that were removed.
pub async fn remove_matching(root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>, StepError> {
    let (excludes, includes): (Vec<&String>, Vec<&String>) =
        patterns.iter().partition(|p| p.starts_with('!'));
    let protect = source::compile_globset(excludes.iter().copied().map(|p| &p[1..]))?;

    let mut matched = BTreeSet::new();
    for pattern in includes {
        if Path::new(pattern.as_str())
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
        {
            return Err(StepError::OutsideRoot(PathBuf::from(pattern)));
        }
        let pattern = pattern.trim_end_matches('/');
        if source::is_glob(pattern) {
            matched.extend(source::walk_matches(root, pattern)?);
        } else {
            let path = root.join(pattern);
            if path != root && tokio::fs::symlink_metadata(&path).await.is_ok() {
                matched.insert(path);
            }
        }
    }

    let mut removed = Vec::new();
    if excludes.is_empty() {
        // Parents sort before children, so whole trees go in one call
        for path in &matched {
            if remove(path, true).await? {
                removed.push(path.clone());
            }
        }
    } else {
        let is_protected =
            |p: &Path| protect.is_match(p.strip_prefix(root).unwrap_or(p));
        for path in matched.iter().filter(|p| !p.is_dir() && !is_protected(p)) {
            if remove(path, false).await? {
                removed.push(path.clone());
            }
        }
        // Deepest directories first; only empty ones go
        for dir in matched.iter().rev().filter(|p| p.is_dir()) {
            if tokio::fs::remove_dir(dir).await.is_ok() {
                removed.push(dir.clone());
            }
        }
    }

    info!(removed = removed.len(), "clean finished");
    Ok(removed)
}

/// Remove a file or directory tree; a path that is already gone is skipped
async fn remove(path: &Path, recursive: bool) -> Result<bool, StepError> {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() && recursive => tokio::fs::remove_dir_all(path).await,
        Ok(meta) if meta.is_dir() => return Ok(false),
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            debug!(path = %path.display(), "removed");
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StepError::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "x").unwrap();
    }

    fn files_under(dir: &Path) -> Vec<PathBuf> {
        WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .collect()
    }

    #[tokio::test]
    async fn test_clean_removes_tree() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "dist/css/common.min.css");
        write(temp.path(), "dist/js/scripts.min.js");
        write(temp.path(), "src/js/common.js");

        let removed = remove_matching(temp.path(), &["dist/**".to_string()])
            .await
            .unwrap();

        assert!(!removed.is_empty());
        assert!(files_under(&temp.path().join("dist")).is_empty());
        assert!(temp.path().join("src/js/common.js").exists());
    }

    #[tokio::test]
    async fn test_clean_respects_exclusions() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "src/css/main.css");
        write(temp.path(), "src/css/keep.css");

        remove_matching(
            temp.path(),
            &["src/css/*.css".to_string(), "!src/css/keep.css".to_string()],
        )
        .await
        .unwrap();

        assert!(!temp.path().join("src/css/main.css").exists());
        assert!(temp.path().join("src/css/keep.css").exists());
    }

    #[tokio::test]
    async fn test_clean_brace_alternatives_and_literal_dir() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "dist/css/a.css");
        write(temp.path(), "dist/js/a.js");
        write(temp.path(), "dist/img/a.png");
        write(temp.path(), "tmp/x.log");

        remove_matching(
            temp.path(),
            &["dist/{css,js}/*".to_string(), "tmp/".to_string()],
        )
        .await
        .unwrap();

        assert!(!temp.path().join("dist/css/a.css").exists());
        assert!(!temp.path().join("dist/js/a.js").exists());
        assert!(temp.path().join("dist/img/a.png").exists());
        assert!(!temp.path().join("tmp").exists());
    }

    #[tokio::test]
    async fn test_clean_nothing_matched() {
        let temp = TempDir::new().unwrap();
        let removed = remove_matching(temp.path(), &["dist/**".to_string()])
            .await
            .unwrap();
        assert!(removed.is_empty());
    }

    #[tokio::test]
    async fn test_clean_refuses_parent_paths() {
        let temp = TempDir::new().unwrap();
        let err = remove_matching(temp.path(), &["../elsewhere/**".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::OutsideRoot(_)));
    }
}
