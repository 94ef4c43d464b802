//! Content-addressable cache for external step results

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::asset::Asset;

const METADATA_FILE: &str = "metadata.json";
const OUTPUT_FILE: &str = "output";

/// Cache key: SHA-256 hash of the step invocation and its input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub String);

impl CacheKey {
    /// Compute a key from the rendered step invocation and the asset it runs on
    pub fn compute(invocation: &str, env: &[(String, String)], asset: &Asset) -> Self {
        Self::with_dependencies(invocation, env, "", asset)
    }

    /// Like [`CacheKey::compute`], also covering a digest of the files the
    /// tool may read besides the asset itself (see [`dependency_digest`])
    pub fn with_dependencies(
        invocation: &str,
        env: &[(String, String)],
        dependencies: &str,
        asset: &Asset,
    ) -> Self {
        let mut hasher = Sha256::new();

        hasher.update(invocation.as_bytes());
        hasher.update(b"\0");

        // Environment is passed in a fixed order by callers
        for (k, v) in env {
            hasher.update(k.as_bytes());
            hasher.update(b"=");
            hasher.update(v.as_bytes());
            hasher.update(b"\0");
        }

        hasher.update(dependencies.as_bytes());
        hasher.update(b"\0");
        hasher.update(asset.display_path().as_bytes());
        hasher.update(b"\0");
        hasher.update(&asset.contents);

        CacheKey(format!("{:x}", hasher.finalize()))
    }
}

/// SHA-256 over the path and contents of every file under `dir` with one of
/// `extensions`. Hidden directories and `node_modules` are not entered.
pub fn dependency_digest(dir: &Path, extensions: &[&str]) -> Result<String, CacheError> {
    let mut hasher = Sha256::new();
    let walker = WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let name = e.file_name().to_string_lossy();
            let skipped = name.starts_with('.') || name == "node_modules";
            e.depth() == 0 || !e.file_type().is_dir() || !skipped
        });
    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let path = entry.path();
        let wanted = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| extensions.contains(&e));
        if !entry.file_type().is_file() || !wanted {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(fs::read(path)?);
        hasher.update(b"\0");
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Metadata stored next to a cached output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Cache key
    pub key: CacheKey,
    /// Step that produced the output
    pub step: String,
    /// Relative path of the input asset
    pub path: String,
    /// Output size in bytes
    pub size: u64,
    /// When this entry was created
    pub created_at: String,
}

/// Content-addressable step cache
#[derive(Debug, Clone)]
pub struct TaskCache {
    /// Cache directory
    cache_dir: PathBuf,
}

impl TaskCache {
    /// Create a new task cache
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Create cache with default directory
    pub fn default_dir(root: &Path) -> Self {
        Self::new(root.join(".kiln").join("cache"))
    }

    /// Look up cached output bytes
    pub fn lookup(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let entry_dir = self.cache_dir.join(&key.0);
        let metadata_path = entry_dir.join(METADATA_FILE);
        let output_path = entry_dir.join(OUTPUT_FILE);

        if !metadata_path.exists() || !output_path.exists() {
            debug!(key = %key.0, "cache miss");
            return Ok(None);
        }

        let contents = fs::read_to_string(&metadata_path)?;
        let entry: CacheEntry = serde_json::from_str(&contents)?;
        let output = fs::read(&output_path)?;
        if output.len() as u64 != entry.size {
            debug!(key = %key.0, "cache entry truncated, ignoring");
            return Ok(None);
        }

        debug!(key = %key.0, step = %entry.step, "cache hit");
        Ok(Some(output))
    }

    /// Store output bytes under a key
    pub fn store(
        &self,
        key: &CacheKey,
        step: &str,
        asset: &Asset,
        output: &[u8],
    ) -> Result<(), CacheError> {
        debug!(key = %key.0, step, "storing result in cache");
        let entry_dir = self.cache_dir.join(&key.0);
        fs::create_dir_all(&entry_dir)?;

        fs::write(entry_dir.join(OUTPUT_FILE), output)?;

        let entry = CacheEntry {
            key: key.clone(),
            step: step.to_string(),
            path: asset.display_path(),
            size: output.len() as u64,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&entry)?;
        fs::write(entry_dir.join(METADATA_FILE), json)?;

        Ok(())
    }

    /// Remove every cache entry
    pub fn clear(&self) -> Result<usize, CacheError> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
                removed += 1;
            }
        }

        info!(removed, dir = %self.cache_dir.display(), "cache cleared");
        Ok(removed)
    }

    /// Remove old cache entries
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats, CacheError> {
        info!(max_age_secs = max_age.as_secs(), "pruning cache");
        let mut stats = PruneStats::default();

        if !self.cache_dir.exists() {
            return Ok(stats);
        }

        let cutoff = chrono::Utc::now() - chrono::Duration::from_std(max_age).unwrap_or_default();

        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();

            if !path.is_dir() {
                continue;
            }

            stats.total += 1;

            let metadata_path = path.join(METADATA_FILE);
            if let Ok(contents) = fs::read_to_string(&metadata_path) {
                if let Ok(cache_entry) = serde_json::from_str::<CacheEntry>(&contents) {
                    if let Ok(created) =
                        chrono::DateTime::parse_from_rfc3339(&cache_entry.created_at)
                    {
                        if created < cutoff {
                            if fs::remove_dir_all(&path).is_ok() {
                                stats.removed += 1;
                            }
                            continue;
                        }
                    }
                }
            }

            stats.kept += 1;
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "cache prune complete");
        Ok(stats)
    }

    /// Get cache statistics
    pub fn status(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();

        if !self.cache_dir.exists() {
            return Ok(stats);
        }

        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stats.entries += 1;
            }
        }

        stats.total_size = WalkDir::new(&self.cache_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum();

        Ok(stats)
    }

    /// Get the cache directory
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total entries found
    pub total: usize,
    /// Entries removed
    pub removed: usize,
    /// Entries kept
    pub kept: usize,
}

/// Cache statistics
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Number of cache entries
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl CacheStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        if self.total_size < 1024 {
            format!("{} B", self.total_size)
        } else if self.total_size < 1024 * 1024 {
            format!("{:.1} KB", self.total_size as f64 / 1024.0)
        } else if self.total_size < 1024 * 1024 * 1024 {
            format!("{:.1} MB", self.total_size as f64 / (1024.0 * 1024.0))
        } else {
            format!(
                "{:.1} GB",
                self.total_size as f64 / (1024.0 * 1024.0 * 1024.0)
            )
        }
    }
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// IO error
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn asset(contents: &str) -> Asset {
        Asset::new("/p/src/js", "common.js", contents.as_bytes().to_vec())
    }

    #[test]
    fn test_cache_key_deterministic() {
        let key1 = CacheKey::compute("npx terser", &[], &asset("let a = 1;"));
        let key2 = CacheKey::compute("npx terser", &[], &asset("let a = 1;"));
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_cache_key_differs_on_contents_and_command() {
        let base = CacheKey::compute("npx terser", &[], &asset("let a = 1;"));
        assert_ne!(base, CacheKey::compute("npx terser", &[], &asset("let a = 2;")));
        assert_ne!(base, CacheKey::compute("uglifyjs", &[], &asset("let a = 1;")));
        let env = vec![("BROWSERSLIST".to_string(), "> 1%".to_string())];
        assert_ne!(base, CacheKey::compute("npx terser", &env, &asset("let a = 1;")));
    }

    #[test]
    fn test_dependency_digest_tracks_imported_files() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("src/scss");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("main.scss"), "@import 'vars';").unwrap();
        fs::write(dir.join("_vars.scss"), "$c: red;").unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let exts = ["scss", "sass"];
        let before = dependency_digest(&dir, &exts).unwrap();
        fs::write(dir.join("notes.txt"), "still ignored").unwrap();
        assert_eq!(before, dependency_digest(&dir, &exts).unwrap());

        fs::write(dir.join("_vars.scss"), "$c: blue;").unwrap();
        let after = dependency_digest(&dir, &exts).unwrap();
        assert_ne!(before, after);

        let input = asset("@import 'vars';");
        assert_ne!(
            CacheKey::with_dependencies("sass --stdin", &[], &before, &input),
            CacheKey::with_dependencies("sass --stdin", &[], &after, &input)
        );
    }

    #[test]
    fn test_cache_store_and_lookup() {
        let temp = TempDir::new().unwrap();
        let cache = TaskCache::new(temp.path().join("cache"));
        let input = asset("let a = 1;");
        let key = CacheKey::compute("npx terser", &[], &input);

        assert!(cache.lookup(&key).unwrap().is_none());
        cache.store(&key, "minify-js", &input, b"let a=1;").unwrap();
        assert_eq!(cache.lookup(&key).unwrap().unwrap(), b"let a=1;");
    }

    #[test]
    fn test_cache_clear() {
        let temp = TempDir::new().unwrap();
        let cache = TaskCache::new(temp.path().join("cache"));
        let input = asset("x");
        let key = CacheKey::compute("cat", &[], &input);
        cache.store(&key, "command", &input, b"x").unwrap();

        assert_eq!(cache.clear().unwrap(), 1);
        assert!(cache.lookup(&key).unwrap().is_none());
        assert_eq!(cache.status().unwrap().entries, 0);
    }

    #[test]
    fn test_cache_prune_keeps_fresh_entries() {
        let temp = TempDir::new().unwrap();
        let cache = TaskCache::new(temp.path().join("cache"));
        let input = asset("x");
        let key = CacheKey::compute("cat", &[], &input);
        cache.store(&key, "command", &input, b"x").unwrap();

        let stats = cache.prune(Duration::from_secs(3600)).unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.removed, 0);
    }

    #[test]
    fn test_cache_status() {
        let temp = TempDir::new().unwrap();
        let cache = TaskCache::new(temp.path().join("cache"));

        let stats = cache.status().unwrap();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);

        let input = asset("x");
        let key = CacheKey::compute("cat", &[], &input);
        cache.store(&key, "command", &input, b"abc").unwrap();
        let stats = cache.status().unwrap();
        assert_eq!(stats.entries, 1);
        assert!(stats.total_size >= 3);
    }

    #[test]
    fn test_cache_stats_formatted_size() {
        let stats = CacheStats {
            entries: 0,
            total_size: 1536,
        };
        assert_eq!(stats.formatted_size(), "1.5 KB");

        let stats = CacheStats {
            entries: 0,
            total_size: 500,
        };
        assert_eq!(stats.formatted_size(), "500 B");
    }
}
