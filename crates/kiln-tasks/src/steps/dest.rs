//! Writing assets to disk

use std::path::Path;

use tracing::debug;

use crate::asset::Asset;

use super::{PipelineOutcome, StepError};

/// Write each asset under `dir`, keeping its relative path.
///
/// The returned assets are rebased onto `dir`.
pub async fn write_assets(
    assets: Vec<Asset>,
    dir: &Path,
    outcome: &mut PipelineOutcome,
) -> Result<Vec<Asset>, StepError> {
    let mut out = Vec::with_capacity(assets.len());
    for mut asset in assets {
        let target = dir.join(&asset.relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StepError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&target, &asset.contents)
            .await
            .map_err(|source| StepError::Write {
                path: target.clone(),
                source,
            })?;

        debug!(path = %target.display(), bytes = asset.contents.len(), "wrote asset");
        outcome.written.push(target);
        asset.base = dir.to_path_buf();
        out.push(asset);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_directories() {
        let temp = TempDir::new().unwrap();
        let dist = temp.path().join("dist");
        let mut outcome = PipelineOutcome::default();

        let assets = vec![Asset::new(temp.path().join("src"), "css/a.css", b"a{}".to_vec())];
        let out = write_assets(assets, &dist, &mut outcome).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(dist.join("css/a.css")).unwrap(),
            "a{}"
        );
        assert_eq!(out[0].base, dist);
        assert_eq!(outcome.written, vec![dist.join("css/a.css")]);
    }

    #[tokio::test]
    async fn test_write_overwrites() {
        let temp = TempDir::new().unwrap();
        let mut outcome = PipelineOutcome::default();
        std::fs::write(temp.path().join("a.js"), "old").unwrap();

        let assets = vec![Asset::new("/src", "a.js", b"new".to_vec())];
        write_assets(assets, temp.path(), &mut outcome).await.unwrap();
        assert_eq!(std::fs::read_to_string(temp.path().join("a.js")).unwrap(), "new");
    }
}
