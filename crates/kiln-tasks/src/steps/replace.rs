//! Regex replacement on text assets

use regex::Regex;

use crate::asset::Asset;

use super::StepError;

/// Replace every match of `pattern` in each asset; `$1`-style group
/// references in `replacement` are expanded
pub fn replace(
    assets: Vec<Asset>,
    pattern: &str,
    replacement: &str,
) -> Result<Vec<Asset>, StepError> {
    let re = Regex::new(pattern)?;

    assets
        .into_iter()
        .map(|mut asset| {
            let text = std::str::from_utf8(&asset.contents).map_err(|_| StepError::NotUtf8 {
                step: "replace",
                path: asset.display_path(),
            })?;
            let replaced = re.replace_all(text, replacement).into_owned();
            asset.contents = replaced.into_bytes();
            Ok(asset)
        })
        .collect()
}
