//! Renaming

use crate::asset::Asset;

/// Rename assets.
///
/// `to` replaces the whole file name, then `suffix` is appended to the stem
/// and `extname` (including its dot) replaces the extension.
pub fn rename(
    mut assets: Vec<Asset>,
    to: Option<&str>,
    suffix: Option<&str>,
    extname: Option<&str>,
) -> Vec<Asset> {
    for asset in &mut assets {
        if let Some(to) = to {
            asset.set_file_name(to);
        }
        if suffix.is_none() && extname.is_none() {
            continue;
        }

        let stem = asset
            .relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = match extname {
            Some(ext) => ext.to_string(),
            None => asset
                .relative
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
        };
        asset.set_file_name(&format!("{}{}{}", stem, suffix.unwrap_or(""), ext));
    }
    assets
}
