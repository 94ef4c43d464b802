//! Concatenation

use crate::asset::Asset;

/// Join all assets, in order, into a single asset named `file`.
///
/// Files are joined with a single `\n` between each pair, whether or not
/// they already end with one; nothing is appended after the last file.
/// No input yields no output.
pub fn concat(assets: Vec<Asset>, file: &str) -> Vec<Asset> {
    let Some(first) = assets.first() else {
        return Vec::new();
    };
    let base = first.base.clone();

    let mut contents = Vec::with_capacity(assets.iter().map(|a| a.contents.len() + 1).sum());
    for (i, asset) in assets.iter().enumerate() {
        if i > 0 {
            contents.push(b'\n');
        }
        contents.extend_from_slice(&asset.contents);
    }

    vec![Asset::new(base, file, contents)]
}
