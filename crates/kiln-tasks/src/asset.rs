//! In-flight files passed between pipeline steps

use std::fmt;
use std::path::{Path, PathBuf};

/// A file travelling through a pipeline.
///
/// `base` is the directory the file's `relative` path is measured from; a
/// `dest` step writes the file at `<dest>/<relative>`.
#[derive(Clone, PartialEq, Eq)]
pub struct Asset {
    /// Base directory (absolute)
    pub base: PathBuf,
    /// Path relative to `base`
    pub relative: PathBuf,
    /// File contents
    pub contents: Vec<u8>,
}

impl Asset {
    /// Create a new asset
    pub fn new(base: impl Into<PathBuf>, relative: impl Into<PathBuf>, contents: Vec<u8>) -> Self {
        Self {
            base: base.into(),
            relative: relative.into(),
            contents,
        }
    }

    /// Full path of the asset
    pub fn path(&self) -> PathBuf {
        self.base.join(&self.relative)
    }

    /// Lowercased file extension, if any
    pub fn extension(&self) -> Option<String> {
        self.relative
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    /// Whether the asset is a stylesheet
    pub fn is_css(&self) -> bool {
        self.extension().as_deref() == Some("css")
    }

    /// Relative path with forward slashes, as shown to users and browsers
    pub fn display_path(&self) -> String {
        self.relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Replace the file name, keeping the relative directory
    pub fn set_file_name(&mut self, name: &str) {
        self.relative = match self.relative.parent() {
            Some(parent) if parent != Path::new("") => parent.join(name),
            _ => PathBuf::from(name),
        };
    }
}

impl fmt::Debug for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Asset")
            .field("base", &self.base)
            .field("relative", &self.relative)
            .field("len", &self.contents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_extension() {
        let asset = Asset::new("/p/src/sass", "parts/main.SASS", b"a".to_vec());
        assert_eq!(asset.path(), PathBuf::from("/p/src/sass/parts/main.SASS"));
        assert_eq!(asset.extension().as_deref(), Some("sass"));
        assert!(!asset.is_css());
        assert_eq!(asset.display_path(), "parts/main.SASS");
    }

    #[test]
    fn test_set_file_name_keeps_directory() {
        let mut asset = Asset::new("/p", "css/common.css", Vec::new());
        asset.set_file_name("common.min.css");
        assert_eq!(asset.relative, PathBuf::from("css/common.min.css"));

        let mut flat = Asset::new("/p", "common.js", Vec::new());
        flat.set_file_name("common.min.js");
        assert_eq!(flat.relative, PathBuf::from("common.min.js"));
    }
}
