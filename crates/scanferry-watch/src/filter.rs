//! Ignore rules for files that should never be uploaded.

use std::collections::HashSet;
use std::path::Path;

/// Base names skipped by default: platform metadata files scanners and file
/// browsers like to drop next to real documents.
pub const DEFAULT_IGNORE_NAMES: &[&str] = &[".DS_Store"];

/// Decides whether a path should be skipped.
///
/// A path is ignored when its base name exactly matches one of the configured
/// names or starts with a period (hidden files, editor swap files, partial
/// downloads that hide themselves until complete).
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    names: HashSet<String>,
}

impl IgnoreFilter {
    /// Create a filter from a list of exact base names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Check whether `path` should be skipped.
    pub fn should_ignore(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            // Paths like `/` or `..` have no base name to upload.
            return true;
        };
        let name = name.to_string_lossy();
        name.starts_with('.') || self.names.contains(name.as_ref())
    }

}

impl Default for IgnoreFilter {
    fn default() -> Self {
        Self::new(DEFAULT_IGNORE_NAMES.iter().copied())
    }
}
