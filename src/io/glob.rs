//! File pattern expansion.
//!
//! A pattern is either a plain path or a glob:
//! - `*` matches any sequence of characters within a path component
//! - `?` matches any single character
//! - `**` matches zero or more directories
//! - `[abc]` / `[!abc]` match a character in / not in the set
//!
//! Zero matches is a valid outcome. Malformed syntax fails with [`Error::InvalidPattern`]
//! before the filesystem is touched. Entries that disappear between listing and the metadata
//! lookup are dropped, as are directories.

use crate::error::{Error, Result};
use glob::{MatchOptions, Pattern};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// A concrete file resolved from a pattern.
///
/// Its identity for de-duplication is [`MatchedFile::path`]; size and modification time are
/// informational and never trigger a re-read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub last_modified: Option<SystemTime>,
}

impl MatchedFile {
    /// Stable identity used by discovery sessions.
    pub fn identity(&self) -> &Path {
        &self.path
    }
}

/// Check pattern syntax without touching the filesystem.
///
/// # Errors
/// [`Error::InvalidPattern`] on malformed glob syntax.
pub fn validate_pattern(pattern: &str) -> Result<()> {
    Pattern::new(pattern)
        .map(|_| ())
        .map_err(|source| Error::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Expand one pattern into its matching files, sorted by path.
///
/// # Errors
/// [`Error::InvalidPattern`] for malformed syntax; [`Error::Io`] when a directory cannot be
/// read for reasons other than the entry having vanished.
pub fn expand_pattern(pattern: &str) -> Result<Vec<MatchedFile>> {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: true,
    };
    let paths = glob::glob_with(pattern, options).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut result = Vec::new();
    for entry in paths {
        let path = match entry {
            Ok(p) => p,
            Err(e) if e.error().kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                let context = format!("list {} for pattern {pattern}", e.path().display());
                let source = std::io::Error::new(e.error().kind(), e.error().to_string());
                return Err(Error::io(context, source));
            }
        };
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => result.push(MatchedFile {
                size_bytes: meta.len(),
                last_modified: meta.modified().ok(),
                path,
            }),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                trace!(path = %path.display(), "file vanished before metadata lookup");
            }
            Err(e) => return Err(Error::io(format!("stat {}", path.display()), e)),
        }
    }

    result.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(result)
}
