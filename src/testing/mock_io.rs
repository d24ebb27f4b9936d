//! Temporary locations and fixture files for I/O tests.

use crate::error::{Error, Result};
use crate::format::FormatRegistry;
use crate::io::Compression;
use crate::row::Row;
use crate::schema::Schema;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A temporary directory that is deleted when dropped.
pub struct TempDirPath {
    temp_dir: TempDir,
}

impl TempDirPath {
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// A path inside this directory.
    #[must_use]
    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.path().join(filename)
    }

    /// Glob pattern `<dir>/<pattern>`.
    #[must_use]
    pub fn pattern(&self, pattern: &str) -> String {
        self.file_path(pattern).to_string_lossy().into_owned()
    }
}

/// Write `rows` to `path` with a registered format. Compression follows the path's extension.
///
/// # Errors
///
/// [`Error::UnknownFormat`] for an unregistered format, otherwise any creation or encode
/// failure.
pub fn write_fixture_file(
    registry: &FormatRegistry,
    format: &str,
    path: &Path,
    schema: &Arc<Schema>,
    rows: &[Row],
) -> Result<u64> {
    let format = registry.lookup(format)?;
    let compression = Compression::from_path(path).unwrap_or(Compression::Uncompressed);
    let file =
        File::create(path).map_err(|e| Error::io(format!("create {}", path.display()), e))?;
    format
        .write_file(file, schema, rows, compression)
        .map_err(Error::Other)
}

/// Read every row of `path` with a registered format.
///
/// # Errors
///
/// [`Error::UnknownFormat`] for an unregistered format, [`Error::RecordDecode`] on decode
/// failure.
pub fn read_fixture_file(
    registry: &FormatRegistry,
    format: &str,
    path: &Path,
    schema: &Arc<Schema>,
) -> Result<Vec<Row>> {
    let format = registry.lookup(format)?;
    let file = File::open(path).map_err(|e| Error::io(format!("open {}", path.display()), e))?;
    format
        .read_file(file, path, schema, Compression::Auto)
        .map_err(|source| Error::RecordDecode {
            path: path.to_path_buf(),
            source,
        })
}
