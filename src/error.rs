//! Error taxonomy for file reads and writes.
//!
//! Configuration-time failures ([`Error::InvalidPattern`], [`Error::UnknownFormat`],
//! [`Error::SchemaResolution`], [`Error::InvalidConfiguration`]) surface before any file is
//! touched. Execution failures ([`Error::RecordDecode`], [`Error::RecordEncode`],
//! [`Error::DestinationResolution`], [`Error::FilenameCollision`]) fail the whole unit of work;
//! nothing is skipped or retried here.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed glob syntax.
    #[error("invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    /// No format is registered under this identifier.
    #[error("unknown format '{0}'")]
    UnknownFormat(String),

    /// A format with this identifier is already registered.
    #[error("format '{0}' is already registered")]
    DuplicateFormat(String),

    /// Schema text or schema file could not be read or parsed.
    #[error("schema resolution failed: {0}")]
    SchemaResolution(String),

    /// A value does not conform to the field it is assigned to.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Configuration is inconsistent (both or neither pattern sources, bad shard count, ...).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A record in a matched file could not be decoded; the whole file read fails.
    #[error("failed to decode records in {}: {source:#}", path.display())]
    RecordDecode {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A row could not be encoded for its destination.
    #[error("failed to encode row: {0}")]
    RecordEncode(String),

    /// The destination function failed for a row; the bundle being written fails.
    #[error("destination resolution failed: {0}")]
    DestinationResolution(String),

    /// Two shards (of one or several destinations) resolved to the same final path.
    #[error("filename collision at {}", .0.display())]
    FilenameCollision(PathBuf),

    /// Filesystem failure outside record decoding (temp files, renames, schema files).
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Generic errors (wrapped anyhow)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            context: context.into(),
            source,
        }
    }

    /// `true` for errors raised while validating configuration, before any data moves.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::InvalidPattern { .. }
                | Error::UnknownFormat(_)
                | Error::DuplicateFormat(_)
                | Error::SchemaResolution(_)
                | Error::InvalidConfiguration(_)
        )
    }
}
