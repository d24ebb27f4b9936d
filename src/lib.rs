//! # filebeam
//!
//! Schema-aware bridges between files and structured rows.
//!
//! - **Read**: expand file patterns (once, or continuously by polling), decode every matched
//!   file with a pluggable record format, and emit the records as [`Row`]s of one schema.
//! - **Write**: encode rows with a record format and route each row to a destination chosen
//!   per row, committing sharded files atomically.
//!
//! ## Key Features
//!
//! - **Formats** - Avro, Parquet, newline-delimited JSON and CSV (each behind a feature flag),
//!   resolved by identifier through a [`FormatRegistry`]
//! - **Streaming discovery** - polling with de-duplication by path and termination after a
//!   quiet period, cancellable from any thread
//! - **Pattern input** - patterns may arrive as rows instead of configuration
//! - **Dynamic destinations** - per-row keys, per-key filename policies and schemas
//! - **Transparent compression** - gzip, zstd, bzip2 and xz for the text formats
//! - **Parallel I/O** - files decoded and shards encoded with rayon
//!
//! ## Quick Start
//!
//! ```no_run
//! use filebeam::*;
//!
//! # fn main() -> filebeam::Result<()> {
//! let registry = FormatRegistry::with_builtin_formats();
//! let schema = r#"{"type":"record","name":"r","fields":[{"name":"string","type":"string"}]}"#;
//!
//! let config = ReadConfiguration::new("avro", schema).with_filepattern("/data/in/*.avro");
//! let rows = FileReadTransform::from_config(config, &registry)?
//!     .expand(None)?
//!     .collect_rows()?;
//!
//! let write = WriteConfiguration::new("json", "/data/out/copy").with_schema(schema);
//! let result = FileWriteTransform::from_config(write, &registry)?.write_rows(rows)?;
//! println!("wrote {} records", result.total_records());
//! # Ok(())
//! # }
//! ```
//!
//! ## Streaming
//!
//! Setting `pollIntervalMillis` turns the read into a polling session. Each file is emitted
//! once per session, identified by its path; a file rewritten in place is not read again.
//! `terminateAfterSecondsSinceNewOutput` ends the session after that long without a new file;
//! without it, the session runs until [`ReadStream::cancel`] is called.
//!
//! ```no_run
//! use filebeam::*;
//!
//! # fn main() -> filebeam::Result<()> {
//! # let registry = FormatRegistry::with_builtin_formats();
//! # let schema = "/etc/schemas/events.avsc";
//! let config = ReadConfiguration::new("json", schema)
//!     .with_filepattern("/data/landing/*.json")
//!     .with_poll_interval_millis(100)
//!     .with_terminate_after_seconds_since_new_output(3);
//! for row in FileReadTransform::from_config(config, &registry)?.expand(None)? {
//!     println!("{}", row?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `io-avro`, `io-parquet`, `io-jsonl`, `io-csv` - record formats
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`, `compression-xz`
//! - `parallel-io` - parallel decode and encode (otherwise sequential)
//!
//! All are enabled by default.

pub mod config;
pub mod destinations;
pub mod error;
pub mod format;
pub mod io;
pub mod read;
pub mod row;
pub mod schema;
pub mod testing;
pub mod write;

pub use config::{ReadConfiguration, WriteConfiguration, resolve_schema_text};
pub use destinations::{
    DestinationKey, DestinationStrategy, FilenamePolicy, FnDestinations, SingleDestination,
};
pub use error::{Error, Result};
pub use format::{FormatRegistry, RecordCodec, RecordFormat};
pub use io::{CancelToken, Compression, FileDiscovery, MatchedFile, PollSettings, PollingDiscovery};
pub use read::{
    FILEPATTERN_ROW_FIELD_NAME, FileReadTransform, PatternInput, ReadMode, ReadStream,
    filepattern_schema,
};
pub use row::{Row, RowBuilder, Value};
pub use schema::{Field, FieldType, Schema, SchemaBuilder};
pub use write::{FileWriteTransform, WriteResult, WrittenFile};
