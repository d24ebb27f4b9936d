//! Record formats and the registry that resolves them by identifier.
//!
//! A format is a value implementing [`RecordFormat`]: it knows its schema notation, its file
//! suffix, and how to turn one file into rows and rows into one file. Record-oriented formats
//! also expose their per-record [`RecordCodec`], which is what the round-trip guarantees are
//! stated against.
//!
//! Built-in formats (each behind its feature flag):
//!
//! | Identifier | Suffix | Feature |
//! |---|---|---|
//! | `avro` | `.avro` | `io-avro` |
//! | `parquet` | `.parquet` | `io-parquet` |
//! | `json` | `.json` | `io-jsonl` |
//! | `csv` | `.csv` | `io-csv` |
//!
//! # Registration
//!
//! Identifiers are case-insensitive. [`FormatRegistry::register`] rejects an identifier that
//! is already present with [`Error::DuplicateFormat`]; use
//! [`FormatRegistry::register_or_replace`] to override deliberately.

#[cfg(feature = "io-avro")]
pub mod avro;
#[cfg(feature = "io-csv")]
pub mod csv;
#[cfg(feature = "io-jsonl")]
pub mod json;
#[cfg(feature = "io-parquet")]
pub mod parquet;

use crate::error::{Error, Result};
use crate::io::Compression;
use crate::row::Row;
use crate::schema::Schema;
use crate::schema::text::{parse_schema_text, render_schema_text};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Converts between [`Row`]s and one external record representation.
pub trait RecordCodec {
    /// The external record type (an Avro value, a JSON object, a CSV record, ...).
    type Record;

    /// Schema every encoded and decoded row conforms to.
    fn schema(&self) -> &Arc<Schema>;

    /// # Errors
    /// [`Error::RecordEncode`] if the row does not match [`RecordCodec::schema`].
    fn encode(&self, row: &Row) -> Result<Self::Record>;

    /// # Errors
    /// [`Error::SchemaMismatch`] if the record does not fit the schema.
    fn decode(&self, record: Self::Record) -> Result<Row>;
}

/// A file format plug-in.
pub trait RecordFormat: Send + Sync {
    /// Registry identifier, lowercase (e.g. `"avro"`).
    fn identifier(&self) -> &str;

    /// Suffix for written files, including the dot (e.g. `".avro"`).
    fn file_suffix(&self) -> &str;

    /// Parse schema text in this format's notation. Defaults to Avro JSON schema text.
    ///
    /// # Errors
    /// [`Error::SchemaResolution`] on malformed text.
    fn parse_schema(&self, text: &str) -> Result<Schema> {
        let schema = parse_schema_text(text)?;
        self.check_schema(&schema)?;
        Ok(schema)
    }

    /// Render a schema in this format's notation.
    ///
    /// # Errors
    /// [`Error::SchemaResolution`] if the format cannot represent the schema.
    fn render_schema(&self, schema: &Schema) -> Result<String> {
        self.check_schema(schema)?;
        Ok(render_schema_text(schema))
    }

    /// Reject schemas the format cannot represent.
    ///
    /// # Errors
    /// [`Error::SchemaResolution`] naming the unsupported construct.
    fn check_schema(&self, _schema: &Schema) -> Result<()> {
        Ok(())
    }

    /// Whether [`Compression`] settings other than pass-through apply to this format.
    fn supports_compression(&self) -> bool {
        false
    }

    /// Decode every record of an opened file. Any bad record fails the whole file.
    ///
    /// # Errors
    /// Any read or decode failure, with record position context.
    fn read_file(
        &self,
        file: File,
        path: &Path,
        schema: &Arc<Schema>,
        compression: Compression,
    ) -> anyhow::Result<Vec<Row>>;

    /// Encode `rows` into `file`, returning the number of records written.
    ///
    /// # Errors
    /// Any encode or write failure.
    fn write_file(
        &self,
        file: File,
        schema: &Arc<Schema>,
        rows: &[Row],
        compression: Compression,
    ) -> anyhow::Result<u64>;
}

/// Identifier → format lookup table.
#[derive(Clone, Default)]
pub struct FormatRegistry {
    formats: BTreeMap<String, Arc<dyn RecordFormat>>,
}

impl FormatRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every format compiled into this build.
    #[must_use]
    pub fn with_builtin_formats() -> Self {
        let mut registry = Self::new();
        let builtin: Vec<Arc<dyn RecordFormat>> = vec![
            #[cfg(feature = "io-avro")]
            Arc::new(avro::AvroFormat),
            #[cfg(feature = "io-parquet")]
            Arc::new(parquet::ParquetFormat::default()),
            #[cfg(feature = "io-jsonl")]
            Arc::new(json::JsonFormat),
            #[cfg(feature = "io-csv")]
            Arc::new(csv::CsvFormat::default()),
        ];
        for format in builtin {
            registry.register_or_replace(format);
        }
        registry
    }

    /// Add a format.
    ///
    /// # Errors
    /// [`Error::DuplicateFormat`] if the identifier is taken.
    pub fn register(&mut self, format: Arc<dyn RecordFormat>) -> Result<()> {
        let id = format.identifier().to_lowercase();
        if self.formats.contains_key(&id) {
            return Err(Error::DuplicateFormat(id));
        }
        self.formats.insert(id, format);
        Ok(())
    }

    /// Add a format, returning the one it replaced.
    pub fn register_or_replace(
        &mut self,
        format: Arc<dyn RecordFormat>,
    ) -> Option<Arc<dyn RecordFormat>> {
        self.formats.insert(format.identifier().to_lowercase(), format)
    }

    /// # Errors
    /// [`Error::UnknownFormat`] if nothing is registered under `identifier`.
    pub fn lookup(&self, identifier: &str) -> Result<Arc<dyn RecordFormat>> {
        self.formats
            .get(&identifier.to_lowercase())
            .cloned()
            .ok_or_else(|| Error::UnknownFormat(identifier.to_string()))
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.formats.contains_key(&identifier.to_lowercase())
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.formats.keys().map(String::as_str)
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.formats.keys()).finish()
    }
}

/// Ensure `row` carries exactly `schema`, for codecs' encode paths.
pub(crate) fn check_row_schema(row: &Row, schema: &Schema) -> Result<()> {
    if row.schema().as_ref() != schema {
        return Err(Error::RecordEncode(format!(
            "row schema {} does not match destination schema {schema}",
            row.schema()
        )));
    }
    Ok(())
}
