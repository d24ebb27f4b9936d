//! CSV with a header row.
//!
//! Only flat schemas of scalar fields are representable (`Bytes` and nested types are
//! rejected when the schema is resolved). Columns are matched to fields by header name, so
//! column order may differ from field order.
//!
//! Nulls are written as a marker cell, [`DEFAULT_NULL_VALUE`] (`\N`) unless configured with
//! [`CsvFormat::with_null_value`]. A string that equals the marker or starts with `\\` is written
//! with one extra leading `\\`, so empty strings, nulls and marker-like strings all read back
//! unchanged. An empty cell in a nullable non-string column also reads as `null`.

use super::{RecordCodec, RecordFormat, check_row_schema};
use crate::error::{Error, Result};
use crate::io::Compression;
use crate::io::compression::{Encoder, decompressing_reader};
use crate::row::{Row, Value};
use crate::schema::{FieldType, Schema};
use anyhow::{Context, anyhow};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::Arc;

/// Cell written for a null value unless another marker is configured.
pub const DEFAULT_NULL_VALUE: &str = "\\N";

const ESCAPE: char = '\\';

/// The `csv` format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvFormat {
    null_value: String,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            null_value: DEFAULT_NULL_VALUE.to_string(),
        }
    }
}

impl CsvFormat {
    #[must_use]
    pub fn with_null_value(mut self, marker: impl Into<String>) -> Self {
        self.null_value = marker.into();
        self
    }

    pub fn null_value(&self) -> &str {
        &self.null_value
    }

    fn codec(&self, schema: &Arc<Schema>) -> Result<CsvCodec> {
        Ok(CsvCodec::new(Arc::clone(schema))?.with_null_value(self.null_value.clone()))
    }
}

/// Reject nested and bytes fields.
fn check_flat_schema(schema: &Schema) -> Result<()> {
    for field in schema.fields() {
        if !field.field_type.is_primitive() || field.field_type == FieldType::Bytes {
            return Err(Error::SchemaResolution(format!(
                "csv cannot represent field '{}' of type {}",
                field.name, field.field_type
            )));
        }
    }
    Ok(())
}

impl RecordFormat for CsvFormat {
    fn identifier(&self) -> &str {
        "csv"
    }

    fn file_suffix(&self) -> &str {
        ".csv"
    }

    fn check_schema(&self, schema: &Schema) -> Result<()> {
        check_flat_schema(schema)
    }

    fn supports_compression(&self) -> bool {
        true
    }

    fn read_file(
        &self,
        file: File,
        path: &Path,
        schema: &Arc<Schema>,
        compression: Compression,
    ) -> anyhow::Result<Vec<Row>> {
        let codec = self.codec(schema)?;
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(decompressing_reader(file, path, compression)?);
        let headers = rdr.headers().context("read CSV header")?.clone();
        let order = column_order(&headers, schema)?;

        let mut out = Vec::new();
        for (i, rec) in rdr.records().enumerate() {
            let rec = rec.with_context(|| format!("read CSV record #{}", i + 1))?;
            let aligned: StringRecord = order
                .iter()
                .map(|col| col.and_then(|c| rec.get(c)).unwrap_or(self.null_value.as_str()))
                .collect();
            let row = codec
                .decode(aligned)
                .with_context(|| format!("decode CSV record #{}", i + 1))?;
            out.push(row);
        }
        Ok(out)
    }

    fn write_file(
        &self,
        file: File,
        schema: &Arc<Schema>,
        rows: &[Row],
        compression: Compression,
    ) -> anyhow::Result<u64> {
        let codec = self.codec(schema)?;
        let w = Encoder::new(BufWriter::new(file), compression)?;
        let mut wtr = WriterBuilder::new().has_headers(false).from_writer(w);
        wtr.write_record(schema.field_names())
            .context("write CSV header")?;
        for (i, row) in rows.iter().enumerate() {
            wtr.write_record(&codec.encode(row)?)
                .with_context(|| format!("write CSV row #{}", i + 1))?;
        }
        wtr.flush()?;
        let encoder = wtr
            .into_inner()
            .map_err(|e| anyhow!("flush CSV writer: {}", e.error()))?;
        encoder.finish().context("finish CSV output")?;
        Ok(rows.len() as u64)
    }
}

/// For each schema field, the header column holding it. Missing columns are allowed for
/// nullable fields only.
fn column_order(headers: &StringRecord, schema: &Schema) -> anyhow::Result<Vec<Option<usize>>> {
    schema
        .fields()
        .iter()
        .map(|f| {
            let col = headers.iter().position(|h| h == f.name);
            if col.is_none() && !f.nullable {
                return Err(anyhow!("CSV header has no column for field '{}'", f.name));
            }
            Ok(col)
        })
        .collect()
}

/// Row ⇄ CSV record conversion for one flat schema.
#[derive(Debug, Clone)]
pub struct CsvCodec {
    schema: Arc<Schema>,
    null_value: String,
}

impl CsvCodec {
    /// # Errors
    /// [`Error::SchemaResolution`] if the schema is not flat.
    pub fn new(schema: Arc<Schema>) -> Result<Self> {
        check_flat_schema(&schema)?;
        Ok(Self {
            schema,
            null_value: DEFAULT_NULL_VALUE.to_string(),
        })
    }

    #[must_use]
    pub fn with_null_value(mut self, marker: impl Into<String>) -> Self {
        self.null_value = marker.into();
        self
    }

    fn encode_string(&self, s: &str) -> String {
        if s == self.null_value || s.starts_with(ESCAPE) {
            format!("{ESCAPE}{s}")
        } else {
            s.to_string()
        }
    }

    fn parse_cell(&self, cell: &str, ty: &FieldType, nullable: bool) -> Result<Value> {
        let is_null = cell == self.null_value || (cell.is_empty() && *ty != FieldType::String);
        if is_null {
            return if nullable {
                Ok(Value::Null)
            } else {
                Err(Error::SchemaMismatch(format!("null cell for non-nullable {ty}")))
            };
        }
        if *ty == FieldType::String {
            let unescaped = cell.strip_prefix(ESCAPE).unwrap_or(cell);
            return Ok(Value::String(unescaped.to_string()));
        }
        parse_scalar(cell, ty)
    }
}

impl RecordCodec for CsvCodec {
    type Record = StringRecord;

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn encode(&self, row: &Row) -> Result<StringRecord> {
        check_row_schema(row, &self.schema)?;
        Ok(row
            .values()
            .iter()
            .map(|v| match v {
                Value::Null => self.null_value.clone(),
                Value::String(s) => self.encode_string(s),
                other => other.to_string(),
            })
            .collect())
    }

    fn decode(&self, record: StringRecord) -> Result<Row> {
        if record.len() != self.schema.len() {
            return Err(Error::SchemaMismatch(format!(
                "expected {} columns, got {}",
                self.schema.len(),
                record.len()
            )));
        }
        let values = self
            .schema
            .fields()
            .iter()
            .zip(record.iter())
            .map(|(field, cell)| {
                self.parse_cell(cell, &field.field_type, field.nullable)
                    .map_err(|e| Error::SchemaMismatch(format!("field '{}': {e}", field.name)))
            })
            .collect::<Result<Vec<_>>>()?;
        Row::new(Arc::clone(&self.schema), values)
    }
}

fn parse_scalar(cell: &str, ty: &FieldType) -> Result<Value> {
    let bad = |e: &dyn std::fmt::Display| Error::SchemaMismatch(format!("'{cell}' is not a {ty}: {e}"));
    Ok(match ty {
        FieldType::Boolean => Value::Boolean(cell.parse().map_err(|e| bad(&e))?),
        FieldType::Int16 => Value::Int16(cell.parse().map_err(|e| bad(&e))?),
        FieldType::Int32 => Value::Int32(cell.parse().map_err(|e| bad(&e))?),
        FieldType::Int64 => Value::Int64(cell.parse().map_err(|e| bad(&e))?),
        FieldType::DateTime => Value::DateTime(cell.parse().map_err(|e| bad(&e))?),
        FieldType::Float => Value::Float(cell.parse::<f32>().map_err(|e| bad(&e))?.into()),
        FieldType::Double => Value::Double(cell.parse::<f64>().map_err(|e| bad(&e))?.into()),
        other => {
            return Err(Error::SchemaMismatch(format!("csv cannot hold {other}")));
        }
    })
}
