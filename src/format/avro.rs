//! Avro object container files via `apache-avro`.
//!
//! Files are read with the writer schema embedded in the container; record fields are then
//! matched to the configured schema by name, so column order in the file does not matter and
//! fields missing from the file decode as `null` when nullable.

use super::{RecordCodec, RecordFormat, check_row_schema};
use crate::error::{Error, Result};
use crate::io::Compression;
use crate::row::{Row, Value};
use crate::schema::text::{parse_schema_text, render_schema_json};
use crate::schema::{FieldType, Schema};
use anyhow::Context;
use apache_avro::types::Value as AvroValue;
use apache_avro::{Reader, Schema as AvroSchema, Writer};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// The `avro` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct AvroFormat;

impl RecordFormat for AvroFormat {
    fn identifier(&self) -> &str {
        "avro"
    }

    fn file_suffix(&self) -> &str {
        ".avro"
    }

    fn parse_schema(&self, text: &str) -> Result<Schema> {
        AvroSchema::parse_str(text)
            .map_err(|e| Error::SchemaResolution(format!("invalid Avro schema: {e}")))?;
        parse_schema_text(text)
    }

    fn read_file(
        &self,
        file: File,
        path: &Path,
        schema: &Arc<Schema>,
        _compression: Compression,
    ) -> anyhow::Result<Vec<Row>> {
        let codec = AvroCodec::new(Arc::clone(schema))?;
        let reader = Reader::new(BufReader::new(file))
            .with_context(|| format!("open Avro container {}", path.display()))?;
        let mut rows = Vec::new();
        for (i, value) in reader.enumerate() {
            let value = value.with_context(|| format!("read Avro record #{}", i + 1))?;
            let row = codec
                .decode(value)
                .with_context(|| format!("decode Avro record #{}", i + 1))?;
            rows.push(row);
        }
        trace!(path = %path.display(), records = rows.len(), "decoded Avro file");
        Ok(rows)
    }

    fn write_file(
        &self,
        file: File,
        schema: &Arc<Schema>,
        rows: &[Row],
        _compression: Compression,
    ) -> anyhow::Result<u64> {
        let codec = AvroCodec::new(Arc::clone(schema))?;
        let mut writer = Writer::new(codec.avro_schema(), BufWriter::new(file));
        for (i, row) in rows.iter().enumerate() {
            let record = codec.encode(row)?;
            writer
                .append(record)
                .with_context(|| format!("append Avro record #{}", i + 1))?;
        }
        writer.flush().context("flush Avro block")?;
        writer
            .into_inner()
            .context("finish Avro container")?
            .flush()
            .context("flush Avro file")?;
        Ok(rows.len() as u64)
    }
}

/// Row ⇄ Avro [`AvroValue`] conversion for one schema.
#[derive(Debug, Clone)]
pub struct AvroCodec {
    schema: Arc<Schema>,
    avro: AvroSchema,
}

impl AvroCodec {
    /// # Errors
    /// [`Error::SchemaResolution`] if the schema cannot be expressed in Avro (for example a
    /// field name that is not a valid Avro name).
    pub fn new(schema: Arc<Schema>) -> Result<Self> {
        let avro = AvroSchema::parse(&render_schema_json(&schema))
            .map_err(|e| Error::SchemaResolution(format!("cannot express schema in Avro: {e}")))?;
        Ok(Self { schema, avro })
    }

    pub fn avro_schema(&self) -> &AvroSchema {
        &self.avro
    }
}

impl RecordCodec for AvroCodec {
    type Record = AvroValue;

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn encode(&self, row: &Row) -> Result<AvroValue> {
        check_row_schema(row, &self.schema)?;
        row_to_avro(row)
    }

    fn decode(&self, record: AvroValue) -> Result<Row> {
        match record {
            AvroValue::Record(fields) => avro_to_row(fields, &self.schema),
            other => Err(Error::SchemaMismatch(format!(
                "expected an Avro record, got {other:?}"
            ))),
        }
    }
}

fn row_to_avro(row: &Row) -> Result<AvroValue> {
    let mut fields = Vec::with_capacity(row.len());
    for (field, value) in row.schema().fields().iter().zip(row.values()) {
        let v = value_to_avro(value, &field.field_type, field.nullable)
            .map_err(|e| Error::RecordEncode(format!("field '{}': {e}", field.name)))?;
        fields.push((field.name.clone(), v));
    }
    Ok(AvroValue::Record(fields))
}

/// Nullable fields are written as `["null", T]` unions: branch 0 is null, branch 1 the value.
fn value_to_avro(value: &Value, ty: &FieldType, nullable: bool) -> Result<AvroValue> {
    let inner = match (value, ty) {
        (Value::Null, _) if nullable => return Ok(AvroValue::Union(0, Box::new(AvroValue::Null))),
        (Value::Boolean(b), FieldType::Boolean) => AvroValue::Boolean(*b),
        (Value::Int16(v), FieldType::Int16) => AvroValue::Int(i32::from(*v)),
        (Value::Int32(v), FieldType::Int32) => AvroValue::Int(*v),
        (Value::Int64(v), FieldType::Int64) => AvroValue::Long(*v),
        (Value::Float(v), FieldType::Float) => AvroValue::Float(v.0),
        (Value::Double(v), FieldType::Double) => AvroValue::Double(v.0),
        (Value::String(s), FieldType::String) => AvroValue::String(s.clone()),
        (Value::Bytes(b), FieldType::Bytes) => AvroValue::Bytes(b.clone()),
        (Value::DateTime(ms), FieldType::DateTime) => AvroValue::TimestampMillis(*ms),
        (Value::Array(items), FieldType::Array(e)) => AvroValue::Array(
            items
                .iter()
                .map(|v| value_to_avro(v, e, false))
                .collect::<Result<_>>()?,
        ),
        (Value::Map(entries), FieldType::Map(t)) => AvroValue::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), value_to_avro(v, t, false)?)))
                .collect::<Result<HashMap<_, _>>>()?,
        ),
        (Value::Row(r), FieldType::Row(_)) => row_to_avro(r)?,
        (v, t) => return Err(Error::RecordEncode(format!("{v} is not a valid {t}"))),
    };
    Ok(if nullable {
        AvroValue::Union(1, Box::new(inner))
    } else {
        inner
    })
}

fn avro_to_row(fields: Vec<(String, AvroValue)>, schema: &Arc<Schema>) -> Result<Row> {
    let mut by_name: HashMap<String, AvroValue> = fields.into_iter().collect();
    let mut values = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        let value = match by_name.remove(&field.name) {
            Some(v) => avro_to_value(v, &field.field_type, field.nullable)
                .map_err(|e| Error::SchemaMismatch(format!("field '{}': {e}", field.name)))?,
            None if field.nullable => Value::Null,
            None => {
                return Err(Error::SchemaMismatch(format!(
                    "record has no value for non-nullable field '{}'",
                    field.name
                )));
            }
        };
        values.push(value);
    }
    Row::new(Arc::clone(schema), values)
}

fn avro_to_value(value: AvroValue, ty: &FieldType, nullable: bool) -> Result<Value> {
    let value = match value {
        AvroValue::Union(_, inner) => *inner,
        v => v,
    };
    Ok(match (value, ty) {
        (AvroValue::Null, _) if nullable => Value::Null,
        (AvroValue::Boolean(b), FieldType::Boolean) => Value::Boolean(b),
        (AvroValue::Int(v), FieldType::Int16) => Value::Int16(
            i16::try_from(v).map_err(|_| Error::SchemaMismatch(format!("{v} overflows int16")))?,
        ),
        (AvroValue::Int(v), FieldType::Int32) => Value::Int32(v),
        (AvroValue::Int(v), FieldType::Int64) => Value::Int64(i64::from(v)),
        (AvroValue::Long(v), FieldType::Int64) => Value::Int64(v),
        (AvroValue::Long(v) | AvroValue::TimestampMillis(v), FieldType::DateTime) => {
            Value::DateTime(v)
        }
        (AvroValue::TimestampMicros(v), FieldType::DateTime) => Value::DateTime(v.div_euclid(1000)),
        (AvroValue::Float(v), FieldType::Float) => Value::Float(v.into()),
        (AvroValue::Float(v), FieldType::Double) => Value::Double(f64::from(v).into()),
        (AvroValue::Double(v), FieldType::Double) => Value::Double(v.into()),
        (AvroValue::String(s) | AvroValue::Enum(_, s), FieldType::String) => Value::String(s),
        (AvroValue::Bytes(b) | AvroValue::Fixed(_, b), FieldType::Bytes) => Value::Bytes(b),
        (AvroValue::Array(items), FieldType::Array(e)) => Value::Array(
            items
                .into_iter()
                .map(|v| avro_to_value(v, e, false))
                .collect::<Result<_>>()?,
        ),
        (AvroValue::Map(entries), FieldType::Map(t)) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| Ok((k, avro_to_value(v, t, false)?)))
                .collect::<Result<BTreeMap<_, _>>>()?,
        ),
        (AvroValue::Record(fields), FieldType::Row(s)) => Value::Row(avro_to_row(fields, s)?),
        (AvroValue::Null, t) => {
            return Err(Error::SchemaMismatch(format!("null for non-nullable {t}")));
        }
        (v, t) => return Err(Error::SchemaMismatch(format!("cannot read {v:?} as {t}"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{all_primitive_data_types_rows, all_primitive_data_types_schema};

    #[test]
    fn test_codec_roundtrips_primitive_rows() {
        let codec = AvroCodec::new(all_primitive_data_types_schema()).unwrap();
        for row in all_primitive_data_types_rows() {
            let record = codec.encode(&row).unwrap();
            assert_eq!(codec.decode(record).unwrap(), row);
        }
    }

    #[test]
    fn test_nullable_values_use_union_branches() {
        let schema = Arc::new(
            Schema::builder()
                .add_nullable_field("s", FieldType::String)
                .build()
                .unwrap(),
        );
        let codec = AvroCodec::new(Arc::clone(&schema)).unwrap();
        let null_row = Row::new(Arc::clone(&schema), vec![Value::Null]).unwrap();
        let set_row = Row::new(schema, vec!["x".into()]).unwrap();

        assert_eq!(
            codec.encode(&null_row).unwrap(),
            AvroValue::Record(vec![("s".into(), AvroValue::Union(0, Box::new(AvroValue::Null)))])
        );
        assert_eq!(
            codec.encode(&set_row).unwrap(),
            AvroValue::Record(vec![(
                "s".into(),
                AvroValue::Union(1, Box::new(AvroValue::String("x".into())))
            )])
        );
    }

    #[test]
    fn test_decode_rejects_missing_required_field() {
        let codec = AvroCodec::new(all_primitive_data_types_schema()).unwrap();
        let err = codec.decode(AvroValue::Record(vec![])).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));
    }
}
