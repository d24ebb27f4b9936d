//! Newline-delimited JSON: one object per row.
//!
//! - Blank and whitespace-only lines are skipped on read.
//! - Keys absent from an object decode as `null` for nullable fields.
//! - `Bytes` are arrays of numbers; `DateTime` is epoch milliseconds.
//! - Reads and writes go through [`crate::io::compression`].

use super::{RecordCodec, RecordFormat, check_row_schema};
use crate::error::{Error, Result};
use crate::io::Compression;
use crate::io::compression::{Encoder, decompressing_reader};
use crate::row::{Row, Value};
use crate::schema::{FieldType, Schema};
use anyhow::Context;
use serde_json::{Map as JsonMap, Number, Value as Json};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// The `json` format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl RecordFormat for JsonFormat {
    fn identifier(&self) -> &str {
        "json"
    }

    fn file_suffix(&self) -> &str {
        ".json"
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
        let codec = JsonCodec::new(Arc::clone(schema));
        let rdr = BufReader::new(decompressing_reader(file, path, compression)?);
        let mut out = Vec::new();
        for (i, line) in rdr.lines().enumerate() {
            let line = line.with_context(|| format!("read line {} in {}", i + 1, path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            let json: Json = serde_json::from_str(&line)
                .with_context(|| format!("parse JSON line {}: {}", i + 1, line))?;
            let row = codec
                .decode(json)
                .with_context(|| format!("decode JSON line {}", i + 1))?;
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
        let codec = JsonCodec::new(Arc::clone(schema));
        let mut w = Encoder::new(BufWriter::new(file), compression)?;
        for (i, row) in rows.iter().enumerate() {
            let json = codec.encode(row)?;
            serde_json::to_writer(&mut w, &json)
                .with_context(|| format!("serialize row #{}", i + 1))?;
            w.write_all(b"\n")?;
        }
        w.finish().context("finish JSON output")?;
        Ok(rows.len() as u64)
    }
}

/// Row ⇄ JSON object conversion for one schema.
#[derive(Debug, Clone)]
pub struct JsonCodec {
    schema: Arc<Schema>,
}

impl JsonCodec {
    pub fn new(schema: Arc<Schema>) -> Self {
        Self { schema }
    }
}

impl RecordCodec for JsonCodec {
    type Record = Json;

    fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    fn encode(&self, row: &Row) -> Result<Json> {
        check_row_schema(row, &self.schema)?;
        row_to_json(row)
    }

    fn decode(&self, record: Json) -> Result<Row> {
        match record {
            Json::Object(obj) => json_to_row(obj, &self.schema),
            other => Err(Error::SchemaMismatch(format!(
                "expected a JSON object, got {other}"
            ))),
        }
    }
}

fn row_to_json(row: &Row) -> Result<Json> {
    let mut obj = JsonMap::with_capacity(row.len());
    for (field, value) in row.schema().fields().iter().zip(row.values()) {
        let json = value_to_json(value)
            .map_err(|e| Error::RecordEncode(format!("field '{}': {e}", field.name)))?;
        obj.insert(field.name.clone(), json);
    }
    Ok(Json::Object(obj))
}

fn value_to_json(value: &Value) -> Result<Json> {
    Ok(match value {
        Value::Null => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Int16(v) => Json::from(*v),
        Value::Int32(v) => Json::from(*v),
        Value::Int64(v) | Value::DateTime(v) => Json::from(*v),
        Value::Float(v) => finite(f64::from(v.0))?,
        Value::Double(v) => finite(v.0)?,
        Value::String(s) => Json::String(s.clone()),
        Value::Bytes(b) => Json::Array(b.iter().map(|x| Json::from(*x)).collect()),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect::<Result<_>>()?),
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), value_to_json(v)?)))
                .collect::<Result<_>>()?,
        ),
        Value::Row(r) => row_to_json(r)?,
    })
}

fn finite(v: f64) -> Result<Json> {
    Number::from_f64(v)
        .map(Json::Number)
        .ok_or_else(|| Error::RecordEncode(format!("{v} cannot be represented in JSON")))
}

fn json_to_row(mut obj: JsonMap<String, Json>, schema: &Arc<Schema>) -> Result<Row> {
    let mut values = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        let json = obj.remove(&field.name).unwrap_or(Json::Null);
        let value = json_to_value(json, &field.field_type, field.nullable)
            .map_err(|e| Error::SchemaMismatch(format!("field '{}': {e}", field.name)))?;
        values.push(value);
    }
    Row::new(Arc::clone(schema), values)
}

fn json_to_value(json: Json, ty: &FieldType, nullable: bool) -> Result<Value> {
    let mismatch = |json: &Json| Error::SchemaMismatch(format!("cannot read {json} as {ty}"));
    Ok(match (json, ty) {
        (Json::Null, _) if nullable => Value::Null,
        (Json::Bool(b), FieldType::Boolean) => Value::Boolean(b),
        (Json::Number(n), FieldType::Int16) => n
            .as_i64()
            .and_then(|v| i16::try_from(v).ok())
            .map(Value::Int16)
            .ok_or_else(|| mismatch(&Json::Number(n.clone())))?,
        (Json::Number(n), FieldType::Int32) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Value::Int32)
            .ok_or_else(|| mismatch(&Json::Number(n.clone())))?,
        (Json::Number(n), FieldType::Int64 | FieldType::DateTime) => {
            let v = n.as_i64().ok_or_else(|| mismatch(&Json::Number(n.clone())))?;
            if *ty == FieldType::Int64 {
                Value::Int64(v)
            } else {
                Value::DateTime(v)
            }
        }
        #[allow(clippy::cast_possible_truncation)]
        (Json::Number(n), FieldType::Float) => Value::Float(
            (n.as_f64().ok_or_else(|| mismatch(&Json::Number(n.clone())))? as f32).into(),
        ),
        (Json::Number(n), FieldType::Double) => Value::Double(
            n.as_f64()
                .ok_or_else(|| mismatch(&Json::Number(n.clone())))?
                .into(),
        ),
        (Json::String(s), FieldType::String) => Value::String(s),
        (Json::Array(items), FieldType::Bytes) => Value::Bytes(
            items
                .iter()
                .map(|x| x.as_u64().and_then(|b| u8::try_from(b).ok()).ok_or_else(|| mismatch(x)))
                .collect::<Result<_>>()?,
        ),
        (Json::Array(items), FieldType::Array(e)) => Value::Array(
            items
                .into_iter()
                .map(|x| json_to_value(x, e, false))
                .collect::<Result<_>>()?,
        ),
        (Json::Object(obj), FieldType::Map(t)) => Value::Map(
            obj.into_iter()
                .map(|(k, v)| Ok((k, json_to_value(v, t, false)?)))
                .collect::<Result<_>>()?,
        ),
        (Json::Object(obj), FieldType::Row(s)) => Value::Row(json_to_row(obj, s)?),
        (json, _) => return Err(mismatch(&json)),
    })
}
