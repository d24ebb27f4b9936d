//! Parquet files via Arrow record batches.
//!
//! Rows are converted column-wise into Arrow arrays, so schemas are mapped onto Arrow types
//! directly rather than through a serde model:
//!
//! | Field type | Arrow type |
//! |---|---|
//! | `boolean` | `Boolean` |
//! | `int16` / `int32` / `int64` | `Int16` / `Int32` / `Int64` |
//! | `float` / `double` | `Float32` / `Float64` |
//! | `string` / `bytes` | `Utf8` / `Binary` |
//! | `datetime` | `Timestamp(Millisecond)` |
//! | `array<T>` | `List<T>` |
//! | `row{..}` | `Struct` |
//!
//! `map` fields have no mapping and are rejected when the schema is resolved.

use super::RecordFormat;
use crate::error::{Error, Result};
use crate::io::Compression;
use crate::row::{Row, Value};
use crate::schema::{FieldType, Schema};
use anyhow::{Context, anyhow, bail};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryArray, BooleanArray, Float32Array, Float64Array, Int16Array,
    Int32Array, Int64Array, ListArray, StringArray, StructArray, TimestampMillisecondArray,
};
use arrow::buffer::{NullBuffer, OffsetBuffer};
use arrow::datatypes::{
    ArrowPrimitiveType, DataType, Field as ArrowField, Fields, Float32Type, Float64Type,
    Int16Type, Int32Type, Int64Type, Schema as ArrowSchema, TimeUnit, TimestampMillisecondType,
};
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::trace;

/// Placeholder for children of null struct slots and absent columns.
static NULL: Value = Value::Null;

/// The `parquet` format.
#[derive(Debug, Clone, Copy)]
pub struct ParquetFormat {
    /// Rows per record batch on both the read and write paths.
    pub batch_rows: usize,
}

impl Default for ParquetFormat {
    fn default() -> Self {
        Self { batch_rows: 8192 }
    }
}

impl RecordFormat for ParquetFormat {
    fn identifier(&self) -> &str {
        "parquet"
    }

    fn file_suffix(&self) -> &str {
        ".parquet"
    }

    fn check_schema(&self, schema: &Schema) -> Result<()> {
        fn check(ty: &FieldType, name: &str) -> Result<()> {
            match ty {
                FieldType::Map(_) => Err(Error::SchemaResolution(format!(
                    "parquet cannot represent map field '{name}'"
                ))),
                FieldType::Array(e) => check(e, name),
                FieldType::Row(s) => s.fields().iter().try_for_each(|f| check(&f.field_type, &f.name)),
                _ => Ok(()),
            }
        }
        schema
            .fields()
            .iter()
            .try_for_each(|f| check(&f.field_type, &f.name))
    }

    fn read_file(
        &self,
        file: File,
        path: &Path,
        schema: &Arc<Schema>,
        _compression: Compression,
    ) -> anyhow::Result<Vec<Row>> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .context("open ParquetRecordBatchReader")?
            .with_batch_size(self.batch_rows.max(1))
            .build()
            .context("build ParquetRecordBatchReader")?;

        let mut out = Vec::new();
        for (i, batch) in reader.enumerate() {
            let batch = batch.with_context(|| format!("read batch #{}", i + 1))?;
            let rows = batch_to_rows(batch, schema)
                .with_context(|| format!("decode batch #{}", i + 1))?;
            out.extend(rows);
        }
        trace!(path = %path.display(), records = out.len(), "decoded Parquet file");
        Ok(out)
    }

    fn write_file(
        &self,
        file: File,
        schema: &Arc<Schema>,
        rows: &[Row],
        _compression: Compression,
    ) -> anyhow::Result<u64> {
        let arrow_schema = Arc::new(arrow_schema(schema));
        let props = WriterProperties::builder().build();
        let mut writer = ArrowWriter::try_new(file, Arc::clone(&arrow_schema), Some(props))
            .context("create ArrowWriter")?;
        for chunk in rows.chunks(self.batch_rows.max(1)) {
            let batch = rows_to_batch(chunk, schema, &arrow_schema)?;
            writer.write(&batch).context("write batch to parquet")?;
        }
        writer.close().context("close ArrowWriter")?;
        Ok(rows.len() as u64)
    }
}

/// The Arrow schema rows of `schema` are stored under.
#[must_use]
pub fn arrow_schema(schema: &Schema) -> ArrowSchema {
    ArrowSchema::new(arrow_fields(schema))
}

fn arrow_fields(schema: &Schema) -> Fields {
    schema
        .fields()
        .iter()
        .map(|f| ArrowField::new(&f.name, arrow_type(&f.field_type), f.nullable))
        .collect::<Vec<_>>()
        .into()
}

fn arrow_type(ty: &FieldType) -> DataType {
    match ty {
        FieldType::Boolean => DataType::Boolean,
        FieldType::Int16 => DataType::Int16,
        FieldType::Int32 => DataType::Int32,
        FieldType::Int64 => DataType::Int64,
        FieldType::Float => DataType::Float32,
        FieldType::Double => DataType::Float64,
        FieldType::String => DataType::Utf8,
        FieldType::Bytes => DataType::Binary,
        FieldType::DateTime => DataType::Timestamp(TimeUnit::Millisecond, None),
        FieldType::Array(e) => DataType::List(list_item(e)),
        // Rejected by check_schema before any conversion runs.
        FieldType::Map(_) => DataType::Null,
        FieldType::Row(s) => DataType::Struct(arrow_fields(s)),
    }
}

fn list_item(element: &FieldType) -> Arc<ArrowField> {
    Arc::new(ArrowField::new("item", arrow_type(element), false))
}

/// Convert rows sharing `schema` into one record batch.
///
/// # Errors
/// If a row does not carry `schema` or Arrow rejects the assembled columns.
pub fn rows_to_batch(
    rows: &[Row],
    schema: &Arc<Schema>,
    arrow_schema: &Arc<ArrowSchema>,
) -> anyhow::Result<RecordBatch> {
    if let Some(row) = rows.iter().find(|r| r.schema() != schema) {
        bail!(Error::RecordEncode(format!(
            "row schema {} does not match destination schema {schema}",
            row.schema()
        )));
    }
    let columns = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let column: Vec<&Value> = rows.iter().map(|r| r.value(i).unwrap_or(&NULL)).collect();
            build_array(&column, &field.field_type)
                .with_context(|| format!("build column '{}'", field.name))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    RecordBatch::try_new(Arc::clone(arrow_schema), columns).context("assemble RecordBatch")
}

fn pick<'a, T>(
    values: &[&'a Value],
    ty: &FieldType,
    f: impl Fn(&'a Value) -> Option<T>,
) -> anyhow::Result<Vec<Option<T>>> {
    values
        .iter()
        .map(|v| match v {
            Value::Null => Ok(None),
            v => f(*v).map(Some).ok_or_else(|| anyhow!("{v} is not a valid {ty}")),
        })
        .collect()
}

fn validity(values: &[&Value]) -> Option<NullBuffer> {
    values
        .iter()
        .any(|v| v.is_null())
        .then(|| NullBuffer::from(values.iter().map(|v| !v.is_null()).collect::<Vec<_>>()))
}

fn build_array(values: &[&Value], ty: &FieldType) -> anyhow::Result<ArrayRef> {
    Ok(match ty {
        FieldType::Boolean => Arc::new(BooleanArray::from(pick(values, ty, |v| match v {
            Value::Boolean(b) => Some(*b),
            _ => None,
        })?)),
        FieldType::Int16 => Arc::new(Int16Array::from(pick(values, ty, |v| match v {
            Value::Int16(x) => Some(*x),
            _ => None,
        })?)),
        FieldType::Int32 => Arc::new(Int32Array::from(pick(values, ty, |v| match v {
            Value::Int32(x) => Some(*x),
            _ => None,
        })?)),
        FieldType::Int64 => Arc::new(Int64Array::from(pick(values, ty, |v| match v {
            Value::Int64(x) => Some(*x),
            _ => None,
        })?)),
        FieldType::Float => Arc::new(Float32Array::from(pick(values, ty, |v| match v {
            Value::Float(x) => Some(x.0),
            _ => None,
        })?)),
        FieldType::Double => Arc::new(Float64Array::from(pick(values, ty, |v| match v {
            Value::Double(x) => Some(x.0),
            _ => None,
        })?)),
        FieldType::String => Arc::new(StringArray::from(pick(values, ty, |v| match v {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        })?)),
        FieldType::Bytes => Arc::new(BinaryArray::from(pick(values, ty, |v| match v {
            Value::Bytes(b) => Some(b.as_slice()),
            _ => None,
        })?)),
        FieldType::DateTime => Arc::new(TimestampMillisecondArray::from(pick(
            values,
            ty,
            |v| match v {
                Value::DateTime(ms) => Some(*ms),
                _ => None,
            },
        )?)),
        FieldType::Array(element) => {
            let lists = pick(values, ty, |v| match v {
                Value::Array(items) => Some(items),
                _ => None,
            })?;
            let offsets = OffsetBuffer::<i32>::from_lengths(lists.iter().map(|l| l.map_or(0, Vec::len)));
            let flat: Vec<&Value> = lists.iter().flatten().flat_map(|l| l.iter()).collect();
            let child = build_array(&flat, element)?;
            Arc::new(ListArray::try_new(list_item(element), offsets, child, validity(values))?)
        }
        FieldType::Row(s) => {
            let rows = pick(values, ty, |v| match v {
                Value::Row(r) => Some(r),
                _ => None,
            })?;
            let children = s
                .fields()
                .iter()
                .enumerate()
                .map(|(i, f)| {
                    let column: Vec<&Value> = rows
                        .iter()
                        .map(|r| r.and_then(|r| r.value(i)).unwrap_or(&NULL))
                        .collect();
                    build_array(&column, &f.field_type)
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            Arc::new(StructArray::try_new(arrow_fields(s), children, validity(values))?)
        }
        FieldType::Map(_) => bail!("parquet cannot represent {ty}"),
    })
}

/// Convert a record batch into rows of `schema`, matching columns by name.
///
/// # Errors
/// If a required column is absent or a column's Arrow type does not fit its field.
pub fn batch_to_rows(batch: RecordBatch, schema: &Arc<Schema>) -> anyhow::Result<Vec<Row>> {
    struct_to_rows(&StructArray::from(batch), schema, false)
}

fn struct_to_rows(
    array: &StructArray,
    schema: &Arc<Schema>,
    honor_nulls: bool,
) -> anyhow::Result<Vec<Row>> {
    let mut columns = Vec::with_capacity(schema.len());
    for field in schema.fields() {
        let values = match array.column_by_name(&field.name) {
            Some(column) => read_array(column.as_ref(), &field.field_type)
                .with_context(|| format!("read column '{}'", field.name))?,
            None if field.nullable => vec![Value::Null; array.len()],
            None => bail!("no column for non-nullable field '{}'", field.name),
        };
        columns.push(values.into_iter());
    }
    let mut rows = Vec::with_capacity(array.len());
    for i in 0..array.len() {
        let values: Vec<Value> = columns
            .iter_mut()
            .map(|c| c.next().unwrap_or(Value::Null))
            .collect();
        if honor_nulls && array.is_null(i) {
            continue;
        }
        rows.push(Row::new(Arc::clone(schema), values)?);
    }
    Ok(rows)
}

fn read_primitive<T: ArrowPrimitiveType>(
    array: &dyn Array,
    ty: &FieldType,
    wrap: impl Fn(T::Native) -> Value,
) -> anyhow::Result<Vec<Value>> {
    let a = array
        .as_primitive_opt::<T>()
        .ok_or_else(|| anyhow!("cannot read {} as {ty}", array.data_type()))?;
    Ok(a.iter().map(|v| v.map_or(Value::Null, &wrap)).collect())
}

fn read_array(array: &dyn Array, ty: &FieldType) -> anyhow::Result<Vec<Value>> {
    let mismatch = || anyhow!("cannot read {} as {ty}", array.data_type());
    Ok(match (ty, array.data_type()) {
        (FieldType::Boolean, _) => array
            .as_boolean_opt()
            .ok_or_else(mismatch)?
            .iter()
            .map(|v| v.map_or(Value::Null, Value::Boolean))
            .collect(),
        (FieldType::Int16, _) => read_primitive::<Int16Type>(array, ty, Value::Int16)?,
        (FieldType::Int32, _) => read_primitive::<Int32Type>(array, ty, Value::Int32)?,
        (FieldType::Int64, DataType::Int32) => {
            read_primitive::<Int32Type>(array, ty, |v| Value::Int64(i64::from(v)))?
        }
        (FieldType::Int64, _) => read_primitive::<Int64Type>(array, ty, Value::Int64)?,
        (FieldType::Float, _) => read_primitive::<Float32Type>(array, ty, |v| Value::Float(v.into()))?,
        (FieldType::Double, DataType::Float32) => {
            read_primitive::<Float32Type>(array, ty, |v| Value::Double(f64::from(v).into()))?
        }
        (FieldType::Double, _) => read_primitive::<Float64Type>(array, ty, |v| Value::Double(v.into()))?,
        (FieldType::DateTime, _) => {
            read_primitive::<TimestampMillisecondType>(array, ty, Value::DateTime)?
        }
        (FieldType::String, _) => array
            .as_string_opt::<i32>()
            .ok_or_else(mismatch)?
            .iter()
            .map(|v| v.map_or(Value::Null, |s| Value::String(s.to_string())))
            .collect(),
        (FieldType::Bytes, _) => array
            .as_binary_opt::<i32>()
            .ok_or_else(mismatch)?
            .iter()
            .map(|v| v.map_or(Value::Null, |b| Value::Bytes(b.to_vec())))
            .collect(),
        (FieldType::Array(element), _) => {
            let list = array.as_list_opt::<i32>().ok_or_else(mismatch)?;
            let mut out = Vec::with_capacity(list.len());
            for i in 0..list.len() {
                out.push(if list.is_null(i) {
                    Value::Null
                } else {
                    Value::Array(read_array(list.value(i).as_ref(), element)?)
                });
            }
            out
        }
        (FieldType::Row(s), _) => {
            let st = array.as_struct_opt().ok_or_else(mismatch)?;
            struct_to_rows_with_gaps(st, s)?
                .into_iter()
                .map(|r| r.map_or(Value::Null, Value::Row))
                .collect()
        }
        (FieldType::Map(_), _) => return Err(mismatch()),
    })
}

/// Like [`struct_to_rows`] but keeps one slot per struct position, `None` where the struct
/// itself is null.
fn struct_to_rows_with_gaps(array: &StructArray, schema: &Arc<Schema>) -> anyhow::Result<Vec<Option<Row>>> {
    let present = struct_to_rows(array, schema, true)?;
    let mut present = present.into_iter();
    Ok((0..array.len())
        .map(|i| if array.is_null(i) { None } else { present.next() })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{all_primitive_data_types_rows, all_primitive_data_types_schema};

    #[test]
    fn test_batch_roundtrips_primitive_rows() {
        let schema = all_primitive_data_types_schema();
        let rows = all_primitive_data_types_rows();
        let arrow = Arc::new(arrow_schema(&schema));
        let batch = rows_to_batch(&rows, &schema, &arrow).unwrap();
        assert_eq!(batch.num_rows(), rows.len());
        assert_eq!(batch_to_rows(batch, &schema).unwrap(), rows);
    }

    #[test]
    fn test_nested_rows_and_lists_roundtrip() {
        let inner = Schema::builder()
            .add_field("x", FieldType::Int32)
            .add_nullable_field("label", FieldType::String)
            .build()
            .unwrap();
        let inner_arc = Arc::new(inner.clone());
        let schema = Arc::new(
            Schema::builder()
                .add_field("tags", FieldType::array_of(FieldType::String))
                .add_nullable_field("point", FieldType::row(inner))
                .build()
                .unwrap(),
        );
        let point = Row::new(Arc::clone(&inner_arc), vec![3i32.into(), Value::Null]).unwrap();
        let rows = vec![
            Row::new(
                Arc::clone(&schema),
                vec![
                    Value::Array(vec!["a".into(), "b".into()]),
                    Value::Row(point),
                ],
            )
            .unwrap(),
            Row::new(Arc::clone(&schema), vec![Value::Array(vec![]), Value::Null]).unwrap(),
        ];
        let arrow = Arc::new(arrow_schema(&schema));
        let batch = rows_to_batch(&rows, &schema, &arrow).unwrap();
        assert_eq!(batch_to_rows(batch, &schema).unwrap(), rows);
    }

    #[test]
    fn test_map_fields_are_rejected() {
        let schema = Schema::builder()
            .add_field("m", FieldType::map_of(FieldType::Int64))
            .build()
            .unwrap();
        assert!(matches!(
            ParquetFormat::default().check_schema(&schema),
            Err(Error::SchemaResolution(_))
        ));
    }
}
