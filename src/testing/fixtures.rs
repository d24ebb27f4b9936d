//! Schemas and rows for tests.

use crate::row::{Row, Value};
use crate::schema::{FieldType, Schema};
use std::sync::Arc;

/// Schema with one field of every primitive type plus two nullable fields.
///
/// | Field | Type |
/// |---|---|
/// | `aBoolean` | boolean |
/// | `aShort` | int16 |
/// | `anInteger` | int32 |
/// | `aLong` | int64 |
/// | `aFloat` | float |
/// | `aDouble` | double |
/// | `aString` | string |
/// | `someBytes` | bytes |
/// | `aDateTime` | datetime |
/// | `aNullableString` | string, nullable |
/// | `aNullableLong` | int64, nullable |
#[must_use]
pub fn all_primitive_data_types_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .add_field("aBoolean", FieldType::Boolean)
            .add_field("aShort", FieldType::Int16)
            .add_field("anInteger", FieldType::Int32)
            .add_field("aLong", FieldType::Int64)
            .add_field("aFloat", FieldType::Float)
            .add_field("aDouble", FieldType::Double)
            .add_field("aString", FieldType::String)
            .add_field("someBytes", FieldType::Bytes)
            .add_field("aDateTime", FieldType::DateTime)
            .add_nullable_field("aNullableString", FieldType::String)
            .add_nullable_field("aNullableLong", FieldType::Int64)
            .build()
            .expect("fixture schema is valid"),
    )
}

/// Rows of [`all_primitive_data_types_schema`], covering extremes, empty values and nulls.
#[must_use]
pub fn all_primitive_data_types_rows() -> Vec<Row> {
    let schema = all_primitive_data_types_schema();
    let rows: Vec<Vec<Value>> = vec![
        vec![
            true.into(),
            1i16.into(),
            1i32.into(),
            1i64.into(),
            1.5f32.into(),
            1.25f64.into(),
            "a".into(),
            vec![0u8, 1, 2].into(),
            Value::DateTime(0),
            "x".into(),
            10i64.into(),
        ],
        vec![
            false.into(),
            i16::MIN.into(),
            i32::MIN.into(),
            i64::MIN.into(),
            (-0.5f32).into(),
            (-1.0e300f64).into(),
            "with \"quotes\", commas\nand a newline".into(),
            Vec::<u8>::new().into(),
            Value::DateTime(-86_400_000),
            Value::Null,
            Value::Null,
        ],
        vec![
            true.into(),
            i16::MAX.into(),
            i32::MAX.into(),
            i64::MAX.into(),
            3.25e10f32.into(),
            f64::MAX.into(),
            "ünïcödé ✓".into(),
            vec![255u8].into(),
            Value::DateTime(1_700_000_000_123),
            String::new().into(),
            (-1i64).into(),
        ],
    ];
    rows.into_iter()
        .map(|values| Row::new(Arc::clone(&schema), values).expect("fixture row is valid"))
        .collect()
}

/// Single non-nullable string field named `string`.
#[must_use]
pub fn string_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .add_field("string", FieldType::String)
            .build()
            .expect("fixture schema is valid"),
    )
}

/// `count` rows of [`string_schema`]: `"{prefix}0"`, `"{prefix}1"`, ...
#[must_use]
pub fn string_rows(prefix: &str, count: usize) -> Vec<Row> {
    let schema = string_schema();
    (0..count)
        .map(|i| {
            Row::new(Arc::clone(&schema), vec![format!("{prefix}{i}").into()])
                .expect("fixture row is valid")
        })
        .collect()
}
