//! Structured rows.
//!
//! A [`Row`] holds one [`Value`] per field of its [`Schema`], in field order. Rows are
//! validated on construction and immutable afterwards. Floating point values are wrapped in
//! [`OrderedFloat`] so rows are `Eq + Hash`, which lets callers compare row multisets.

use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A single field value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Null,
    Boolean(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(OrderedFloat<f32>),
    Double(OrderedFloat<f64>),
    String(String),
    Bytes(Vec<u8>),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Row(Row),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Any integer variant widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) | Value::DateTime(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(v.0)),
            Value::Double(v) => Some(v.0),
            _ => None,
        }
    }

    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Value::Row(r) => Some(r),
            _ => None,
        }
    }

    /// Check this value against a field type, recursing into nested values.
    ///
    /// `Null` is accepted only when `nullable` is set. Array elements and map values are
    /// never nullable.
    pub fn conforms_to(&self, field_type: &FieldType, nullable: bool) -> bool {
        match (self, field_type) {
            (Value::Null, _) => nullable,
            (Value::Boolean(_), FieldType::Boolean)
            | (Value::Int16(_), FieldType::Int16)
            | (Value::Int32(_), FieldType::Int32)
            | (Value::Int64(_), FieldType::Int64)
            | (Value::Float(_), FieldType::Float)
            | (Value::Double(_), FieldType::Double)
            | (Value::String(_), FieldType::String)
            | (Value::Bytes(_), FieldType::Bytes)
            | (Value::DateTime(_), FieldType::DateTime) => true,
            (Value::Array(items), FieldType::Array(e)) => items.iter().all(|v| v.conforms_to(e, false)),
            (Value::Map(entries), FieldType::Map(v)) => entries.values().all(|x| x.conforms_to(v, false)),
            (Value::Row(row), FieldType::Row(s)) => row.schema().as_ref() == s.as_ref(),
            _ => false,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::DateTime(_) => "datetime",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Row(_) => "row",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) | Value::DateTime(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => f.write_str(v),
            Value::Bytes(v) => write!(f, "{v:?}"),
            Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Row(r) => write!(f, "{r}"),
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

value_from! {
    bool => Boolean,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float,
    f64 => Double,
    String => String,
    &str => String,
    Vec<u8> => Bytes,
    Row => Row,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// An immutable record conforming to one [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    schema: Arc<Schema>,
    values: Vec<Value>,
}

impl Row {
    /// Build a row from values in field order.
    ///
    /// # Errors
    /// [`Error::SchemaMismatch`] if the arity differs or a value does not conform to its field.
    pub fn new(schema: Arc<Schema>, values: Vec<Value>) -> Result<Self> {
        if values.len() != schema.len() {
            return Err(Error::SchemaMismatch(format!(
                "expected {} values for schema {schema}, got {}",
                schema.len(),
                values.len()
            )));
        }
        for (field, value) in schema.fields().iter().zip(&values) {
            if !value.conforms_to(&field.field_type, field.nullable) {
                return Err(Error::SchemaMismatch(format!(
                    "field '{}' expects {}{}, got {}",
                    field.name,
                    field.field_type,
                    if field.nullable { " (nullable)" } else { "" },
                    value.kind()
                )));
            }
        }
        Ok(Self { schema, values })
    }

    /// Skip validation for values the crate built to match `schema`.
    pub(crate) fn new_unchecked(schema: Arc<Schema>, values: Vec<Value>) -> Self {
        debug_assert_eq!(schema.len(), values.len());
        Self { schema, values }
    }

    pub fn builder(schema: Arc<Schema>) -> RowBuilder {
        RowBuilder::new(schema)
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Value at field position `index`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the field called `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.values.get(i))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Row{")?;
        for (i, (field, value)) in self.schema.fields().iter().zip(&self.values).enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={value}", field.name)?;
        }
        f.write_str("}")
    }
}

/// Builds a [`Row`] by field name; unset nullable fields become `Null`.
#[derive(Debug, Clone)]
pub struct RowBuilder {
    schema: Arc<Schema>,
    values: Vec<Option<Value>>,
    unknown: Vec<String>,
}

impl RowBuilder {
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![None; schema.len()];
        Self {
            schema,
            values,
            unknown: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, name: &str, value: impl Into<Value>) -> Self {
        match self.schema.index_of(name) {
            Some(i) => self.values[i] = Some(value.into()),
            None => self.unknown.push(name.to_string()),
        }
        self
    }

    /// # Errors
    /// [`Error::SchemaMismatch`] for unknown field names, missing non-nullable fields, or
    /// values of the wrong type.
    pub fn build(self) -> Result<Row> {
        if let Some(name) = self.unknown.first() {
            return Err(Error::SchemaMismatch(format!(
                "schema {} has no field '{name}'",
                self.schema
            )));
        }
        let mut values = Vec::with_capacity(self.values.len());
        for (field, value) in self.schema.fields().iter().zip(self.values) {
            match value {
                Some(v) => values.push(v),
                None if field.nullable => values.push(Value::Null),
                None => {
                    return Err(Error::SchemaMismatch(format!(
                        "missing value for non-nullable field '{}'",
                        field.name
                    )));
                }
            }
        }
        Row::new(self.schema, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Arc<Schema> {
        Arc::new(
            Schema::builder()
                .add_field("anInteger", FieldType::Int32)
                .add_nullable_field("aString", FieldType::String)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_builder_fills_nullable_fields() {
        let row = Row::builder(schema()).with_value("anInteger", 7).build().unwrap();
        assert_eq!(row.get("anInteger"), Some(&Value::Int32(7)));
        assert_eq!(row.get("aString"), Some(&Value::Null));
        assert_eq!(row.to_string(), "Row{anInteger=7, aString=null}");
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let err = Row::new(schema(), vec![Value::from("x"), Value::Null]).unwrap_err();
        assert!(matches!(err, Error::SchemaMismatch(_)));

        let err = Row::builder(schema()).with_value("aString", "s").build().unwrap_err();
        assert!(err.to_string().contains("anInteger"));

        let err = Row::builder(schema())
            .with_value("anInteger", 1)
            .with_value("nope", 1)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn test_equal_rows_hash_equally() {
        use std::collections::HashSet;
        let a = Row::new(schema(), vec![Value::from(1), Value::from(Some("a"))]).unwrap();
        let b = Row::new(schema(), vec![1.into(), "a".into()]).unwrap();
        let set: HashSet<Row> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }
}
