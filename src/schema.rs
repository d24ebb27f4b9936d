//! Row schemas: ordered, named, typed field lists.
//!
//! A [`Schema`] is immutable once built and is shared between rows as `Arc<Schema>`.
//! Equality is structural: two schemas are equal when their fields have the same names,
//! types and nullability in the same order.
//!
//! ```
//! use filebeam::schema::{FieldType, Schema};
//!
//! let schema = Schema::builder()
//!     .add_field("anInteger", FieldType::Int32)
//!     .add_nullable_field("aString", FieldType::String)
//!     .build()?;
//!
//! assert_eq!(schema.index_of("aString"), Some(1));
//! # Ok::<(), filebeam::Error>(())
//! ```

pub mod text;

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// The type of a single field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Bytes,
    /// Milliseconds since the Unix epoch, UTC.
    DateTime,
    /// Ordered list of elements of one type.
    Array(Box<FieldType>),
    /// String-keyed map.
    Map(Box<FieldType>),
    /// Nested row.
    Row(Arc<Schema>),
}

impl FieldType {
    /// `true` for types without nested structure.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            FieldType::Array(_) | FieldType::Map(_) | FieldType::Row(_)
        )
    }

    /// Short lowercase name, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldType::Boolean => "boolean",
            FieldType::Int16 => "int16",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::Float => "float",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Bytes => "bytes",
            FieldType::DateTime => "datetime",
            FieldType::Array(_) => "array",
            FieldType::Map(_) => "map",
            FieldType::Row(_) => "row",
        }
    }

    pub fn array_of(element: FieldType) -> Self {
        FieldType::Array(Box::new(element))
    }

    pub fn map_of(value: FieldType) -> Self {
        FieldType::Map(Box::new(value))
    }

    pub fn row(schema: Schema) -> Self {
        FieldType::Row(Arc::new(schema))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Array(e) => write!(f, "array<{e}>"),
            FieldType::Map(v) => write!(f, "map<string, {v}>"),
            FieldType::Row(s) => write!(f, "row{s}"),
            other => f.write_str(other.type_name()),
        }
    }
}

/// One named, typed field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
        }
    }

    pub fn nullable(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: true,
        }
    }
}

/// Ordered sequence of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema from fields, rejecting empty or duplicate field names.
    ///
    /// # Errors
    /// Returns [`Error::SchemaResolution`] on an empty or repeated field name.
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for field in &fields {
            if field.name.is_empty() {
                return Err(Error::SchemaResolution("field name must not be empty".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(Error::SchemaResolution(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// A one-field schema for crate-defined names, which are known to be non-empty.
    pub(crate) fn single(field: Field) -> Self {
        Self {
            fields: vec![field],
        }
    }

    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Position of the field called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn field_named(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `true` when every field (recursively) is a primitive type.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.fields.iter().all(|f| f.field_type.is_primitive())
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}: {}", field.name, field.field_type)?;
            if field.nullable {
                f.write_str("?")?;
            }
        }
        f.write_str("}")
    }
}

/// Fluent builder for [`Schema`].
#[derive(Debug, Default, Clone)]
pub struct SchemaBuilder {
    fields: Vec<Field>,
}

impl SchemaBuilder {
    #[must_use]
    pub fn add_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(Field::new(name, field_type));
        self
    }

    #[must_use]
    pub fn add_nullable_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(Field::nullable(name, field_type));
        self
    }

    /// # Errors
    /// See [`Schema::new`].
    pub fn build(self) -> Result<Schema> {
        Schema::new(self.fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = Schema::builder()
            .add_field("a", FieldType::Int32)
            .add_field("a", FieldType::String)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::SchemaResolution(_)));
    }

    #[test]
    fn test_structural_equality_ignores_construction_path() {
        let a = Schema::builder()
            .add_field("x", FieldType::array_of(FieldType::Int64))
            .build()
            .unwrap();
        let b = Schema::new(vec![Field::new("x", FieldType::array_of(FieldType::Int64))]).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "{x: array<int64>}");
    }

    #[test]
    fn test_nested_rows_are_not_flat() {
        let inner = Schema::builder().add_field("y", FieldType::Double).build().unwrap();
        let outer = Schema::builder()
            .add_field("x", FieldType::Int32)
            .add_field("inner", FieldType::row(inner))
            .build()
            .unwrap();
        assert!(!outer.is_flat());
        assert_eq!(outer.index_of("inner"), Some(1));
    }
}
