//! Schema text: the Avro JSON schema notation used by every built-in format.
//!
//! Mapping:
//!
//! | Field type | Avro JSON |
//! |---|---|
//! | `Boolean` / `Int32` / `Int64` / `Float` / `Double` / `String` / `Bytes` | the matching primitive |
//! | `Int16` | `{"type": "int", "logicalType": "int16"}` |
//! | `DateTime` | `{"type": "long", "logicalType": "timestamp-millis"}` |
//! | `Array(t)` / `Map(t)` | `{"type": "array", "items": t}` / `{"type": "map", "values": t}` |
//! | `Row(s)` | nested `record` |
//! | nullable `t` | `["null", t]` |
//!
//! Enums, fixed types, named type references and unions other than `null | t` are rejected.

use super::{Field, FieldType, Schema};
use crate::error::{Error, Result};
use serde_json::{Map as JsonMap, Value as Json, json};
use std::sync::Arc;

/// Record name used for the top-level record when rendering.
pub const TOP_LEVEL_RECORD_NAME: &str = "topLevelRecord";

/// Parse Avro JSON schema text into a [`Schema`].
///
/// # Errors
/// [`Error::SchemaResolution`] if the text is not JSON, not a record schema, or uses an
/// unsupported construct.
pub fn parse_schema_text(text: &str) -> Result<Schema> {
    let json: Json = serde_json::from_str(text)
        .map_err(|e| Error::SchemaResolution(format!("schema is not valid JSON: {e}")))?;
    parse_record(&json)
}

/// Render a [`Schema`] as Avro JSON schema text.
#[must_use]
pub fn render_schema_text(schema: &Schema) -> String {
    render_record(schema, TOP_LEVEL_RECORD_NAME).to_string()
}

/// Render a [`Schema`] as an Avro JSON value (used by the Avro plug-in).
#[must_use]
pub fn render_schema_json(schema: &Schema) -> Json {
    render_record(schema, TOP_LEVEL_RECORD_NAME)
}

fn parse_record(json: &Json) -> Result<Schema> {
    let obj = json
        .as_object()
        .ok_or_else(|| unsupported("top-level schema must be a JSON object"))?;
    if obj.get("type").and_then(Json::as_str) != Some("record") {
        return Err(unsupported("top-level schema must have type 'record'"));
    }
    let fields = obj
        .get("fields")
        .and_then(Json::as_array)
        .ok_or_else(|| unsupported("record schema has no 'fields' array"))?;

    let mut out = Vec::with_capacity(fields.len());
    for field in fields {
        let name = field
            .get("name")
            .and_then(Json::as_str)
            .ok_or_else(|| unsupported("record field without a 'name'"))?;
        let ty = field
            .get("type")
            .ok_or_else(|| unsupported(&format!("field '{name}' has no 'type'")))?;
        let (field_type, nullable) = parse_type(ty)
            .map_err(|e| Error::SchemaResolution(format!("field '{name}': {}", strip(&e))))?;
        out.push(Field {
            name: name.to_string(),
            field_type,
            nullable,
        });
    }
    Schema::new(out)
}

/// Returns the field type and whether it was wrapped in a `null` union.
fn parse_type(json: &Json) -> Result<(FieldType, bool)> {
    match json {
        Json::String(name) => Ok((parse_primitive(name)?, false)),
        Json::Array(branches) => {
            let non_null: Vec<&Json> = branches.iter().filter(|b| b.as_str() != Some("null")).collect();
            if non_null.len() != 1 || branches.len() != 2 {
                return Err(unsupported("only unions of the form [\"null\", T] are supported"));
            }
            let (ty, _) = parse_type(non_null[0])?;
            Ok((ty, true))
        }
        Json::Object(obj) => Ok((parse_complex(obj)?, false)),
        _ => Err(unsupported("type must be a string, array or object")),
    }
}

fn parse_primitive(name: &str) -> Result<FieldType> {
    Ok(match name {
        "boolean" => FieldType::Boolean,
        "int" => FieldType::Int32,
        "long" => FieldType::Int64,
        "float" => FieldType::Float,
        "double" => FieldType::Double,
        "string" => FieldType::String,
        "bytes" => FieldType::Bytes,
        "null" => return Err(unsupported("a field cannot have type 'null' alone")),
        other => return Err(unsupported(&format!("unsupported type '{other}'"))),
    })
}

fn parse_complex(obj: &JsonMap<String, Json>) -> Result<FieldType> {
    let ty = obj
        .get("type")
        .ok_or_else(|| unsupported("complex type without 'type'"))?;
    let logical = obj.get("logicalType").and_then(Json::as_str);

    match (ty.as_str(), logical) {
        (Some("record"), _) => Ok(FieldType::Row(Arc::new(parse_record(&Json::Object(obj.clone()))?))),
        (Some("array"), _) => {
            let items = obj
                .get("items")
                .ok_or_else(|| unsupported("array without 'items'"))?;
            Ok(FieldType::Array(Box::new(element_type(items)?)))
        }
        (Some("map"), _) => {
            let values = obj
                .get("values")
                .ok_or_else(|| unsupported("map without 'values'"))?;
            Ok(FieldType::Map(Box::new(element_type(values)?)))
        }
        (Some("int"), Some("int16")) => Ok(FieldType::Int16),
        (Some("long"), Some("timestamp-millis")) => Ok(FieldType::DateTime),
        (Some(other), _) if matches!(other, "enum" | "fixed") => {
            Err(unsupported(&format!("unsupported type '{other}'")))
        }
        (Some(name), _) => parse_primitive(name),
        // {"type": {...}} wraps another definition
        (None, _) => Ok(parse_type(ty)?.0),
    }
}

/// Array items and map values must not be nullable unions.
fn element_type(json: &Json) -> Result<FieldType> {
    let (ty, nullable) = parse_type(json)?;
    if nullable {
        return Err(unsupported("nullable array items and map values are not supported"));
    }
    Ok(ty)
}

fn render_record(schema: &Schema, name: &str) -> Json {
    let fields: Vec<Json> = schema
        .fields()
        .iter()
        .map(|f| {
            let nested_name = format!("{name}_{}", f.name);
            let ty = render_type(&f.field_type, &nested_name);
            let ty = if f.nullable { json!(["null", ty]) } else { ty };
            json!({ "name": f.name, "type": ty })
        })
        .collect();
    json!({ "type": "record", "name": name, "fields": fields })
}

fn render_type(ty: &FieldType, name: &str) -> Json {
    match ty {
        FieldType::Boolean => json!("boolean"),
        FieldType::Int16 => json!({ "type": "int", "logicalType": "int16" }),
        FieldType::Int32 => json!("int"),
        FieldType::Int64 => json!("long"),
        FieldType::Float => json!("float"),
        FieldType::Double => json!("double"),
        FieldType::String => json!("string"),
        FieldType::Bytes => json!("bytes"),
        FieldType::DateTime => json!({ "type": "long", "logicalType": "timestamp-millis" }),
        FieldType::Array(e) => json!({ "type": "array", "items": render_type(e, name) }),
        FieldType::Map(v) => json!({ "type": "map", "values": render_type(v, name) }),
        FieldType::Row(s) => render_record(s, name),
    }
}

fn unsupported(msg: &str) -> Error {
    Error::SchemaResolution(msg.to_string())
}

fn strip(e: &Error) -> String {
    match e {
        Error::SchemaResolution(m) => m.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_and_parses_back() {
        let inner = Schema::builder()
            .add_field("lat", FieldType::Double)
            .add_nullable_field("label", FieldType::String)
            .build()
            .unwrap();
        let schema = Schema::builder()
            .add_field("id", FieldType::Int64)
            .add_field("small", FieldType::Int16)
            .add_nullable_field("at", FieldType::DateTime)
            .add_field("tags", FieldType::array_of(FieldType::String))
            .add_field("attrs", FieldType::map_of(FieldType::Int32))
            .add_nullable_field("point", FieldType::row(inner))
            .build()
            .unwrap();

        let text = render_schema_text(&schema);
        assert_eq!(parse_schema_text(&text).unwrap(), schema);
    }

    #[test]
    fn test_accepts_null_second_in_union() {
        let text = r#"{"type":"record","name":"r","fields":[{"name":"a","type":["string","null"]}]}"#;
        let schema = parse_schema_text(text).unwrap();
        assert!(schema.fields()[0].nullable);
        assert_eq!(schema.fields()[0].field_type, FieldType::String);
    }

    #[test]
    fn test_rejects_malformed_and_unsupported() {
        for text in [
            "not json",
            r#"{"type":"enum","name":"e","symbols":["A"]}"#,
            r#"{"type":"record","name":"r","fields":[{"name":"a","type":"Other"}]}"#,
            r#"{"type":"record","name":"r","fields":[{"name":"a","type":["int","string"]}]}"#,
        ] {
            let err = parse_schema_text(text).unwrap_err();
            assert!(matches!(err, Error::SchemaResolution(_)), "{text}: {err}");
        }
    }
}
