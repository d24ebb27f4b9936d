//! File-level round trips through every built-in format.

use filebeam::schema::text::{parse_schema_text, render_schema_text};
use filebeam::testing::*;
use filebeam::*;
use std::sync::Arc;

fn roundtrip(format: &str, file_name: &str, schema: &Arc<Schema>, rows: &[Row]) -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let registry = FormatRegistry::with_builtin_formats();
    let path = dir.file_path(file_name);

    let written = write_fixture_file(&registry, format, &path, schema, rows)?;
    assert_eq!(written, rows.len() as u64);
    let read = read_fixture_file(&registry, format, &path, schema)?;
    assert_rows_equal(&read, rows);
    Ok(())
}

fn flat_schema() -> Arc<Schema> {
    Arc::new(
        Schema::builder()
            .add_field("id", FieldType::Int64)
            .add_field("flag", FieldType::Boolean)
            .add_field("ratio", FieldType::Double)
            .add_field("at", FieldType::DateTime)
            .add_nullable_field("label", FieldType::String)
            .build()
            .unwrap(),
    )
}

fn flat_rows() -> Vec<Row> {
    let schema = flat_schema();
    (0..25i64)
        .map(|i| {
            Row::builder(Arc::clone(&schema))
                .with_value("id", i)
                .with_value("flag", i % 2 == 0)
                .with_value("ratio", i as f64 / 4.0)
                .with_value("at", Value::DateTime(1_600_000_000_000 + i))
                .with_value("label", if i % 5 == 0 { None } else { Some(format!("row,{i}")) })
                .build()
                .unwrap()
        })
        .collect()
}

fn nested_schema() -> Arc<Schema> {
    let address = Schema::builder()
        .add_field("city", FieldType::String)
        .add_nullable_field("zip", FieldType::Int32)
        .build()
        .unwrap();
    Arc::new(
        Schema::builder()
            .add_field("name", FieldType::String)
            .add_field("scores", FieldType::array_of(FieldType::Int64))
            .add_nullable_field("address", FieldType::row(address))
            .build()
            .unwrap(),
    )
}

fn nested_rows() -> Vec<Row> {
    let schema = nested_schema();
    let FieldType::Row(address_schema) = &schema.fields()[2].field_type else {
        unreachable!()
    };
    let address = Row::new(Arc::clone(address_schema), vec!["Oslo".into(), Value::Null]).unwrap();
    vec![
        Row::new(
            Arc::clone(&schema),
            vec![
                "a".into(),
                Value::Array(vec![1i64.into(), 2i64.into()]),
                Value::Row(address),
            ],
        )
        .unwrap(),
        Row::new(Arc::clone(&schema), vec!["b".into(), Value::Array(vec![]), Value::Null]).unwrap(),
    ]
}

#[cfg(feature = "io-avro")]
#[test]
fn test_avro_roundtrip_all_primitive_types() -> anyhow::Result<()> {
    roundtrip("avro", "p.avro", &all_primitive_data_types_schema(), &all_primitive_data_types_rows())
}

#[cfg(feature = "io-avro")]
#[test]
fn test_avro_roundtrip_nested() -> anyhow::Result<()> {
    roundtrip("avro", "n.avro", &nested_schema(), &nested_rows())
}

#[cfg(feature = "io-parquet")]
#[test]
fn test_parquet_roundtrip_all_primitive_types() -> anyhow::Result<()> {
    roundtrip("parquet", "p.parquet", &all_primitive_data_types_schema(), &all_primitive_data_types_rows())
}

#[cfg(feature = "io-parquet")]
#[test]
fn test_parquet_roundtrip_nested() -> anyhow::Result<()> {
    roundtrip("parquet", "n.parquet", &nested_schema(), &nested_rows())
}

#[cfg(feature = "io-parquet")]
#[test]
fn test_parquet_spans_multiple_batches() -> anyhow::Result<()> {
    let rows = string_rows("s", 20_000);
    roundtrip("parquet", "big.parquet", &string_schema(), &rows)
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_json_roundtrip_all_primitive_types() -> anyhow::Result<()> {
    roundtrip("json", "p.json", &all_primitive_data_types_schema(), &all_primitive_data_types_rows())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_json_roundtrip_nested() -> anyhow::Result<()> {
    roundtrip("json", "n.json", &nested_schema(), &nested_rows())
}

#[cfg(feature = "io-csv")]
#[test]
fn test_csv_roundtrip_flat() -> anyhow::Result<()> {
    roundtrip("csv", "f.csv", &flat_schema(), &flat_rows())
}

#[cfg(all(feature = "io-jsonl", feature = "compression-gzip"))]
#[test]
fn test_json_gzip_roundtrip() -> anyhow::Result<()> {
    roundtrip("json", "p.json.gz", &all_primitive_data_types_schema(), &all_primitive_data_types_rows())
}

#[cfg(all(feature = "io-csv", feature = "compression-zstd"))]
#[test]
fn test_csv_zstd_roundtrip() -> anyhow::Result<()> {
    roundtrip("csv", "f.csv.zst", &flat_schema(), &flat_rows())
}

#[cfg(all(feature = "io-jsonl", feature = "compression-bzip2"))]
#[test]
fn test_json_bzip2_roundtrip() -> anyhow::Result<()> {
    roundtrip("json", "n.json.bz2", &nested_schema(), &nested_rows())
}

#[cfg(all(feature = "io-jsonl", feature = "compression-xz"))]
#[test]
fn test_json_xz_roundtrip() -> anyhow::Result<()> {
    roundtrip("json", "s.json.xz", &string_schema(), &string_rows("x", 100))
}

#[cfg(feature = "io-csv")]
#[test]
fn test_csv_columns_matched_by_header_name() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("reordered.csv");
    std::fs::write(&path, "label,id,flag,at,ratio\nhello,7,true,5,0.5\n\\N,8,false,6,1\n,9,true,7,2\n")?;

    let registry = FormatRegistry::with_builtin_formats();
    let rows = read_fixture_file(&registry, "csv", &path, &flat_schema())?;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].get("id"), Some(&Value::Int64(7)));
    assert_eq!(rows[0].get("label"), Some(&Value::from("hello")));
    assert_eq!(rows[1].get("label"), Some(&Value::Null));
    assert_eq!(rows[2].get("label"), Some(&Value::from("")));
    Ok(())
}

#[cfg(feature = "io-csv")]
#[test]
fn test_csv_keeps_empty_strings_apart_from_nulls() -> anyhow::Result<()> {
    let schema = flat_schema();
    let rows: Vec<Row> = [Value::from(""), Value::Null, Value::from("\\N"), Value::from("\\")]
        .into_iter()
        .enumerate()
        .map(|(i, label)| {
            Row::builder(Arc::clone(&schema))
                .with_value("id", i as i64)
                .with_value("flag", false)
                .with_value("ratio", 1.5f64)
                .with_value("at", Value::DateTime(i as i64))
                .with_value("label", label)
                .build()
        })
        .collect::<Result<_>>()?;
    roundtrip("csv", "labels.csv", &schema, &rows)
}

#[cfg(feature = "io-csv")]
#[test]
fn test_csv_rejects_nested_schema() {
    let registry = FormatRegistry::with_builtin_formats();
    let csv = registry.lookup("csv").unwrap();
    let err = csv.parse_schema(&render_schema_text(&nested_schema())).unwrap_err();
    assert!(matches!(err, Error::SchemaResolution(_)));
}

#[cfg(feature = "io-parquet")]
#[test]
fn test_parquet_rejects_map_fields() {
    let schema = Schema::builder()
        .add_field("m", FieldType::map_of(FieldType::String))
        .build()
        .unwrap();
    let registry = FormatRegistry::with_builtin_formats();
    let parquet = registry.lookup("parquet").unwrap();
    assert!(matches!(
        parquet.parse_schema(&render_schema_text(&schema)),
        Err(Error::SchemaResolution(_))
    ));
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_json_skips_blank_lines() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("blank.json");
    std::fs::write(&path, "{\"string\":\"a\"}\n\n   \n{\"string\":\"b\"}\n")?;
    let registry = FormatRegistry::with_builtin_formats();
    let rows = read_fixture_file(&registry, "json", &path, &string_schema())?;
    let expected = vec![
        Row::new(string_schema(), vec!["a".into()])?,
        Row::new(string_schema(), vec!["b".into()])?,
    ];
    assert_rows_equal(&rows, &expected);
    Ok(())
}

#[cfg(feature = "io-avro")]
#[test]
fn test_schema_text_roundtrips_through_every_format() -> anyhow::Result<()> {
    let registry = FormatRegistry::with_builtin_formats();
    let text = render_schema_text(&all_primitive_data_types_schema());
    for id in ["avro", "parquet", "json"] {
        if let Ok(format) = registry.lookup(id) {
            let parsed = format.parse_schema(&text)?;
            assert_eq!(&parsed, all_primitive_data_types_schema().as_ref());
            assert_eq!(parse_schema_text(&format.render_schema(&parsed)?)?, parsed);
        }
    }
    Ok(())
}
