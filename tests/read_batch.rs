//! Batch reads: static patterns, pattern input rows, failure modes.

use filebeam::schema::text::render_schema_text;
use filebeam::testing::*;
use filebeam::*;
use std::fs;
use std::sync::Arc;

fn registry() -> FormatRegistry {
    FormatRegistry::with_builtin_formats()
}

fn read_all(config: ReadConfiguration, input: Option<PatternInput>) -> Result<Vec<Row>> {
    FileReadTransform::from_config(config, &registry())?
        .expand(input)?
        .collect_rows()
}

#[cfg(feature = "io-avro")]
#[test]
fn test_single_file_read() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let schema = string_schema();
    let rows = string_rows("", 10);
    write_fixture_file(&registry(), "avro", &dir.file_path("test_1.avro"), &schema, &rows)?;

    let config = ReadConfiguration::new("avro", render_schema_text(&schema))
        .with_filepattern(dir.pattern("test_1*"));
    assert_rows_unordered_equal(&read_all(config, None)?, &rows);
    Ok(())
}

#[test]
fn test_multiple_files_every_format() -> anyhow::Result<()> {
    let schema = all_primitive_data_types_schema();
    let rows = all_primitive_data_types_rows();
    let registry = registry();
    for (format, suffix) in [("avro", "avro"), ("parquet", "parquet"), ("json", "json")] {
        if !registry.contains(format) {
            continue;
        }
        let dir = TempDirPath::new()?;
        let mut expected = Vec::new();
        for i in 0..3 {
            write_fixture_file(&registry, format, &dir.file_path(&format!("part-{i}.{suffix}")), &schema, &rows)?;
            expected.extend(rows.iter().cloned());
        }
        let config = ReadConfiguration::new(format, render_schema_text(&schema))
            .with_filepattern(dir.pattern("part-*"));
        assert_rows_unordered_equal(&read_all(config, None)?, &expected);
    }
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_batch_read_is_idempotent() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let schema = string_schema();
    for i in 0..4 {
        write_fixture_file(&registry(), "json", &dir.file_path(&format!("{i}.json")), &schema, &string_rows(&format!("f{i}-"), 25))?;
    }
    let transform = FileReadTransform::from_config(
        ReadConfiguration::new("json", render_schema_text(&schema)).with_filepattern(dir.pattern("*.json")),
        &registry(),
    )?;
    let first = transform.expand(None)?.collect_rows()?;
    let second = transform.expand(None)?.collect_rows()?;
    assert_eq!(first.len(), 100);
    assert_no_duplicate_rows(&first);
    assert_rows_unordered_equal(&first, &second);
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_sequential_mode_keeps_file_and_record_order() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let schema = string_schema();
    let mut expected = Vec::new();
    for name in ["a", "b", "c"] {
        let rows = string_rows(&format!("{name}-"), 5);
        write_fixture_file(&registry(), "json", &dir.file_path(&format!("{name}.json")), &schema, &rows)?;
        expected.extend(rows);
    }
    let stream = FileReadTransform::from_config(
        ReadConfiguration::new("json", render_schema_text(&schema)).with_filepattern(dir.pattern("*.json")),
        &registry(),
    )?
    .with_read_mode(ReadMode::Sequential)
    .expand(None)?;
    assert_eq!(stream.tag(), "output");
    assert!(!stream.is_streaming());
    assert_rows_equal(&stream.collect_rows()?, &expected);
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_parallel_mode_with_dedicated_pool_keeps_file_order() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let schema = string_schema();
    let mut expected = Vec::new();
    for i in 0..10 {
        let rows = string_rows(&format!("{i:02}-"), 20);
        write_fixture_file(&registry(), "json", &dir.file_path(&format!("{i:02}.json")), &schema, &rows)?;
        expected.extend(rows);
    }
    let mut stream = FileReadTransform::from_config(
        ReadConfiguration::new("json", render_schema_text(&schema)).with_filepattern(dir.pattern("*.json")),
        &registry(),
    )?
    .with_read_mode(ReadMode::Parallel { threads: Some(3) })
    .expand(None)?;
    let rows: Vec<Row> = stream.by_ref().collect::<Result<_>>()?;
    assert_rows_equal(&rows, &expected);
    assert_eq!(stream.files_read(), 10);
    assert_eq!(stream.rows_emitted(), 200);
    Ok(())
}

#[cfg(feature = "io-avro")]
#[test]
fn test_read_with_pattern_input() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let schema = string_schema();
    let first = string_rows("first-", 5);
    let second = string_rows("second-", 7);
    write_fixture_file(&registry(), "avro", &dir.file_path("first.avro"), &schema, &first)?;
    write_fixture_file(&registry(), "avro", &dir.file_path("second.avro"), &schema, &second)?;
    write_fixture_file(&registry(), "avro", &dir.file_path("ignored.avro"), &schema, &string_rows("x", 3))?;

    let input = PatternInput::from_patterns([dir.pattern("first*"), dir.pattern("second*")]);
    assert_eq!(input.tag(), "input");
    let rows = read_all(ReadConfiguration::new("avro", render_schema_text(&schema)), Some(input))?;
    let expected: Vec<Row> = first.into_iter().chain(second).collect();
    assert_rows_unordered_equal(&rows, &expected);
    Ok(())
}

#[cfg(feature = "io-avro")]
#[test]
fn test_pattern_input_rows_need_filepattern_field() -> anyhow::Result<()> {
    let schema = string_schema();
    let input = PatternInput::new(string_rows("not-a-pattern", 1));
    let err = read_all(ReadConfiguration::new("avro", render_schema_text(&schema)), Some(input)).unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
    Ok(())
}

#[cfg(feature = "io-avro")]
#[test]
fn test_pattern_sources_are_exclusive() -> anyhow::Result<()> {
    let text = render_schema_text(&string_schema());
    let both = read_all(
        ReadConfiguration::new("avro", &text).with_filepattern("/tmp/*.avro"),
        Some(PatternInput::from_patterns(["/tmp/*.avro"])),
    );
    assert!(matches!(both, Err(Error::InvalidConfiguration(_))));

    let neither = read_all(ReadConfiguration::new("avro", &text), None);
    assert!(matches!(neither, Err(Error::InvalidConfiguration(_))));
    Ok(())
}

#[test]
fn test_nonexistent_format_fails_at_configuration() {
    let config = ReadConfiguration::new("nonexistent", render_schema_text(&string_schema()))
        .with_filepattern("/tmp/*");
    let err = FileReadTransform::from_config(config, &registry()).unwrap_err();
    assert!(matches!(&err, Error::UnknownFormat(id) if id == "nonexistent"));
}

#[cfg(feature = "io-avro")]
#[test]
fn test_malformed_schema_fails_at_configuration() {
    let config = ReadConfiguration::new("avro", "{\"type\": \"record\"").with_filepattern("/tmp/*");
    assert!(matches!(
        FileReadTransform::from_config(config, &registry()),
        Err(Error::SchemaResolution(_))
    ));
}

#[cfg(feature = "io-avro")]
#[test]
fn test_malformed_pattern_fails_at_configuration() {
    let config = ReadConfiguration::new("avro", render_schema_text(&string_schema()))
        .with_filepattern("/tmp/[oops");
    assert!(matches!(
        FileReadTransform::from_config(config, &registry()),
        Err(Error::InvalidPattern { .. })
    ));
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_schema_read_from_file() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let schema = string_schema();
    let schema_path = dir.file_path("schema.avsc");
    fs::write(&schema_path, render_schema_text(&schema))?;
    write_fixture_file(&registry(), "json", &dir.file_path("data.json"), &schema, &string_rows("", 3))?;

    let config = ReadConfiguration::new("json", schema_path.to_string_lossy())
        .with_filepattern(dir.pattern("*.json"));
    let transform = FileReadTransform::from_config(config, &registry())?;
    assert_eq!(transform.schema(), &schema);
    assert_eq!(transform.expand(None)?.collect_rows()?.len(), 3);
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_malformed_record_fails_the_read() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let bad = dir.file_path("bad.json");
    fs::write(&bad, "{\"string\":\"ok\"}\n{\"string\": 42}\n")?;

    let config = ReadConfiguration::new("json", render_schema_text(&string_schema()))
        .with_filepattern(dir.pattern("*.json"));
    let mut stream = FileReadTransform::from_config(config, &registry())?.expand(None)?;
    match stream.next() {
        Some(Err(Error::RecordDecode { path, .. })) => assert_eq!(path, bad),
        other => panic!("expected a decode failure, got {other:?}"),
    }
    assert!(stream.next().is_none());
    Ok(())
}

#[cfg(all(feature = "io-jsonl", feature = "compression-gzip"))]
#[test]
fn test_compressed_files_are_detected() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let schema = all_primitive_data_types_schema();
    let rows = all_primitive_data_types_rows();
    write_fixture_file(&registry(), "json", &dir.file_path("a.json.gz"), &schema, &rows)?;
    write_fixture_file(&registry(), "json", &dir.file_path("b.json"), &schema, &rows)?;

    let config = ReadConfiguration::new("json", render_schema_text(&schema))
        .with_filepattern(dir.pattern("*"));
    let read = read_all(config, None)?;
    let expected: Vec<Row> = rows.iter().chain(&rows).cloned().collect();
    assert_rows_unordered_equal(&read, &expected);
    Ok(())
}

#[cfg(all(feature = "io-avro", feature = "compression-gzip"))]
#[test]
fn test_compression_rejected_for_container_formats() {
    let config = ReadConfiguration::new("avro", render_schema_text(&string_schema()))
        .with_filepattern("/tmp/*")
        .with_compression(Compression::Gzip);
    assert!(matches!(
        FileReadTransform::from_config(config, &registry()),
        Err(Error::InvalidConfiguration(_))
    ));
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_no_matches_yields_empty_stream() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let config = ReadConfiguration::new("json", render_schema_text(&string_schema()))
        .with_filepattern(dir.pattern("*.json"));
    assert!(read_all(config, None)?.is_empty());
    Ok(())
}

#[cfg(feature = "io-jsonl")]
#[test]
fn test_fields_missing_from_file_read_as_null() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    fs::write(dir.file_path("x.json"), "{\"id\": 1}\n")?;
    let schema = Arc::new(
        Schema::builder()
            .add_field("id", FieldType::Int64)
            .add_nullable_field("note", FieldType::String)
            .build()?,
    );
    let config = ReadConfiguration::new("json", render_schema_text(&schema))
        .with_filepattern(dir.pattern("*.json"));
    let rows = read_all(config, None)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("note"), Some(&Value::Null));
    Ok(())
}
