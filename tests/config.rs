//! Configuration documents loaded from disk.

use filebeam::testing::TempDirPath;
use filebeam::*;
use std::fs;
use std::time::Duration;

#[test]
fn test_read_configuration_from_file() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("read.json");
    fs::write(
        &path,
        r#"{
            "format": "json",
            "schema": "/etc/schemas/events.avsc",
            "filepattern": "/data/in/*.json.gz",
            "pollIntervalMillis": 250,
            "compression": "GZIP"
        }"#,
    )?;

    let config = ReadConfiguration::from_json_file(&path)?;
    assert_eq!(config.filepattern.as_deref(), Some("/data/in/*.json.gz"));
    assert_eq!(config.poll_interval(), Some(Duration::from_millis(250)));
    assert_eq!(config.terminate_after(), None);
    assert_eq!(config.compression, Compression::Gzip);
    Ok(())
}

#[test]
fn test_write_configuration_from_file() -> anyhow::Result<()> {
    let dir = TempDirPath::new()?;
    let path = dir.file_path("write.json");
    fs::write(
        &path,
        r#"{
            "format": "avro",
            "schema": "{\"type\":\"record\",\"name\":\"r\",\"fields\":[]}",
            "filenamePrefix": "/data/out/events",
            "numShards": 3,
            "shardNameTemplate": "-SS"
        }"#,
    )?;

    let config = WriteConfiguration::from_json_file(&path)?;
    assert_eq!(config.shards(), 3);
    assert_eq!(config.shard_name_template, "-SS");
    assert_eq!(config.filename_suffix, None);
    assert!(config.schema.is_some());
    Ok(())
}

#[test]
fn test_unknown_fields_are_rejected() {
    let err = ReadConfiguration::from_json_str(
        r#"{"format":"avro","schema":"{}","filepattern":"*","pollInterval":5}"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));

    let err = WriteConfiguration::from_json_str(
        r#"{"format":"avro","filenamePrefix":"out","shards":2}"#,
    )
    .unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let err = ReadConfiguration::from_json_file("/definitely/not/here.json").unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
}

#[test]
fn test_configuration_roundtrips_through_json() -> anyhow::Result<()> {
    let config = ReadConfiguration::new("parquet", "/schemas/s.avsc")
        .with_filepattern("/data/*.parquet")
        .with_poll_interval_millis(100)
        .with_terminate_after_seconds_since_new_output(3);
    let json = serde_json::to_string(&config)?;
    assert!(json.contains("terminateAfterSecondsSinceNewOutput"));
    assert_eq!(ReadConfiguration::from_json_str(&json)?, config);
    Ok(())
}
