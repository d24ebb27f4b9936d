//! Read and write configuration.
//!
//! Both structs deserialize from camelCase JSON:
//!
//! ```json
//! {
//!   "format": "avro",
//!   "schema": "{\"type\":\"record\",\"name\":\"r\",\"fields\":[{\"name\":\"s\",\"type\":\"string\"}]}",
//!   "filepattern": "/data/in/part-*",
//!   "pollIntervalMillis": 100,
//!   "terminateAfterSecondsSinceNewOutput": 3
//! }
//! ```
//!
//! `schema` holds either inline schema text or the path of a file containing it; see
//! [`resolve_schema_text`].

use crate::error::{Error, Result};
use crate::io::Compression;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Shard name template used when none is configured.
pub const DEFAULT_SHARD_NAME_TEMPLATE: &str = "-SSSSS-of-NNNNN";

/// Configuration for [`crate::read::FileReadTransform`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReadConfiguration {
    /// Registry identifier of the record format.
    pub format: String,

    /// Inline schema text, or a path to a schema file.
    pub schema: String,

    /// Static file pattern. Absent when patterns arrive as input rows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filepattern: Option<String>,

    /// Enables continuous polling at this interval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_millis: Option<u64>,

    /// Stop polling after this long without a new file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminate_after_seconds_since_new_output: Option<u64>,

    #[serde(default)]
    pub compression: Compression,
}

impl ReadConfiguration {
    pub fn new(format: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            schema: schema.into(),
            ..Self::default()
        }
    }

    pub fn with_filepattern(mut self, pattern: impl Into<String>) -> Self {
        self.filepattern = Some(pattern.into());
        self
    }

    /// Turn on streaming discovery.
    pub fn with_poll_interval_millis(mut self, millis: u64) -> Self {
        self.poll_interval_millis = Some(millis);
        self
    }

    pub fn with_terminate_after_seconds_since_new_output(mut self, secs: u64) -> Self {
        self.terminate_after_seconds_since_new_output = Some(secs);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.poll_interval_millis.is_some()
    }

    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval_millis.map(Duration::from_millis)
    }

    pub fn terminate_after(&self) -> Option<Duration> {
        self.terminate_after_seconds_since_new_output
            .map(Duration::from_secs)
    }

    /// Check the settings that do not depend on the registry or the filesystem.
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.format.trim().is_empty() {
            return Err(invalid("format must not be empty"));
        }
        if self.schema.trim().is_empty() {
            return Err(invalid("schema must not be empty"));
        }
        if self.filepattern.as_deref().is_some_and(|p| p.trim().is_empty()) {
            return Err(invalid("filepattern must not be blank"));
        }
        if self.poll_interval_millis == Some(0) {
            return Err(invalid("pollIntervalMillis must be at least 1"));
        }
        if self.terminate_after_seconds_since_new_output.is_some()
            && self.poll_interval_millis.is_none()
        {
            return Err(invalid(
                "terminateAfterSecondsSinceNewOutput requires pollIntervalMillis",
            ));
        }
        Ok(())
    }

    /// # Errors
    /// [`Error::InvalidConfiguration`] on malformed JSON or failed validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| invalid(format!("malformed read configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// [`Error::Io`] if the file cannot be read, otherwise as [`Self::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("read {}", path.display()), e))?;
        Self::from_json_str(&text)
    }
}

/// Configuration for [`crate::write::FileWriteTransform`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct WriteConfiguration {
    pub format: String,

    /// Schema for single-destination writes. Dynamic destinations supply their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Output path prefix, e.g. `/data/out/test_1`.
    pub filename_prefix: String,

    /// Defaults to the format's own suffix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename_suffix: Option<String>,

    #[serde(default = "default_shard_name_template")]
    pub shard_name_template: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_shards: Option<u32>,

    #[serde(default = "default_write_compression")]
    pub compression: Compression,
}

fn default_shard_name_template() -> String {
    DEFAULT_SHARD_NAME_TEMPLATE.to_string()
}

fn default_write_compression() -> Compression {
    Compression::Uncompressed
}

impl WriteConfiguration {
    pub fn new(format: impl Into<String>, filename_prefix: impl Into<String>) -> Self {
        Self {
            format: format.into(),
            schema: None,
            filename_prefix: filename_prefix.into(),
            filename_suffix: None,
            shard_name_template: default_shard_name_template(),
            num_shards: None,
            compression: default_write_compression(),
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_filename_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.filename_suffix = Some(suffix.into());
        self
    }

    pub fn with_shard_name_template(mut self, template: impl Into<String>) -> Self {
        self.shard_name_template = template.into();
        self
    }

    pub fn with_num_shards(mut self, shards: u32) -> Self {
        self.num_shards = Some(shards);
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Shard count, defaulting to one.
    pub fn shards(&self) -> u32 {
        self.num_shards.unwrap_or(1)
    }

    /// # Errors
    /// [`Error::InvalidConfiguration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.format.trim().is_empty() {
            return Err(invalid("format must not be empty"));
        }
        if self.filename_prefix.is_empty() {
            return Err(invalid("filenamePrefix must not be empty"));
        }
        if self.num_shards == Some(0) {
            return Err(invalid("numShards must be at least 1"));
        }
        if self.compression == Compression::Auto {
            return Err(invalid("AUTO compression only applies to reads"));
        }
        Ok(())
    }

    /// # Errors
    /// [`Error::InvalidConfiguration`] on malformed JSON or failed validation.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| invalid(format!("malformed write configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// [`Error::Io`] if the file cannot be read, otherwise as [`Self::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| Error::io(format!("read {}", path.display()), e))?;
        Self::from_json_str(&text)
    }
}

fn invalid(msg: impl Into<String>) -> Error {
    Error::InvalidConfiguration(msg.into())
}

/// Return the schema text a configured `schema` value stands for.
///
/// Text whose first non-blank character is `{`, `[` or `"` is inline schema text and is
/// returned as is. Anything else names a file whose contents are the schema text.
///
/// # Errors
/// [`Error::SchemaResolution`] if the schema file is missing, unreadable or empty.
pub fn resolve_schema_text(schema: &str) -> Result<String> {
    let trimmed = schema.trim_start();
    if trimmed.starts_with(['{', '[', '"']) {
        return Ok(schema.to_string());
    }
    let path = Path::new(schema.trim());
    let text = fs::read_to_string(path).map_err(|e| {
        Error::SchemaResolution(format!("cannot read schema file {}: {e}", path.display()))
    })?;
    if text.trim().is_empty() {
        return Err(Error::SchemaResolution(format!(
            "schema file {} is empty",
            path.display()
        )));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_config_from_camel_case_json() {
        let config = ReadConfiguration::from_json_str(
            r#"{"format":"avro","schema":"{}","filepattern":"/tmp/x*",
                "pollIntervalMillis":100,"terminateAfterSecondsSinceNewOutput":3}"#,
        )
        .unwrap();
        assert_eq!(config.format, "avro");
        assert_eq!(config.poll_interval(), Some(Duration::from_millis(100)));
        assert_eq!(config.terminate_after(), Some(Duration::from_secs(3)));
        assert_eq!(config.compression, Compression::Auto);
        assert!(config.is_streaming());
    }

    #[test]
    fn test_termination_without_polling_is_rejected() {
        let config = ReadConfiguration::new("avro", "{}")
            .with_filepattern("*.avro")
            .with_terminate_after_seconds_since_new_output(3);
        let err = config.validate().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_write_config_defaults() {
        let config =
            WriteConfiguration::from_json_str(r#"{"format":"json","filenamePrefix":"/tmp/out"}"#)
                .unwrap();
        assert_eq!(config.shard_name_template, DEFAULT_SHARD_NAME_TEMPLATE);
        assert_eq!(config.shards(), 1);
        assert_eq!(config.compression, Compression::Uncompressed);
    }

    #[test]
    fn test_zero_shards_is_rejected() {
        let config = WriteConfiguration::new("json", "/tmp/out").with_num_shards(0);
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_inline_schema_text_is_returned_unchanged() {
        let text = r#"  {"type":"record","name":"r","fields":[]}"#;
        assert_eq!(resolve_schema_text(text).unwrap(), text);
    }

    #[test]
    fn test_schema_path_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema.avsc");
        fs::write(&path, r#"{"type":"record","name":"r","fields":[]}"#).unwrap();
        let text = resolve_schema_text(path.to_str().unwrap()).unwrap();
        assert!(text.contains("\"record\""));
    }

    #[test]
    fn test_missing_schema_file_is_a_resolution_error() {
        assert!(matches!(
            resolve_schema_text("/definitely/not/here.avsc"),
            Err(Error::SchemaResolution(_))
        ));
    }
}
