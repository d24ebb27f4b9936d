//! Per-row destination routing for writes.
//!
//! A [`DestinationStrategy`] maps every row to a [`DestinationKey`] and every key to the
//! [`FilenamePolicy`] and [`Schema`] its files are written with. Strategies are consulted
//! afresh on every write; nothing is cached between runs.

use crate::config::DEFAULT_SHARD_NAME_TEMPLATE;
use crate::error::{Error, Result};
use crate::row::Row;
use crate::schema::Schema;
use regex::{Captures, Regex};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

static SHARD_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"S+|N+").expect("valid shard template regex"));

/// Identifies one output destination. The empty key is the default destination.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DestinationKey(String);

impl DestinationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            f.write_str("<default>")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<&str> for DestinationKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DestinationKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// How shard files of one destination are named:
/// `directory/prefix + expand(shard_template, shard, num_shards) + suffix`.
///
/// In the template, a run of `S` is replaced by the zero-based shard index and a run of `N`
/// by the shard count, each zero-padded to the run's length. The default template
/// `-SSSSS-of-NNNNN` gives names like `out-00000-of-00003.avro`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilenamePolicy {
    directory: PathBuf,
    prefix: String,
    shard_template: String,
    suffix: String,
}

impl FilenamePolicy {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
            shard_template: DEFAULT_SHARD_NAME_TEMPLATE.to_string(),
            suffix: String::new(),
        }
    }

    /// Split a path prefix such as `/data/out/test_1` into directory and file prefix.
    pub fn from_prefix(prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref();
        let (directory, name) = match prefix.file_name() {
            Some(name) => (
                prefix.parent().map(Path::to_path_buf).unwrap_or_default(),
                name.to_string_lossy().into_owned(),
            ),
            None => (prefix.to_path_buf(), String::new()),
        };
        Self::new(directory, name)
    }

    #[must_use]
    pub fn with_shard_template(mut self, template: impl Into<String>) -> Self {
        self.shard_template = template.into();
        self
    }

    #[must_use]
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Directory files are written to; `.` when the prefix had none.
    pub fn directory(&self) -> &Path {
        if self.directory.as_os_str().is_empty() {
            Path::new(".")
        } else {
            &self.directory
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn shard_template(&self) -> &str {
        &self.shard_template
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// File name (no directory) of one shard.
    pub fn shard_name(&self, shard: u32, num_shards: u32) -> String {
        let expanded = SHARD_PLACEHOLDER.replace_all(&self.shard_template, |caps: &Captures| {
            let run = &caps[0];
            let n = if run.starts_with('S') { shard } else { num_shards };
            format!("{n:0width$}", width = run.len())
        });
        format!("{}{}{}", self.prefix, expanded, self.suffix)
    }

    pub fn path_for(&self, shard: u32, num_shards: u32) -> PathBuf {
        self.directory().join(self.shard_name(shard, num_shards))
    }
}

/// Routes rows to destinations.
pub trait DestinationStrategy: Send + Sync {
    /// Destination of one row.
    ///
    /// # Errors
    /// Any error; the write fails with [`Error::DestinationResolution`].
    fn key(&self, row: &Row) -> Result<DestinationKey>;

    fn filename_policy(&self, key: &DestinationKey) -> FilenamePolicy;

    /// Schema the destination's files are encoded with.
    fn schema(&self, key: &DestinationKey) -> Arc<Schema>;

    /// Destination written (with empty shards) when a write receives no rows.
    fn default_destination(&self) -> DestinationKey {
        DestinationKey::default()
    }
}

/// Resolve a row's key, normalizing every failure to [`Error::DestinationResolution`].
pub(crate) fn resolve_key(strategy: &dyn DestinationStrategy, row: &Row) -> Result<DestinationKey> {
    strategy.key(row).map_err(|e| match e {
        Error::DestinationResolution(_) => e,
        other => Error::DestinationResolution(format!("row {row}: {other}")),
    })
}

/// A strategy assembled from closures.
///
/// ```no_run
/// use filebeam::{DestinationKey, FilenamePolicy, FnDestinations};
/// # fn schema() -> std::sync::Arc<filebeam::Schema> { unimplemented!() }
/// let by_name = FnDestinations::new(
///     |row| Ok(DestinationKey::new(row.get("name").and_then(|v| v.as_str()).unwrap_or("other"))),
///     |key| FilenamePolicy::new("/data/out", key.as_str()).with_suffix(".avro"),
///     |_| schema(),
/// );
/// ```
pub struct FnDestinations<K, P, S> {
    key_fn: K,
    policy_fn: P,
    schema_fn: S,
    default: DestinationKey,
}

impl<K, P, S> FnDestinations<K, P, S>
where
    K: Fn(&Row) -> Result<DestinationKey> + Send + Sync,
    P: Fn(&DestinationKey) -> FilenamePolicy + Send + Sync,
    S: Fn(&DestinationKey) -> Arc<Schema> + Send + Sync,
{
    pub fn new(key_fn: K, policy_fn: P, schema_fn: S) -> Self {
        Self {
            key_fn,
            policy_fn,
            schema_fn,
            default: DestinationKey::default(),
        }
    }

    #[must_use]
    pub fn with_default_destination(mut self, key: impl Into<DestinationKey>) -> Self {
        self.default = key.into();
        self
    }
}

impl<K, P, S> DestinationStrategy for FnDestinations<K, P, S>
where
    K: Fn(&Row) -> Result<DestinationKey> + Send + Sync,
    P: Fn(&DestinationKey) -> FilenamePolicy + Send + Sync,
    S: Fn(&DestinationKey) -> Arc<Schema> + Send + Sync,
{
    fn key(&self, row: &Row) -> Result<DestinationKey> {
        (self.key_fn)(row)
    }

    fn filename_policy(&self, key: &DestinationKey) -> FilenamePolicy {
        (self.policy_fn)(key)
    }

    fn schema(&self, key: &DestinationKey) -> Arc<Schema> {
        (self.schema_fn)(key)
    }

    fn default_destination(&self) -> DestinationKey {
        self.default.clone()
    }
}

impl<K, P, S> fmt::Debug for FnDestinations<K, P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnDestinations")
            .field("default", &self.default)
            .finish_non_exhaustive()
    }
}

/// Everything goes to one policy and schema.
#[derive(Debug, Clone)]
pub struct SingleDestination {
    policy: FilenamePolicy,
    schema: Arc<Schema>,
}

impl SingleDestination {
    pub fn new(policy: FilenamePolicy, schema: Arc<Schema>) -> Self {
        Self { policy, schema }
    }
}

impl DestinationStrategy for SingleDestination {
    fn key(&self, _row: &Row) -> Result<DestinationKey> {
        Ok(DestinationKey::default())
    }

    fn filename_policy(&self, _key: &DestinationKey) -> FilenamePolicy {
        self.policy.clone()
    }

    fn schema(&self, _key: &DestinationKey) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }
}
