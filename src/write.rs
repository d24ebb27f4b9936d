//! Writing rows to dynamically chosen destinations.
//!
//! [`FileWriteTransform::write`] groups rows by destination, spreads each destination's rows
//! round-robin over `numShards` shards, and encodes every shard (empty ones included) into a
//! hidden temporary directory next to its final location. Only after every shard of every
//! destination has been encoded are the files renamed into place, so a failed write leaves no
//! file under a final name. Temporary directories are removed whether the write succeeds or
//! not.

use crate::config::{WriteConfiguration, resolve_schema_text};
use crate::destinations::{
    DestinationKey, DestinationStrategy, FilenamePolicy, SingleDestination, resolve_key,
};
use crate::error::{Error, Result};
use crate::format::{FormatRegistry, RecordFormat};
use crate::row::Row;
use crate::schema::Schema;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Prefix of the per-write temporary directories.
pub const TEMP_DIR_PREFIX: &str = ".temp-filebeam-";

/// One committed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenFile {
    pub destination: DestinationKey,
    pub path: PathBuf,
    pub records: u64,
}

/// Files committed by one write, ordered by destination then shard.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    pub files: Vec<WrittenFile>,
}

impl WriteResult {
    pub fn total_records(&self) -> u64 {
        self.files.iter().map(|f| f.records).sum()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|f| f.path.as_path())
    }

    /// Paths written for one destination, in shard order.
    pub fn paths_for<'a>(&'a self, key: &'a DestinationKey) -> impl Iterator<Item = &'a Path> {
        self.files
            .iter()
            .filter(move |f| &f.destination == key)
            .map(|f| f.path.as_path())
    }

    pub fn destinations(&self) -> Vec<&DestinationKey> {
        let mut keys: Vec<&DestinationKey> = self.files.iter().map(|f| &f.destination).collect();
        keys.dedup();
        keys
    }
}

/// One shard scheduled for encoding.
struct ShardPlan {
    destination: DestinationKey,
    schema: Arc<Schema>,
    rows: Vec<Row>,
    final_path: PathBuf,
    temp_path: PathBuf,
}

/// Encodes rows with one format and commits them under filename policies.
#[derive(Clone)]
pub struct FileWriteTransform {
    config: WriteConfiguration,
    format: Arc<dyn RecordFormat>,
    schema: Option<Arc<Schema>>,
}

impl FileWriteTransform {
    /// Validate `config` and resolve its format and, when present, its schema.
    ///
    /// # Errors
    /// - [`Error::InvalidConfiguration`] if validation fails or the format cannot compress.
    /// - [`Error::UnknownFormat`] if `format` is not registered.
    /// - [`Error::SchemaResolution`] if the configured schema is unusable.
    pub fn from_config(config: WriteConfiguration, registry: &FormatRegistry) -> Result<Self> {
        config.validate()?;
        let format = registry.lookup(&config.format)?;
        if !config.compression.is_passthrough() && !format.supports_compression() {
            return Err(Error::InvalidConfiguration(format!(
                "format '{}' does not support {:?} compression",
                format.identifier(),
                config.compression
            )));
        }
        let schema = config
            .schema
            .as_deref()
            .map(|s| format.parse_schema(&resolve_schema_text(s)?).map(Arc::new))
            .transpose()?;
        Ok(Self {
            config,
            format,
            schema,
        })
    }

    pub fn config(&self) -> &WriteConfiguration {
        &self.config
    }

    pub fn format(&self) -> &Arc<dyn RecordFormat> {
        &self.format
    }

    /// The configured schema, if any.
    pub fn schema(&self) -> Option<&Arc<Schema>> {
        self.schema.as_ref()
    }

    /// Configured suffix, else the format's suffix plus the compression extension.
    pub fn suffix(&self) -> String {
        match &self.config.filename_suffix {
            Some(s) => s.clone(),
            None => format!(
                "{}{}",
                self.format.file_suffix(),
                self.config.compression.suffix()
            ),
        }
    }

    /// Policy derived from `filenamePrefix`, `shardNameTemplate` and the suffix.
    pub fn filename_policy(&self) -> FilenamePolicy {
        FilenamePolicy::from_prefix(&self.config.filename_prefix)
            .with_shard_template(&self.config.shard_name_template)
            .with_suffix(self.suffix())
    }

    /// Destination writing every row under [`Self::filename_policy`].
    ///
    /// # Errors
    /// [`Error::InvalidConfiguration`] if no schema was configured.
    pub fn single_destination(&self) -> Result<SingleDestination> {
        let schema = self.schema.clone().ok_or_else(|| {
            Error::InvalidConfiguration("single-destination writes need a schema".into())
        })?;
        Ok(SingleDestination::new(self.filename_policy(), schema))
    }

    /// Write every row to the configured single destination.
    ///
    /// # Errors
    /// As [`Self::write`], plus [`Error::InvalidConfiguration`] without a configured schema.
    pub fn write_rows<I>(&self, rows: I) -> Result<WriteResult>
    where
        I: IntoIterator<Item = Row>,
    {
        self.write(rows, &self.single_destination()?)
    }

    /// Route, encode and commit `rows`.
    ///
    /// # Errors
    /// - [`Error::DestinationResolution`] if a row's key cannot be computed.
    /// - [`Error::SchemaResolution`] if a destination schema does not fit the format.
    /// - [`Error::FilenameCollision`] if two shards would share a final path.
    /// - [`Error::RecordEncode`] if a row does not match its destination's schema.
    /// - [`Error::Io`] on filesystem failures.
    ///
    /// In every error case except a failing final rename, no file appears under a final name.
    pub fn write<I>(&self, rows: I, strategy: &dyn DestinationStrategy) -> Result<WriteResult>
    where
        I: IntoIterator<Item = Row>,
    {
        let num_shards = self.config.shards();
        let mut grouped: BTreeMap<DestinationKey, Vec<Vec<Row>>> = BTreeMap::new();
        let mut cursors: HashMap<DestinationKey, usize> = HashMap::new();
        for row in rows {
            let key = resolve_key(strategy, &row)?;
            let cursor = cursors.entry(key.clone()).or_default();
            let shards = grouped
                .entry(key)
                .or_insert_with(|| vec![Vec::new(); num_shards as usize]);
            let n = shards.len();
            shards[*cursor % n].push(row);
            *cursor += 1;
        }
        if grouped.is_empty() {
            grouped.insert(
                strategy.default_destination(),
                vec![Vec::new(); num_shards as usize],
            );
        }

        let mut temp_dirs: BTreeMap<PathBuf, TempDir> = BTreeMap::new();
        let mut claimed: HashMap<PathBuf, DestinationKey> = HashMap::new();
        let mut plans = Vec::new();
        for (destination, shards) in grouped {
            let policy = strategy.filename_policy(&destination);
            let schema = strategy.schema(&destination);
            self.format.check_schema(&schema)?;
            for (shard, rows) in (0..num_shards).zip(shards) {
                let final_path = policy.path_for(shard, num_shards);
                if claimed
                    .insert(final_path.clone(), destination.clone())
                    .is_some()
                {
                    return Err(Error::FilenameCollision(final_path));
                }
                let temp_dir = match temp_dirs.get(policy.directory()) {
                    Some(dir) => dir.path().to_path_buf(),
                    None => {
                        let dir = create_temp_dir(policy.directory())?;
                        let path = dir.path().to_path_buf();
                        temp_dirs.insert(policy.directory().to_path_buf(), dir);
                        path
                    }
                };
                let temp_path = temp_dir.join(policy.shard_name(shard, num_shards));
                plans.push(ShardPlan {
                    destination: destination.clone(),
                    schema: Arc::clone(&schema),
                    rows,
                    final_path,
                    temp_path,
                });
            }
        }

        let counts = self.encode_all(&plans)?;

        let mut files = Vec::with_capacity(plans.len());
        for (plan, records) in plans.into_iter().zip(counts) {
            fs::rename(&plan.temp_path, &plan.final_path).map_err(|e| {
                Error::io(
                    format!(
                        "rename {} to {}",
                        plan.temp_path.display(),
                        plan.final_path.display()
                    ),
                    e,
                )
            })?;
            files.push(WrittenFile {
                destination: plan.destination,
                path: plan.final_path,
                records,
            });
        }
        for (_, dir) in temp_dirs {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(path = %path.display(), error = %e, "failed to remove temporary directory");
            }
        }

        let result = WriteResult { files };
        info!(
            format = self.format.identifier(),
            files = result.files.len(),
            records = result.total_records(),
            "write committed"
        );
        Ok(result)
    }

    fn encode_all(&self, plans: &[ShardPlan]) -> Result<Vec<u64>> {
        #[cfg(feature = "parallel-io")]
        {
            use rayon::prelude::*;
            plans.par_iter().map(|p| self.encode_shard(p)).collect()
        }
        #[cfg(not(feature = "parallel-io"))]
        {
            plans.iter().map(|p| self.encode_shard(p)).collect()
        }
    }

    fn encode_shard(&self, plan: &ShardPlan) -> Result<u64> {
        let file = File::create(&plan.temp_path)
            .map_err(|e| Error::io(format!("create {}", plan.temp_path.display()), e))?;
        let records = self
            .format
            .write_file(file, &plan.schema, &plan.rows, self.config.compression)
            .map_err(|e| match e.downcast::<Error>() {
                Ok(err) => err,
                Err(other) => Error::Other(other.context(format!(
                    "encode shard {}",
                    plan.final_path.display()
                ))),
            })?;
        debug!(
            destination = %plan.destination,
            path = %plan.final_path.display(),
            records,
            "encoded shard"
        );
        Ok(records)
    }
}

fn create_temp_dir(directory: &Path) -> Result<TempDir> {
    fs::create_dir_all(directory)
        .map_err(|e| Error::io(format!("create directory {}", directory.display()), e))?;
    tempfile::Builder::new()
        .prefix(TEMP_DIR_PREFIX)
        .tempdir_in(directory)
        .map_err(|e| Error::io(format!("create temporary directory in {}", directory.display()), e))
}

impl fmt::Debug for FileWriteTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWriteTransform")
            .field("config", &self.config)
            .field("format", &self.format.identifier())
            .field("schema", &self.schema)
            .finish()
    }
}
