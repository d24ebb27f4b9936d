//! Reading rows from files matched by patterns.
//!
//! [`FileReadTransform`] is built once from a [`ReadConfiguration`] and a [`FormatRegistry`];
//! format and schema are resolved at that point, so configuration mistakes surface before any
//! file is touched. [`FileReadTransform::expand`] then produces a [`ReadStream`]:
//!
//! - **batch** (no poll interval): every pattern is evaluated once and each matched file is
//!   decoded exactly once;
//! - **streaming** (poll interval set): patterns are re-evaluated until no new file has shown
//!   up for `terminateAfterSecondsSinceNewOutput`, or until the stream is cancelled.
//!
//! Patterns come either from the configuration's `filepattern` or from a [`PatternInput`] of
//! rows carrying a string field named [`FILEPATTERN_ROW_FIELD_NAME`], never both.
//!
//! A file is decoded completely before any of its rows are emitted, and rows of one file keep
//! their order in the file. A record that cannot be decoded fails the stream with
//! [`Error::RecordDecode`]; there is no skip mode.

use crate::config::{ReadConfiguration, resolve_schema_text};
use crate::error::{Error, Result};
use crate::format::{FormatRegistry, RecordFormat};
use crate::io::{CancelToken, Compression, FileDiscovery, MatchedFile, PollSettings, PollingDiscovery};
use crate::row::{Row, Value};
use crate::schema::{Field, FieldType, Schema};
use rayon::prelude::*;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::ErrorKind;
use std::sync::mpsc;
use std::sync::{Arc, OnceLock};
use std::thread;
use tracing::{debug, info};

/// Name of the string field pattern-input rows carry.
pub const FILEPATTERN_ROW_FIELD_NAME: &str = "filepattern";

/// Tag of the pattern input.
pub const INPUT_TAG: &str = "input";

/// Tag of the row output.
pub const OUTPUT_TAG: &str = "output";

/// Schema of pattern-input rows: one non-nullable string field, `filepattern`.
pub fn filepattern_schema() -> Arc<Schema> {
    static SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();
    Arc::clone(SCHEMA.get_or_init(|| {
        Arc::new(Schema::single(Field::new(
            FILEPATTERN_ROW_FIELD_NAME,
            FieldType::String,
        )))
    }))
}

/// How decoding work is spread across threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// One file at a time on the consuming thread.
    Sequential,
    /// Files decoded concurrently with rayon. `threads: None` uses the global pool and
    /// decodes `num_cpus` files per round.
    Parallel { threads: Option<usize> },
}

impl Default for ReadMode {
    fn default() -> Self {
        if cfg!(feature = "parallel-io") {
            Self::Parallel { threads: None }
        } else {
            Self::Sequential
        }
    }
}

/// A stream of rows naming file patterns.
pub struct PatternInput {
    rows: Box<dyn Iterator<Item = Row> + Send>,
}

impl PatternInput {
    /// Wrap rows that carry a [`FILEPATTERN_ROW_FIELD_NAME`] string field.
    pub fn new<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Row>,
        I::IntoIter: Send + 'static,
    {
        Self {
            rows: Box::new(rows.into_iter()),
        }
    }

    /// Build pattern rows from plain strings.
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let schema = filepattern_schema();
        let rows: Vec<Row> = patterns
            .into_iter()
            .map(|p| Row::new_unchecked(Arc::clone(&schema), vec![Value::String(p.into())]))
            .collect();
        Self::new(rows)
    }

    pub fn tag(&self) -> &'static str {
        INPUT_TAG
    }
}

impl fmt::Debug for PatternInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternInput").finish_non_exhaustive()
    }
}

/// Extract the pattern from one input row.
///
/// # Errors
/// [`Error::InvalidConfiguration`] if the row has no string `filepattern` value.
pub fn pattern_of(row: &Row) -> Result<String> {
    match row.get(FILEPATTERN_ROW_FIELD_NAME) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(Error::InvalidConfiguration(format!(
            "'{FILEPATTERN_ROW_FIELD_NAME}' must be a string, got {other}"
        ))),
        None => Err(Error::InvalidConfiguration(format!(
            "pattern input row {row} has no '{FILEPATTERN_ROW_FIELD_NAME}' field"
        ))),
    }
}

/// Decodes single files with one format and schema.
#[derive(Clone)]
struct FileReader {
    format: Arc<dyn RecordFormat>,
    schema: Arc<Schema>,
    compression: Compression,
}

impl FileReader {
    /// `Ok(None)` when the file disappeared after it was matched.
    fn read(&self, file: &MatchedFile) -> Result<Option<Vec<Row>>> {
        let handle = match File::open(&file.path) {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %file.path.display(), "matched file vanished before read");
                return Ok(None);
            }
            Err(e) => return Err(Error::io(format!("open {}", file.path.display()), e)),
        };
        let rows = self
            .format
            .read_file(handle, &file.path, &self.schema, self.compression)
            .map_err(|source| Error::RecordDecode {
                path: file.path.clone(),
                source,
            })?;
        debug!(path = %file.path.display(), rows = rows.len(), "decoded file");
        Ok(Some(rows))
    }
}

/// Reads rows of one schema from files matched by patterns.
#[derive(Clone)]
pub struct FileReadTransform {
    config: ReadConfiguration,
    reader: FileReader,
    mode: ReadMode,
}

impl FileReadTransform {
    /// Validate `config` and resolve its format and schema.
    ///
    /// # Errors
    /// - [`Error::InvalidConfiguration`] if the configuration fails validation.
    /// - [`Error::UnknownFormat`] if `format` is not registered.
    /// - [`Error::SchemaResolution`] if the schema text or file is unusable.
    /// - [`Error::InvalidPattern`] if the static pattern is malformed.
    pub fn from_config(config: ReadConfiguration, registry: &FormatRegistry) -> Result<Self> {
        config.validate()?;
        let format = registry.lookup(&config.format)?;
        let schema = Arc::new(format.parse_schema(&resolve_schema_text(&config.schema)?)?);
        if let Some(pattern) = &config.filepattern {
            crate::io::validate_pattern(pattern)?;
        }
        if !config.compression.is_passthrough() && !format.supports_compression() {
            return Err(Error::InvalidConfiguration(format!(
                "format '{}' does not support {:?} compression",
                format.identifier(),
                config.compression
            )));
        }
        debug!(format = format.identifier(), %schema, "resolved read transform");
        Ok(Self {
            reader: FileReader {
                format,
                schema,
                compression: config.compression,
            },
            config,
            mode: ReadMode::default(),
        })
    }

    #[must_use]
    pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn config(&self) -> &ReadConfiguration {
        &self.config
    }

    /// Schema of every emitted row.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.reader.schema
    }

    pub fn format(&self) -> &Arc<dyn RecordFormat> {
        &self.reader.format
    }

    pub fn read_mode(&self) -> ReadMode {
        self.mode
    }

    /// Start reading.
    ///
    /// Exactly one pattern source must be active: the configured `filepattern` or `input`.
    ///
    /// # Errors
    /// - [`Error::InvalidConfiguration`] if both or neither pattern sources are present, or
    ///   (batch mode) an input row lacks a `filepattern` string.
    /// - [`Error::InvalidPattern`] for malformed patterns.
    pub fn expand(&self, input: Option<PatternInput>) -> Result<ReadStream> {
        let static_pattern = self.config.filepattern.clone();
        let source = match (static_pattern, input) {
            (Some(_), Some(_)) => {
                return Err(Error::InvalidConfiguration(
                    "both filepattern and a pattern input were supplied".into(),
                ));
            }
            (None, None) => {
                return Err(Error::InvalidConfiguration(
                    "either filepattern or a pattern input is required".into(),
                ));
            }
            (Some(pattern), None) => PatternSource::Static(pattern),
            (None, Some(input)) => PatternSource::Input(input),
        };

        let cancel = CancelToken::new();
        let discovery: Box<dyn Iterator<Item = Result<Vec<MatchedFile>>> + Send> =
            match self.config.poll_interval() {
                None => {
                    let patterns = match source {
                        PatternSource::Static(p) => vec![p],
                        PatternSource::Input(input) => {
                            input.rows.map(|r| pattern_of(&r)).collect::<Result<_>>()?
                        }
                    };
                    let files = FileDiscovery::new().discover(&patterns)?;
                    info!(
                        format = self.reader.format.identifier(),
                        patterns = patterns.len(),
                        files = files.len(),
                        "batch read started"
                    );
                    Box::new(std::iter::once(Ok(files)))
                }
                Some(interval) => {
                    let settings = PollSettings {
                        interval,
                        terminate_after: self.config.terminate_after(),
                    };
                    let polling = match source {
                        PatternSource::Static(p) => {
                            PollingDiscovery::new(vec![p], settings, cancel.clone())?
                        }
                        PatternSource::Input(input) => {
                            PollingDiscovery::new(Vec::new(), settings, cancel.clone())?
                                .with_feed(spawn_pattern_feed(input)?)
                        }
                    };
                    info!(
                        format = self.reader.format.identifier(),
                        interval_ms = interval.as_millis(),
                        terminate_after_s = ?settings.terminate_after.map(|d| d.as_secs()),
                        "streaming read started"
                    );
                    Box::new(polling)
                }
            };

        let pool = match self.mode {
            ReadMode::Parallel { threads: Some(t) } => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(t.max(1))
                    .thread_name(|i| format!("filebeam-read-{i}"))
                    .build()
                    .map_err(|e| Error::Other(e.into()))?,
            ),
            _ => None,
        };

        Ok(ReadStream {
            reader: self.reader.clone(),
            discovery,
            mode: self.mode,
            pool,
            cancel,
            streaming: self.config.is_streaming(),
            pending_files: VecDeque::new(),
            rows: VecDeque::new(),
            deferred: None,
            finished: false,
            files_read: 0,
            rows_emitted: 0,
        })
    }
}

impl fmt::Debug for FileReadTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileReadTransform")
            .field("config", &self.config)
            .field("schema", &self.reader.schema)
            .field("mode", &self.mode)
            .finish()
    }
}

enum PatternSource {
    Static(String),
    Input(PatternInput),
}

/// Pull pattern rows on a background thread so polling never blocks on the input.
fn spawn_pattern_feed(input: PatternInput) -> Result<mpsc::Receiver<Result<String>>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("filebeam-patterns".into())
        .spawn(move || {
            for row in input.rows {
                let pattern = pattern_of(&row);
                let failed = pattern.is_err();
                if tx.send(pattern).is_err() || failed {
                    break;
                }
            }
        })
        .map_err(|e| Error::io("spawn pattern input thread", e))?;
    Ok(rx)
}

/// Rows decoded from matched files, tagged [`OUTPUT_TAG`].
///
/// Ends after the last file (batch), when discovery goes quiet or the stream is cancelled
/// (streaming), or right after the first error.
pub struct ReadStream {
    reader: FileReader,
    discovery: Box<dyn Iterator<Item = Result<Vec<MatchedFile>>> + Send>,
    mode: ReadMode,
    pool: Option<rayon::ThreadPool>,
    cancel: CancelToken,
    streaming: bool,
    pending_files: VecDeque<MatchedFile>,
    rows: VecDeque<Row>,
    deferred: Option<Error>,
    finished: bool,
    files_read: u64,
    rows_emitted: u64,
}

impl ReadStream {
    pub fn tag(&self) -> &'static str {
        OUTPUT_TAG
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.reader.schema
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// A handle that stops this stream from any thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Files decoded so far.
    pub fn files_read(&self) -> u64 {
        self.files_read
    }

    pub fn rows_emitted(&self) -> u64 {
        self.rows_emitted
    }

    /// Drain the stream, stopping at the first error.
    ///
    /// # Errors
    /// The first error the stream produced.
    pub fn collect_rows(self) -> Result<Vec<Row>> {
        self.collect()
    }

    fn files_per_round(&self) -> usize {
        match self.mode {
            ReadMode::Sequential => 1,
            ReadMode::Parallel { threads } => threads.unwrap_or_else(|| num_cpus::get().max(2)),
        }
        .max(1)
    }

    /// Decode the next round of pending files into the row queue. Rows of files that precede
    /// a failing file are still queued; the failure is reported after them.
    fn decode_round(&mut self) {
        let take = self.files_per_round().min(self.pending_files.len());
        let round: Vec<MatchedFile> = self.pending_files.drain(..take).collect();

        let results: Vec<Result<Option<Vec<Row>>>> = match self.mode {
            ReadMode::Sequential => round.iter().map(|f| self.reader.read(f)).collect(),
            ReadMode::Parallel { .. } => {
                let reader = &self.reader;
                let run = || -> Vec<Result<Option<Vec<Row>>>> {
                    round.par_iter().map(|f| reader.read(f)).collect()
                };
                match &self.pool {
                    Some(pool) => pool.install(run),
                    None => run(),
                }
            }
        };

        for result in results {
            match result {
                Ok(Some(rows)) => {
                    self.files_read += 1;
                    self.rows.extend(rows);
                }
                Ok(None) => {}
                Err(e) => {
                    self.deferred = Some(e);
                    self.pending_files.clear();
                    return;
                }
            }
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            info!(
                files = self.files_read,
                rows = self.rows_emitted,
                streaming = self.streaming,
                "read finished"
            );
        }
    }
}

impl Iterator for ReadStream {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.rows.pop_front() {
                self.rows_emitted += 1;
                return Some(Ok(row));
            }
            if let Some(e) = self.deferred.take() {
                self.finish();
                return Some(Err(e));
            }
            if self.finished {
                return None;
            }
            if self.cancel.is_cancelled() {
                self.finish();
                return None;
            }
            if self.pending_files.is_empty() {
                match self.discovery.next() {
                    Some(Ok(files)) => self.pending_files.extend(files),
                    Some(Err(e)) => {
                        self.finish();
                        return Some(Err(e));
                    }
                    None => {
                        self.finish();
                        return None;
                    }
                }
                continue;
            }
            self.decode_round();
        }
    }
}

impl fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadStream")
            .field("schema", &self.reader.schema)
            .field("mode", &self.mode)
            .field("streaming", &self.streaming)
            .field("files_read", &self.files_read)
            .field("rows_emitted", &self.rows_emitted)
            .finish_non_exhaustive()
    }
}
