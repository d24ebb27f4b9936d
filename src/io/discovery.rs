//! File discovery: single-shot matching and continuous polling.
//!
//! A [`FileDiscovery`] owns the set of files already returned in its session. Every pass
//! returns only files it has not returned before, and the claim happens under one lock, so
//! two passes racing on the same instance never both return a file. Separate sessions use
//! separate instances and never share that set.
//!
//! [`PollingDiscovery`] repeats passes on a fixed interval and ends once no new file has
//! appeared for the configured quiescence period, or when its [`CancelToken`] fires.

use crate::error::Result;
use crate::io::glob::{MatchedFile, expand_pattern, validate_pattern};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Poll interval used when none is configured explicitly.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// De-duplicating file matcher for one session.
#[derive(Debug, Default)]
pub struct FileDiscovery {
    seen: Mutex<HashSet<PathBuf>>,
}

impl FileDiscovery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate every pattern once and return the files not yet returned by this instance.
    ///
    /// All patterns are syntax-checked before any is expanded. Results are sorted by path.
    ///
    /// # Errors
    /// [`crate::Error::InvalidPattern`] for malformed syntax, [`crate::Error::Io`] for
    /// unreadable directories.
    pub fn discover<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<MatchedFile>> {
        for p in patterns {
            validate_pattern(p.as_ref())?;
        }
        let mut matched = Vec::new();
        for p in patterns {
            matched.extend(expand_pattern(p.as_ref())?);
        }
        matched.sort_by(|a, b| a.path.cmp(&b.path));

        let mut seen = self.lock_seen();
        let fresh: Vec<MatchedFile> = matched
            .into_iter()
            .filter(|f| seen.insert(f.identity().to_path_buf()))
            .collect();
        debug!(
            patterns = patterns.len(),
            new_files = fresh.len(),
            total_seen = seen.len(),
            "discovery pass"
        );
        Ok(fresh)
    }

    /// Number of distinct files returned so far.
    pub fn seen_count(&self) -> usize {
        self.lock_seen().len()
    }

    fn lock_seen(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cooperative cancellation shared between a session and its owner.
///
/// Cloning shares the flag. Waiting sessions are woken immediately by [`CancelToken::cancel`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep up to `timeout`; returns `true` if cancelled before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Interval and quiescence settings for continuous discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    /// End the session after this long without a new file. `None` polls until cancelled.
    pub terminate_after: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            terminate_after: None,
        }
    }
}

/// Tracks time since the last new file.
#[derive(Debug, Clone)]
struct Quiescence {
    settings: PollSettings,
    last_new: Instant,
}

impl Quiescence {
    fn new(settings: PollSettings, now: Instant) -> Self {
        Self {
            settings,
            last_new: now,
        }
    }

    fn record(&mut self, new_files: usize, now: Instant) {
        if new_files > 0 {
            self.last_new = now;
        }
    }

    fn expired(&self, now: Instant) -> bool {
        self.settings
            .terminate_after
            .is_some_and(|limit| now.duration_since(self.last_new) >= limit)
    }

    /// Sleep until the next pass, never past the termination deadline.
    fn next_wait(&self, now: Instant) -> Duration {
        match self.settings.terminate_after {
            Some(limit) => {
                let remaining = limit.saturating_sub(now.duration_since(self.last_new));
                self.settings.interval.min(remaining)
            }
            None => self.settings.interval,
        }
    }
}

/// Continuous discovery over a pattern set that may grow while polling.
///
/// Yields one `Vec<MatchedFile>` per pass that found new files; empty passes are not
/// yielded. New patterns can arrive through a channel (see [`PollingDiscovery::with_feed`]);
/// the session only ends on quiescence once that channel is closed.
pub struct PollingDiscovery {
    discovery: FileDiscovery,
    patterns: Vec<String>,
    feed: Option<Receiver<Result<String>>>,
    quiescence: Quiescence,
    cancel: CancelToken,
    polled_once: bool,
    finished: bool,
    passes: u64,
}

impl PollingDiscovery {
    /// # Errors
    /// [`crate::Error::InvalidPattern`] if any initial pattern is malformed.
    pub fn new(patterns: Vec<String>, settings: PollSettings, cancel: CancelToken) -> Result<Self> {
        for p in &patterns {
            validate_pattern(p)?;
        }
        Ok(Self {
            discovery: FileDiscovery::new(),
            patterns,
            feed: None,
            quiescence: Quiescence::new(settings, Instant::now()),
            cancel,
            polled_once: false,
            finished: false,
            passes: 0,
        })
    }

    /// Add patterns received on `feed` before each pass.
    #[must_use]
    pub fn with_feed(mut self, feed: Receiver<Result<String>>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn passes(&self) -> u64 {
        self.passes
    }

    fn drain_feed(&mut self) -> Result<()> {
        let Some(feed) = &self.feed else {
            return Ok(());
        };
        loop {
            match feed.try_recv() {
                Ok(Ok(pattern)) => {
                    validate_pattern(&pattern)?;
                    debug!(%pattern, "pattern added to polling session");
                    if !self.patterns.contains(&pattern) {
                        self.patterns.push(pattern);
                    }
                }
                Ok(Err(e)) => return Err(e),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    self.feed = None;
                    return Ok(());
                }
            }
        }
    }

    fn finish(&mut self, reason: &str) {
        self.finished = true;
        info!(
            reason,
            passes = self.passes,
            files = self.discovery.seen_count(),
            "polling discovery finished"
        );
    }
}

impl Iterator for PollingDiscovery {
    type Item = Result<Vec<MatchedFile>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            if self.polled_once {
                let now = Instant::now();
                if self.feed.is_none() && self.quiescence.expired(now) {
                    self.finish("quiescence");
                    return None;
                }
                if self.cancel.wait_timeout(self.quiescence.next_wait(now)) {
                    self.finish("cancelled");
                    return None;
                }
            } else if self.cancel.is_cancelled() {
                self.finish("cancelled");
                return None;
            }
            self.polled_once = true;
            self.passes += 1;

            let pass = self
                .drain_feed()
                .and_then(|()| self.discovery.discover(&self.patterns));
            match pass {
                Ok(files) => {
                    self.quiescence.record(files.len(), Instant::now());
                    if !files.is_empty() {
                        return Some(Ok(files));
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
