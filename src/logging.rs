//! Bounded in-memory log with optional console mirroring

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Default number of entries kept in a pool.
pub const DEFAULT_LOG_CAPACITY: usize = 200;

/// Default source tag.
pub const DEFAULT_LOG_SOURCE: &str = "default";

/// Severity of a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// Diagnostic detail
    Debug,
    /// Connection lifecycle and other normal events
    Info,
    /// Something unexpected that was recovered from
    Warning,
    /// A failure surfaced to the caller
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warning => "warning",
            Level::Error => "error",
        };
        f.write_str(name)
    }
}

/// One immutable record in a [`LogPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Message text
    pub message: String,
    /// Severity
    pub level: Level,
    /// Milliseconds since the pool was created, plus its start offset
    pub timestamp: u64,
    /// Tag identifying who produced the entry
    pub source: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}][{}.{:03}] {}",
            self.source,
            self.timestamp / 1000,
            self.timestamp % 1000,
            self.message
        )
    }
}

/// Callback invoked synchronously for every pushed entry.
pub type LogSubscriber = Arc<dyn Fn(&LogEntry) + Send + Sync>;

/// Ring of the most recent log entries.
///
/// Pushing past capacity evicts the oldest entry. When console mirroring is
/// on, every entry is also emitted through `tracing` at the matching level.
pub struct LogPool {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    source: String,
    started: Instant,
    start_offset: u64,
    mirror: bool,
    subscriber: Option<LogSubscriber>,
}

impl fmt::Debug for LogPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogPool")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("source", &self.source)
            .field("mirror", &self.mirror)
            .finish_non_exhaustive()
    }
}

impl Default for LogPool {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY, DEFAULT_LOG_SOURCE)
    }
}

impl LogPool {
    /// Create a pool holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize, source: impl Into<String>) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            source: source.into(),
            started: Instant::now(),
            start_offset: 0,
            mirror: true,
            subscriber: None,
        }
    }

    /// Add a fixed offset to every timestamp
    pub fn set_start_offset(&mut self, millis: u64) {
        self.start_offset = millis;
    }

    /// Enable or disable mirroring to `tracing`
    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    /// Install the push callback
    pub fn set_subscriber(&mut self, subscriber: Option<LogSubscriber>) {
        self.subscriber = subscriber;
    }

    /// Record a message
    pub fn log(&mut self, level: Level, message: impl Into<String>) {
        let (entry, subscriber) = self.record(level, message);
        if let Some(subscriber) = subscriber {
            subscriber(&entry);
        }
    }

    /// Store and mirror an entry without notifying the subscriber.
    ///
    /// Returns the entry with the subscriber to call once the caller no
    /// longer holds a lock around the pool.
    pub(crate) fn record(
        &mut self,
        level: Level,
        message: impl Into<String>,
    ) -> (LogEntry, Option<LogSubscriber>) {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let entry = LogEntry {
            message: message.into(),
            level,
            timestamp: self.start_offset.saturating_add(elapsed),
            source: self.source.clone(),
        };

        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry.clone());

        if self.mirror {
            match level {
                Level::Debug => tracing::debug!(source = %entry.source, "{}", entry),
                Level::Info => tracing::info!(source = %entry.source, "{}", entry),
                Level::Warning => tracing::warn!(source = %entry.source, "{}", entry),
                Level::Error => tracing::error!(source = %entry.source, "{}", entry),
            }
        }

        (entry, self.subscriber.clone())
    }

    /// Shorthand for [`Level::Debug`]
    pub fn debug(&mut self, message: impl Into<String>) {
        self.log(Level::Debug, message);
    }

    /// Shorthand for [`Level::Info`]
    pub fn info(&mut self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    /// Shorthand for [`Level::Warning`]
    pub fn warning(&mut self, message: impl Into<String>) {
        self.log(Level::Warning, message);
    }

    /// Shorthand for [`Level::Error`]
    pub fn error(&mut self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    /// Entries from oldest to newest
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
