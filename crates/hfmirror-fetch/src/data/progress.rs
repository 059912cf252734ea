use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// How a single file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Bytes were transferred (or a complete staging file was committed).
    Downloaded,
    /// The final file was already present with the expected size.
    Skipped,
    /// Retries were exhausted or a fatal error occurred.
    Failed,
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Downloaded => write!(f, "Downloaded"),
            FileOutcome::Skipped => write!(f, "Skipped"),
            FileOutcome::Failed => write!(f, "Failed"),
        }
    }
}

/// Receiver of progress events.
///
/// The engine calls this on every written chunk and at file completion; how
/// the events are rendered is up to the implementation. All methods must be
/// cheap since they are invoked from the transfer hot path.
pub trait ProgressSink: Send + Sync {
    /// Total expected bytes and file count, reported once before transfers start.
    fn run_started(&self, _total_bytes: u64, _files: usize) {}

    fn file_started(&self, _path: &str, _size: u64) {}

    /// `bytes` more were written for `path`.
    fn file_advanced(&self, path: &str, bytes: u64);

    /// The displayed position of `path` moves to `position`.
    fn file_reset(&self, _path: &str, _position: u64) {}

    /// `bytes` more were credited to the run-wide counter.
    fn total_advanced(&self, bytes: u64);

    fn file_finished(&self, _path: &str, _outcome: FileOutcome) {}
}

/// Sink that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn file_advanced(&self, _path: &str, _bytes: u64) {}

    fn total_advanced(&self, _bytes: u64) {}
}

/// Run-wide byte counter shared by every worker.
#[derive(Debug, Default)]
pub struct RunProgress {
    total: u64,
    completed: AtomicU64,
}

impl RunProgress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            completed: AtomicU64::new(0),
        }
    }

    pub fn total(&self) -> u64 { self.total }

    pub fn completed(&self) -> u64 { self.completed.load(Ordering::Acquire) }

    /// Atomically add `bytes`, returning the new completed count.
    pub fn add(&self, bytes: u64) -> u64 {
        self.completed.fetch_add(bytes, Ordering::AcqRel) + bytes
    }

    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            (self.completed() as f32 / self.total as f32) * 100.0
        }
    }
}

/// Bytes of one file already credited to the [`RunProgress`].
///
/// Owned by the worker handling the file and kept across attempts so that
/// bytes re-downloaded after a restart are not counted twice.
#[derive(Debug, Default)]
pub struct FileProgress {
    credited: AtomicU64,
}

impl FileProgress {
    pub fn credited(&self) -> u64 { self.credited.load(Ordering::Acquire) }

    /// Raise the high-water mark to `position`, returning the newly credited delta.
    pub fn credit_to(&self, position: u64) -> u64 {
        let previous = self.credited.fetch_max(position, Ordering::AcqRel);
        position.saturating_sub(previous)
    }
}

/// What a successful run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    pub downloaded: usize,
    /// Files already present with the expected size.
    pub skipped: usize,
    /// Bytes received over the network by the attempts that succeeded.
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}
