//! Bounded worker pool over a list of file descriptors.
//!
//! All workers are futures polled by the calling task through a
//! [`FuturesUnordered`]; they pull descriptors from a shared queue until it
//! drains or the run is cancelled. The first worker error is kept, every later
//! one is dropped.

use std::path::Path;
use std::slice;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::core::RetryPolicy;
use crate::data::{
    FileDescriptor, FileOutcome, FileProgress, ProgressSink, RunProgress, RunSummary, total_size,
};
use crate::effects::http::HttpClient;
use crate::effects::retry::{RetryError, with_retry};
use crate::effects::transfer::{Fetched, Reporter, Transfer};
use crate::error::{Error, Result};

/// Runs transfers for many files with at most `concurrency` in flight.
pub struct Scheduler<'a, C: HttpClient> {
    transfer: Transfer<'a, C>,
    retry: RetryPolicy,
    concurrency: usize,
}

/// State shared by the workers of one run.
struct RunState<'r> {
    queue: Mutex<slice::Iter<'r, FileDescriptor>>,
    root: &'r Path,
    sink: &'r dyn ProgressSink,
    progress: RunProgress,
    cancel: CancellationToken,
    first_error: Mutex<Option<Error>>,
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    bytes_transferred: AtomicU64,
}

impl<'r> RunState<'r> {
    fn next(&self) -> Option<&'r FileDescriptor> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).next()
    }

    /// Record `error` if it is the first one and stop the run.
    fn fail(&self, error: Error) {
        let mut slot = self.first_error.lock().unwrap_or_else(|e| e.into_inner());
        match *slot {
            None => *slot = Some(error),
            Some(_) => debug!(%error, "discarding error after first failure"),
        }
        drop(slot);
        self.cancel.cancel();
    }

    fn record(&self, fetched: Fetched) {
        match fetched.outcome {
            FileOutcome::Skipped => self.skipped.fetch_add(1, Ordering::Relaxed),
            _ => self.downloaded.fetch_add(1, Ordering::Relaxed),
        };
        self.bytes_transferred
            .fetch_add(fetched.bytes_written, Ordering::Relaxed);
    }
}

impl<'a, C: HttpClient> Scheduler<'a, C> {
    pub fn new(client: &'a C, proxy_prefix: &'a str, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            transfer: Transfer::new(client, proxy_prefix),
            retry,
            concurrency: concurrency.max(1),
        }
    }

    /// Download every descriptor into `root`.
    ///
    /// # Errors
    ///
    /// Returns the first error any worker hit, [`Error::EmptyTree`] for an
    /// empty list, or [`Error::Cancelled`] when `cancel` fired without a
    /// worker failing.
    pub async fn run(
        &self,
        descriptors: &[FileDescriptor],
        root: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        if descriptors.is_empty() {
            return Err(Error::EmptyTree);
        }
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|source| Error::Setup {
                path: root.to_path_buf(),
                source,
            })?;

        let total_bytes = total_size(descriptors);
        sink.run_started(total_bytes, descriptors.len());
        info!(
            files = descriptors.len(),
            total_bytes,
            root = %root.display(),
            concurrency = self.concurrency,
            "starting transfers"
        );

        let state = RunState {
            queue: Mutex::new(descriptors.iter()),
            root,
            sink,
            progress: RunProgress::new(total_bytes),
            cancel: cancel.child_token(),
            first_error: Mutex::new(None),
            downloaded: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
            bytes_transferred: AtomicU64::new(0),
        };

        let workers = self.concurrency.min(descriptors.len());
        let mut pool: FuturesUnordered<_> = (0..workers).map(|_| self.worker(&state)).collect();
        while pool.next().await.is_some() {}

        let first_error = state
            .first_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(error) = first_error {
            return Err(error);
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let summary = RunSummary {
            files: descriptors.len(),
            downloaded: state.downloaded.load(Ordering::Relaxed),
            skipped: state.skipped.load(Ordering::Relaxed),
            bytes_transferred: state.bytes_transferred.load(Ordering::Relaxed),
            total_bytes,
        };
        info!(
            downloaded = summary.downloaded,
            skipped = summary.skipped,
            bytes = summary.bytes_transferred,
            "run complete"
        );
        Ok(summary)
    }

    async fn worker(&self, state: &RunState<'_>) {
        while !state.cancel.is_cancelled() {
            let Some(descriptor) = state.next() else {
                break;
            };
            match self.process(descriptor, state).await {
                Ok(fetched) => state.record(fetched),
                Err(Error::Cancelled) => break,
                Err(error) => {
                    state.fail(error);
                    break;
                }
            }
        }
    }

    #[instrument(skip_all, fields(path = %descriptor.path))]
    async fn process(&self, descriptor: &FileDescriptor, state: &RunState<'_>) -> Result<Fetched> {
        let final_path = descriptor.final_path(state.root);
        if let Some(parent) = final_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| Error::Setup {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let path = descriptor.path.as_str();
        let sink = state.sink;
        sink.file_started(path, descriptor.size);

        let file = FileProgress::default();
        let reporter = Reporter {
            sink,
            run: &state.progress,
            file: &file,
        };
        let cancel = &state.cancel;

        let result = with_retry(
            &self.retry,
            cancel,
            |_| self.transfer.fetch(descriptor, state.root, reporter, cancel),
            // Staging bytes stay on disk; the next attempt moves the bar to
            // the real resume offset.
            |_, _| sink.file_reset(path, 0),
        )
        .await;

        match result {
            Ok(fetched) => {
                sink.file_finished(path, fetched.outcome);
                Ok(fetched)
            }
            Err(RetryError::Cancelled) => Err(Error::Cancelled),
            Err(RetryError::Exhausted { attempts, last: source })
            | Err(RetryError::Fatal {
                attempts,
                error: source,
            }) => {
                sink.file_finished(path, FileOutcome::Failed);
                Err(Error::Transfer {
                    path: descriptor.path.clone(),
                    attempts,
                    source,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::data::NoopSink;
    use crate::effects::mock::MockHttpClient;

    fn url(name: &str) -> String { format!("https://hf-mirror.com/org/repo/resolve/main/{name}") }

    fn descriptor(name: &str, size: u64) -> FileDescriptor {
        FileDescriptor::new(name, name, size, url(name))
    }

    #[derive(Default)]
    struct Totals {
        total: AtomicU64,
        advanced: AtomicU64,
        finished: Mutex<Vec<(String, FileOutcome)>>,
    }

    impl ProgressSink for Totals {
        fn run_started(&self, total_bytes: u64, _files: usize) {
            self.total.store(total_bytes, Ordering::SeqCst);
        }

        fn file_advanced(&self, _path: &str, _bytes: u64) {}

        fn total_advanced(&self, bytes: u64) { self.advanced.fetch_add(bytes, Ordering::SeqCst); }

        fn file_finished(&self, path: &str, outcome: FileOutcome) {
            self.finished.lock().unwrap().push((path.to_string(), outcome));
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_capped() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockHttpClient::new()
            .with_chunk_size(8)
            .with_chunk_delay(Duration::from_millis(2));
        let descriptors: Vec<_> = (0..6)
            .map(|i| {
                let name = format!("shard-{i}.bin");
                client.file(&url(&name), vec![1u8; 64]);
                descriptor(&name, 64)
            })
            .collect();
        let sink = Totals::default();

        let summary = Scheduler::new(&client, "", RetryPolicy::immediate(1), 2)
            .run(&descriptors, dir.path(), &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert!(client.peak_active() <= 2);
        assert_eq!(summary.files, 6);
        assert_eq!(summary.downloaded, 6);
        assert_eq!(summary.bytes_transferred, 6 * 64);
        assert_eq!(sink.total.load(Ordering::SeqCst), 6 * 64);
        assert_eq!(sink.advanced.load(Ordering::SeqCst), 6 * 64);
    }

    #[tokio::test]
    async fn test_exhausted_file_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockHttpClient::new()
            .with_chunk_size(4)
            .with_chunk_delay(Duration::from_millis(10));
        client.route(&url("bad.bin"), 500, "");
        client.file(&url("slow.bin"), vec![0u8; 400]);
        client.file(&url("c.bin"), vec![0u8; 4]);
        client.file(&url("d.bin"), vec![0u8; 4]);
        let descriptors = vec![
            descriptor("bad.bin", 10),
            descriptor("slow.bin", 400),
            descriptor("c.bin", 4),
            descriptor("d.bin", 4),
        ];
        let sink = Totals::default();

        let err = Scheduler::new(&client, "", RetryPolicy::immediate(2), 2)
            .run(&descriptors, dir.path(), &sink, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Transfer { path, attempts, .. } => {
                assert_eq!(path, "bad.bin");
                assert_eq!(attempts, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(client.requests_for(&url("bad.bin")).len(), 2);
        assert!(client.requests_for(&url("c.bin")).is_empty());
        assert!(client.requests_for(&url("d.bin")).is_empty());
        assert!(!dir.path().join("slow.bin").exists());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockHttpClient::new();
        client.file(&url("a.bin"), vec![3u8; 32]);
        client.fail_times(&url("a.bin"), 2);
        let sink = Totals::default();

        let summary = Scheduler::new(&client, "", RetryPolicy::immediate(3), 1)
            .run(&[descriptor("a.bin", 32)], dir.path(), &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.downloaded, 1);
        assert_eq!(client.requests_for(&url("a.bin")).len(), 3);
        assert_eq!(
            *sink.finished.lock().unwrap(),
            vec![("a.bin".to_string(), FileOutcome::Downloaded)]
        );
    }

    #[tokio::test]
    async fn test_empty_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockHttpClient::new();

        let err = Scheduler::new(&client, "", RetryPolicy::immediate(1), 4)
            .run(&[], dir.path(), &NoopSink, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyTree));
    }

    #[tokio::test]
    async fn test_nested_paths_get_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockHttpClient::new();
        client.file(&url("unet/diffusion.bin"), vec![1u8; 20]);
        let root = dir.path().join("repo");

        Scheduler::new(&client, "", RetryPolicy::immediate(1), 1)
            .run(&[descriptor("unet/diffusion.bin", 20)], &root, &NoopSink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(std::fs::metadata(root.join("unet/diffusion.bin")).unwrap().len(), 20);
    }

    #[tokio::test]
    async fn test_present_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.bin"), [0u8; 10]).unwrap();
        let client = MockHttpClient::new();
        let sink = Totals::default();

        let summary = Scheduler::new(&client, "", RetryPolicy::immediate(1), 2)
            .run(&[descriptor("a.bin", 10)], dir.path(), &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.bytes_transferred, 0);
        assert_eq!(sink.advanced.load(Ordering::SeqCst), 10);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_external_cancel_reports_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let client = MockHttpClient::new()
            .with_chunk_size(4)
            .with_chunk_delay(Duration::from_millis(10));
        client.file(&url("big.bin"), vec![0u8; 800]);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let err = Scheduler::new(&client, "", RetryPolicy::immediate(3), 1)
            .run(&[descriptor("big.bin", 800)], dir.path(), &NoopSink, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert!(dir.path().join("big.bin.incomplete").exists());
    }
}
