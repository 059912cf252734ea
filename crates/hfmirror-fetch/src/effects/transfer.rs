//! Resumable single-file transfer.
//!
//! Bytes accumulate in a staging file next to the final path; its size is the
//! only resume checkpoint. The final path is produced by an atomic rename once
//! the staging file holds exactly the expected number of bytes.

use std::io;
use std::path::Path;

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{STATUS_PARTIAL_CONTENT, content_range_start, is_content_status, range_header};
use crate::data::{FileDescriptor, FileOutcome, FileProgress, ProgressSink, RunProgress};
use crate::effects::http::{HttpClient, HttpResponse};
use crate::error::TransferError;

/// Result of one successful [`Transfer::fetch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetched {
    pub outcome: FileOutcome,
    /// Bytes received over the network by this call.
    pub bytes_written: u64,
}

/// Progress receivers for one file.
#[derive(Clone, Copy)]
pub struct Reporter<'a> {
    pub sink: &'a dyn ProgressSink,
    pub run: &'a RunProgress,
    pub file: &'a FileProgress,
}

impl Reporter<'_> {
    /// Credit the run with any bytes up to `position` it has not seen yet.
    fn credit(&self, position: u64) {
        let delta = self.file.credit_to(position);
        if delta > 0 {
            self.run.add(delta);
            self.sink.total_advanced(delta);
        }
    }

    fn reset(&self, path: &str, position: u64) {
        self.sink.file_reset(path, position);
        self.credit(position);
    }
}

/// Executes the staging/resume/commit protocol for single files.
pub struct Transfer<'a, C: HttpClient> {
    client: &'a C,
    proxy_prefix: &'a str,
}

impl<'a, C: HttpClient> Transfer<'a, C> {
    pub fn new(client: &'a C, proxy_prefix: &'a str) -> Self {
        Self {
            client,
            proxy_prefix,
        }
    }

    /// Bring `descriptor` to its final path under `root`.
    ///
    /// The parent directory of the final path must already exist. On error
    /// the staging file is kept so the next call resumes from it, except
    /// when its contents are known to be wrong.
    pub async fn fetch(
        &self,
        descriptor: &FileDescriptor,
        root: &Path,
        reporter: Reporter<'_>,
        cancel: &CancellationToken,
    ) -> Result<Fetched, TransferError> {
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let path = descriptor.path.as_str();
        let size = descriptor.size;
        let final_path = descriptor.final_path(root);
        let staging = descriptor.staging_path(root);

        if file_len(&final_path).await? == Some(size) {
            debug!(path, "already present");
            reporter.reset(path, size);
            return Ok(Fetched {
                outcome: FileOutcome::Skipped,
                bytes_written: 0,
            });
        }

        let staged = match file_len(&staging).await? {
            Some(len) if len > size => {
                warn!(path, len, size, "staging file larger than expected, discarding");
                remove_staging(&staging).await?;
                None
            }
            staged => staged,
        };
        let mut offset = staged.unwrap_or(0);
        reporter.reset(path, offset);

        if staged == Some(size) {
            debug!(path, "staging file complete, committing");
            commit(&staging, &final_path).await?;
            return Ok(Fetched {
                outcome: FileOutcome::Downloaded,
                bytes_written: 0,
            });
        }

        let url = format!("{}{}", self.proxy_prefix, descriptor.url);
        let mut response = self.request(&url, offset, cancel).await?;

        if offset > 0 && response.status == STATUS_PARTIAL_CONTENT {
            let start = response.content_range.as_deref().and_then(content_range_start);
            if start != Some(offset) {
                warn!(
                    path,
                    requested = offset,
                    content_range = ?response.content_range,
                    "server returned a different range, restarting from zero"
                );
                drop(response);
                remove_staging(&staging).await?;
                offset = 0;
                reporter.sink.file_reset(path, 0);
                response = self.request(&url, 0, cancel).await?;
            }
        }

        let append = offset > 0 && response.status == STATUS_PARTIAL_CONTENT;
        if !append && offset > 0 {
            debug!(path, offset, "range not honored, rewriting from zero");
            offset = 0;
            reporter.sink.file_reset(path, 0);
        }

        let opened = if append {
            OpenOptions::new().create(true).append(true).open(&staging).await
        } else {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&staging)
                .await
        };
        let file = opened.map_err(|e| TransferError::io(&staging, e))?;

        let mut writer = BufWriter::new(file);
        let streamed = stream_into(
            &mut writer,
            response,
            offset,
            descriptor,
            &staging,
            reporter,
            cancel,
        )
        .await;
        let flushed = writer
            .flush()
            .await
            .map_err(|e| TransferError::io(&staging, e));

        let position = match streamed {
            Ok(position) => position,
            Err(err @ TransferError::SizeMismatch { .. }) => {
                drop(writer);
                remove_staging(&staging).await?;
                return Err(err);
            }
            Err(err) => return Err(err),
        };
        flushed?;
        drop(writer);

        if position != size {
            return Err(TransferError::SizeMismatch {
                expected: size,
                actual: position,
            });
        }

        commit(&staging, &final_path).await?;
        debug!(path, bytes = position - offset, "committed");
        Ok(Fetched {
            outcome: FileOutcome::Downloaded,
            bytes_written: position - offset,
        })
    }

    async fn request(
        &self,
        url: &str,
        offset: u64,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse<C::Error>, TransferError> {
        let headers: Vec<(String, String)> = range_header(offset)
            .map(|value| ("Range".to_string(), value))
            .into_iter()
            .collect();
        debug!(url, offset, "requesting content");

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            response = self.client.get(url, &headers) => {
                response.map_err(|e| TransferError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                })?
            }
        };

        if !is_content_status(response.status) {
            return Err(TransferError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(response)
    }
}

/// Copy the body into `writer`, returning the staging size reached.
///
/// A body that would grow the file past the expected size is cut off with
/// [`TransferError::SizeMismatch`].
async fn stream_into<E: std::error::Error>(
    writer: &mut BufWriter<fs::File>,
    response: HttpResponse<E>,
    offset: u64,
    descriptor: &FileDescriptor,
    staging: &Path,
    reporter: Reporter<'_>,
    cancel: &CancellationToken,
) -> Result<u64, TransferError> {
    let path = descriptor.path.as_str();
    let mut body = response.body;
    let mut position = offset;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            next = body.next() => next,
        };
        let Some(chunk) = next else {
            return Ok(position);
        };
        let chunk = chunk.map_err(|e| TransferError::Network {
            url: descriptor.url.clone(),
            message: e.to_string(),
        })?;

        let len = chunk.len() as u64;
        if position + len > descriptor.size {
            return Err(TransferError::SizeMismatch {
                expected: descriptor.size,
                actual: position + len,
            });
        }

        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(staging, e))?;
        position += len;
        reporter.sink.file_advanced(path, len);
        reporter.credit(position);
    }
}

async fn file_len(path: &Path) -> Result<Option<u64>, TransferError> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TransferError::io(path, e)),
    }
}

async fn remove_staging(path: &Path) -> Result<(), TransferError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TransferError::io(path, e)),
    }
}

async fn commit(staging: &Path, final_path: &Path) -> Result<(), TransferError> {
    fs::rename(staging, final_path)
        .await
        .map_err(|e| TransferError::io(final_path, e))
}
