//! Error types for hfmirror-fetch.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure while turning user input into a [`RepositoryTarget`](crate::RepositoryTarget).
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("URL format error: missing branch name after /tree/")]
    MissingBranch,

    #[error("URL does not name a repository")]
    MissingRepository,

    #[error("host {0} cannot carry a path")]
    InvalidHost(String),
}

/// Tree discovery failure. Always fatal for the run.
#[derive(Debug, Error)]
pub enum ListError {
    #[error("API request failed for {url}: {message}")]
    Request { url: String, message: String },

    #[error("API request failed for {url} with status code: {status}")]
    Status { url: String, status: u16 },

    #[error("failed to parse JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("listing returned unsafe path {0:?}")]
    UnsafePath(String),

    #[error("directory {path:?} exceeds maximum tree depth {max_depth}")]
    TooDeep { path: String, max_depth: usize },

    #[error("failed to build URL: {0}")]
    Url(String),

    #[error("listing cancelled")]
    Cancelled,
}

/// Failure of a single transfer attempt.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("request failed for {url}: {message}")]
    Network { url: String, message: String },

    #[error("request for {url} failed with status: {status}")]
    Status { url: String, status: u16 },

    #[error("stream ended at {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("file I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("transfer cancelled")]
    Cancelled,
}

impl TransferError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Permission failures and cancellation are terminal; everything else
    /// is treated as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Io { source, .. } => source.kind() != io::ErrorKind::PermissionDenied,
            Self::Cancelled => false,
            _ => true,
        }
    }
}

/// Run-level error. Exactly one is reported per failed run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to fetch file list: {0}")]
    List(#[from] ListError),

    #[error("could not create target folder {path}: {source}")]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no files found; check the URL or the specified subfolder")]
    EmptyTree,

    #[error("failed to download {path} after {attempts} attempt(s): {source}")]
    Transfer {
        path: String,
        attempts: u32,
        #[source]
        source: TransferError,
    },

    #[error("download cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
