//! Mirror hub repositories to local disk.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Targets, descriptors, options and progress types
//! - [`core`] - Pure transformations (backoff schedule, filtering, range parsing)
//! - [`effects`] - I/O operations behind the [`HttpClient`] trait
//!
//! [`rate`] holds the token bucket that gates listing requests, and
//! [`Mirror`] ties everything together for one target.
//!
//! # Key Features
//!
//! - **Resumable**: bytes land in `<file>.incomplete`; its size is the resume offset
//! - **Atomic Placement**: the final path only ever appears through a rename
//! - **Bounded**: fixed worker count, rate-limited listing, capped tree depth
//! - **Fail-Fast**: the first unrecoverable file error cancels the whole run

pub mod core;
pub mod data;
pub mod effects;
pub mod error;
pub mod rate;

mod mirror;

pub use data::{
    FetchOptions, FileDescriptor, FileOutcome, NoopSink, ProgressSink, RepositoryKind,
    RepositoryTarget, RunSummary, TargetOptions,
};
pub use effects::{BoxStream, HttpClient, HttpResponse, MockHttpClient};
#[cfg(feature = "reqwest")]
pub use effects::{ClientSetting, ClientSettingError, ReqwestClient};
pub use error::{Error, ListError, ParseError, Result, TransferError};
pub use mirror::Mirror;
