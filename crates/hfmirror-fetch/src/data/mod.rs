//! Data layer: immutable types for targets, file descriptors, configuration
//! and progress tracking.

mod descriptor;
mod options;
mod progress;
mod target;

pub use descriptor::{
    EntryKind, FileDescriptor, STAGING_SUFFIX, TreeEntry, staging_path_for, total_size,
};
pub use options::{DEFAULT_API_RATE, DEFAULT_CONCURRENCY, DEFAULT_MAX_TREE_DEPTH, FetchOptions};
pub use progress::{FileOutcome, FileProgress, NoopSink, ProgressSink, RunProgress, RunSummary};
pub use target::{DEFAULT_BRANCH, DEFAULT_MIRROR, RepositoryKind, RepositoryTarget, TargetOptions};
