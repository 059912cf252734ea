//! Pure transformations: backoff schedule, subfolder filtering, path safety
//! and HTTP range helpers. Nothing in here performs I/O.

mod filter;
mod range;
mod retry;

pub use filter::{is_safe_relative, matches_subfolder};
pub use range::{
    STATUS_OK, STATUS_PARTIAL_CONTENT, content_range_start, is_content_status, range_header,
};
pub use retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_STEP, RetryPolicy};
