//! Rate control for listing requests.

mod bucket;

pub use bucket::{Cancelled, TokenBucket};
