//! I/O layer: HTTP access, tree listing, single-file transfer, retry driver
//! and the worker pool. Every network call goes through [`HttpClient`], so
//! the whole layer runs against [`MockHttpClient`] in tests.

mod http;
mod mock;
mod retry;
mod scheduler;
mod transfer;
mod tree;

pub use http::{BoxStream, HttpClient, HttpResponse};
#[cfg(feature = "reqwest")]
pub use http::{
    ClientSetting, ClientSettingError, DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST,
    DEFAULT_REQUEST_TIMEOUT, ReqwestClient,
};
pub use mock::{MockError, MockHttpClient, RangeMode, RecordedRequest};
pub use retry::{RetryError, Retryable, with_retry};
pub use scheduler::Scheduler;
pub use transfer::{Fetched, Reporter, Transfer};
pub use tree::TreeResolver;
