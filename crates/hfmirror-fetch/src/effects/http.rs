use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Status line, the headers the engine cares about, and the body stream.
pub struct HttpResponse<E> {
    pub status: u16,
    /// Raw `Content-Range` header, if the server sent one.
    pub content_range: Option<String>,
    pub body: BoxStream<'static, Result<Bytes, E>>,
}

impl<E> HttpResponse<E> {
    pub fn new(status: u16, body: BoxStream<'static, Result<Bytes, E>>) -> Self {
        Self {
            status,
            content_range: None,
            body,
        }
    }

    pub fn with_content_range(mut self, value: impl Into<String>) -> Self {
        self.content_range = Some(value.into());
        self
    }
}

/// Asynchronous HTTP client abstraction.
///
/// This is the minimal interface the engine needs: a GET with extra headers
/// that hands back the status and a streaming body. Non-success statuses
/// are returned, not mapped to errors; the caller decides what they mean.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - Mock implementations for testing
pub trait HttpClient: Send + Sync {
    /// Error type for HTTP operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue a GET request for `url` with the given extra `headers`.
    ///
    /// # Errors
    ///
    /// Returns an error if no response could be obtained (DNS failure,
    /// connection error, timeout).
    fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::time::Duration;

    use futures_util::TryStreamExt;
    use reqwest::{Client, Proxy, header};
    use thiserror::Error;

    use super::*;

    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30 * 60);
    pub const DEFAULT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
    pub const DEFAULT_POOL_MAX_IDLE_PER_HOST: usize = 10;

    #[derive(Debug, Error)]
    pub enum ClientSettingError {
        #[error("Invalid proxy URL {url}: {source}")]
        Proxy {
            url: String,
            #[source]
            source: reqwest::Error,
        },

        #[error("Failed to build client: {0}")]
        Build(#[from] reqwest::Error),
    }

    /// Connection-pool and proxy settings for the shared client.
    #[derive(Debug, Clone)]
    pub struct ClientSetting {
        pub proxies: Vec<String>,
        pub timeout: Duration,
        pub pool_idle_timeout: Duration,
        pub pool_max_idle_per_host: usize,
        pub user_agent: String,
    }

    impl Default for ClientSetting {
        fn default() -> Self {
            Self {
                proxies: Vec::new(),
                timeout: DEFAULT_REQUEST_TIMEOUT,
                pool_idle_timeout: DEFAULT_POOL_IDLE_TIMEOUT,
                pool_max_idle_per_host: DEFAULT_POOL_MAX_IDLE_PER_HOST,
                user_agent: concat!("hfmirror/", env!("CARGO_PKG_VERSION")).to_string(),
            }
        }
    }

    impl ClientSetting {
        pub fn build(self) -> Result<Client, ClientSettingError> {
            let mut cb = Client::builder()
                .timeout(self.timeout)
                .pool_idle_timeout(self.pool_idle_timeout)
                .pool_max_idle_per_host(self.pool_max_idle_per_host)
                .user_agent(self.user_agent);

            for url in self.proxies {
                let proxy = Proxy::all(url.as_str())
                    .map_err(|source| ClientSettingError::Proxy { url, source })?;
                cb = cb.proxy(proxy);
            }

            Ok(cb.build()?)
        }
    }

    /// Production HTTP client implementation using reqwest.
    ///
    /// Cloning is cheap; clones share one connection pool.
    #[derive(Debug, Clone)]
    pub struct ReqwestClient {
        client: Client,
    }

    impl ReqwestClient {
        /// Create a new ReqwestClient with default pool limits.
        pub fn new() -> Result<Self, ClientSettingError> {
            Self::with_setting(ClientSetting::default())
        }

        pub fn with_setting(setting: ClientSetting) -> Result<Self, ClientSettingError> {
            Ok(Self {
                client: setting.build()?,
            })
        }

        pub fn from_client(client: Client) -> Self { Self { client } }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(
            &self,
            url: &str,
            headers: &[(String, String)],
        ) -> Result<HttpResponse<Self::Error>, Self::Error> {
            let mut request = self.client.get(url);

            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = request.send().await?;
            let status = response.status().as_u16();
            let content_range = response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.bytes_stream().map_ok(Bytes::from);

            Ok(HttpResponse {
                status,
                content_range,
                body: Box::pin(body),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{
    ClientSetting, ClientSettingError, DEFAULT_POOL_IDLE_TIMEOUT, DEFAULT_POOL_MAX_IDLE_PER_HOST,
    DEFAULT_REQUEST_TIMEOUT, ReqwestClient,
};
