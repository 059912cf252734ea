//! In-memory [`HttpClient`] for tests and examples.
//!
//! Routes are keyed by the exact request URL. File routes honor
//! `Range: bytes=N-` unless told otherwise, and every request is recorded so
//! tests can assert on what went over the "wire".

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use thiserror::Error;

use crate::core::{STATUS_OK, STATUS_PARTIAL_CONTENT};
use crate::effects::http::{BoxStream, HttpClient, HttpResponse};

const STATUS_NOT_FOUND: u16 = 404;
const STATUS_RANGE_NOT_SATISFIABLE: u16 = 416;
const STATUS_SERVICE_UNAVAILABLE: u16 = 503;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct MockError(pub String);

/// How a route treats a `Range` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangeMode {
    /// Answer 206 with the requested tail.
    #[default]
    Honor,
    /// Answer 200 with the whole body.
    Ignore,
    /// Answer 206 but send the whole body with a `Content-Range` starting at 0.
    Misreport,
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub url: String,
    pub range: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct Route {
    status: u16,
    body: Vec<u8>,
    range: RangeMode,
    fail_times: u32,
    /// Cut the stream after this many bytes, for the given number of responses.
    break_after: Option<(usize, u32)>,
    /// Refuse to connect at all, for the given number of requests.
    connect_failures: u32,
}

struct ActiveGuard {
    active: Arc<AtomicUsize>,
}

impl ActiveGuard {
    fn enter(active: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            active: Arc::clone(active),
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) { self.active.fetch_sub(1, Ordering::SeqCst); }
}

/// Scriptable in-memory HTTP server.
#[derive(Default)]
pub struct MockHttpClient {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
    active: Arc<AtomicUsize>,
    peak_active: AtomicUsize,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            chunk_size: 16,
            ..Self::default()
        }
    }

    /// Bytes per body chunk.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Sleep before yielding each body chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    fn routes(&self) -> MutexGuard<'_, HashMap<String, Route>> {
        self.routes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, url: &str, f: impl FnOnce(&mut Route)) {
        let mut routes = self.routes();
        let route = routes.entry(url.to_string()).or_insert_with(|| Route {
            status: STATUS_OK,
            ..Route::default()
        });
        f(route);
    }

    /// Serve `body` with `status` at `url`.
    pub fn route(&self, url: &str, status: u16, body: impl Into<Vec<u8>>) {
        let body = body.into();
        self.update(url, |r| {
            r.status = status;
            r.body = body;
        });
    }

    /// Serve a downloadable file.
    pub fn file(&self, url: &str, body: impl Into<Vec<u8>>) { self.route(url, STATUS_OK, body) }

    /// Serve a JSON document.
    pub fn json(&self, url: &str, body: &str) { self.route(url, STATUS_OK, body.as_bytes()) }

    /// Answer the next `times` requests with 503.
    pub fn fail_times(&self, url: &str, times: u32) { self.update(url, |r| r.fail_times = times) }

    /// Fail the next `times` requests before any response is produced.
    pub fn refuse_connections(&self, url: &str, times: u32) {
        self.update(url, |r| r.connect_failures = times)
    }

    /// Cut the next `times` bodies after `bytes` bytes with a stream error.
    pub fn break_after(&self, url: &str, bytes: usize, times: u32) {
        self.update(url, |r| r.break_after = Some((bytes, times)))
    }

    pub fn range_mode(&self, url: &str, mode: RangeMode) { self.update(url, |r| r.range = mode) }

    /// Every request seen so far, in arrival order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn requests_for(&self, url: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.url == url).collect()
    }

    /// Highest number of response bodies open at the same time.
    pub fn peak_active(&self) -> usize { self.peak_active.load(Ordering::SeqCst) }

    fn respond(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse<MockError>, MockError> {
        let range = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("range"))
            .map(|(_, v)| v.clone());
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedRequest {
                url: url.to_string(),
                range: range.clone(),
            });

        let mut routes = self.routes();
        let Some(route) = routes.get_mut(url) else {
            return Ok(HttpResponse::new(STATUS_NOT_FOUND, empty_body()));
        };

        if route.connect_failures > 0 {
            route.connect_failures -= 1;
            return Err(MockError(format!("connection refused: {url}")));
        }
        if route.fail_times > 0 {
            route.fail_times -= 1;
            return Ok(HttpResponse::new(STATUS_SERVICE_UNAVAILABLE, empty_body()));
        }

        let len = route.body.len();
        let offset = range
            .as_deref()
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.strip_suffix('-'))
            .and_then(|v| v.parse::<usize>().ok());

        let (status, content_range, data) = match (offset, route.range) {
            (Some(off), RangeMode::Honor) if route.status == STATUS_OK => {
                if off >= len {
                    (STATUS_RANGE_NOT_SATISFIABLE, None, Vec::new())
                } else {
                    let header = format!("bytes {}-{}/{}", off, len - 1, len);
                    (STATUS_PARTIAL_CONTENT, Some(header), route.body[off..].to_vec())
                }
            }
            (Some(_), RangeMode::Misreport) if route.status == STATUS_OK && len > 0 => {
                let header = format!("bytes 0-{}/{}", len - 1, len);
                (STATUS_PARTIAL_CONTENT, Some(header), route.body.clone())
            }
            _ => (route.status, None, route.body.clone()),
        };

        let cut = match route.break_after {
            Some((bytes, times)) if times > 0 => {
                route.break_after = Some((bytes, times - 1));
                Some(bytes)
            }
            _ => None,
        };
        drop(routes);

        let mut items: Vec<Result<Bytes, MockError>> = match cut {
            Some(bytes) => data[..bytes.min(data.len())]
                .chunks(self.chunk_size.max(1))
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect(),
            None => data
                .chunks(self.chunk_size.max(1))
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect(),
        };
        if cut.is_some() {
            items.push(Err(MockError("connection reset by peer".to_string())));
        }

        let guard = ActiveGuard::enter(&self.active, &self.peak_active);
        let delay = self.chunk_delay;
        let body = futures_util::stream::iter(items).then(move |item| {
            let _open = &guard;
            async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                item
            }
        });

        let response = HttpResponse::new(status, Box::pin(body));
        Ok(match content_range {
            Some(value) => response.with_content_range(value),
            None => response,
        })
    }
}

fn empty_body() -> BoxStream<'static, Result<Bytes, MockError>> { Box::pin(futures_util::stream::empty()) }

impl HttpClient for MockHttpClient {
    type Error = MockError;

    async fn get(
        &self,
        url: &str,
        headers: &[(String, String)],
    ) -> Result<HttpResponse<Self::Error>, Self::Error> {
        self.respond(url, headers)
    }
}
