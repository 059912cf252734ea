pub const STATUS_OK: u16 = 200;
pub const STATUS_PARTIAL_CONTENT: u16 = 206;

/// `Range` header value requesting everything from `offset` on, or `None`
/// for a plain request.
///
/// # Examples
///
/// ```
/// use hfmirror_fetch::core::range_header;
///
/// assert_eq!(range_header(0), None);
/// assert_eq!(range_header(1024).as_deref(), Some("bytes=1024-"));
/// ```
pub fn range_header(offset: u64) -> Option<String> {
    (offset > 0).then(|| format!("bytes={offset}-"))
}

/// Returns `true` for the only statuses a content request may answer with.
pub fn is_content_status(status: u16) -> bool {
    matches!(status, STATUS_OK | STATUS_PARTIAL_CONTENT)
}

/// First byte position of a `Content-Range: bytes start-end/total` value.
pub fn content_range_start(value: &str) -> Option<u64> {
    let rest = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, _total) = rest.split_once('/')?;
    let (start, _end) = range.split_once('-')?;
    start.trim().parse().ok()
}
