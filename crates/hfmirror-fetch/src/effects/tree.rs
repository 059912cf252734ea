use std::collections::HashSet;

use futures_util::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{STATUS_OK, is_safe_relative};
use crate::data::{EntryKind, FileDescriptor, RepositoryTarget, TreeEntry};
use crate::effects::http::HttpClient;
use crate::error::ListError;
use crate::rate::TokenBucket;

/// Walks a repository tree through the listing API.
///
/// Directories are visited from an explicit worklist; every listing request
/// waits on the shared [`TokenBucket`] first.
pub struct TreeResolver<'a, C: HttpClient> {
    client: &'a C,
    limiter: &'a TokenBucket,
    max_depth: usize,
}

impl<'a, C: HttpClient> TreeResolver<'a, C> {
    pub fn new(client: &'a C, limiter: &'a TokenBucket, max_depth: usize) -> Self {
        Self {
            client,
            limiter,
            max_depth,
        }
    }

    /// List every file of `target` that falls under its subfolder filter.
    ///
    /// Directories are always descended into, since the filter may name a
    /// path inside a directory that has not been listed yet. Files come back
    /// in directory listing order.
    pub async fn list_files(
        &self,
        target: &RepositoryTarget,
        cancel: &CancellationToken,
    ) -> Result<Vec<FileDescriptor>, ListError> {
        let mut pending: Vec<(String, usize)> = vec![(String::new(), 0)];
        let mut visited_dirs = HashSet::new();
        let mut seen_files = HashSet::new();
        let mut files = Vec::new();

        while let Some((dir, depth)) = pending.pop() {
            if cancel.is_cancelled() {
                return Err(ListError::Cancelled);
            }
            if depth > self.max_depth {
                return Err(ListError::TooDeep {
                    path: dir,
                    max_depth: self.max_depth,
                });
            }
            if !visited_dirs.insert(dir.clone()) {
                continue;
            }

            let mut subdirs = Vec::new();
            for entry in self.list_dir(target, &dir, cancel).await? {
                if !is_safe_relative(&entry.path) {
                    return Err(ListError::UnsafePath(entry.path));
                }

                match entry.kind {
                    EntryKind::File => {
                        if !target.includes(&entry.path) {
                            continue;
                        }
                        if !seen_files.insert(entry.path.clone()) {
                            warn!(path = %entry.path, "dropping duplicate listing entry");
                            continue;
                        }
                        let url = target.resolve_url(&entry.path)?;
                        let local = target.local_relative(&entry.path).to_string();
                        files.push(FileDescriptor::new(entry.path, local, entry.size, url));
                    }
                    EntryKind::Directory => subdirs.push(entry.path),
                    EntryKind::Other => {
                        debug!(path = %entry.path, "ignoring entry of unknown type");
                    }
                }
            }

            // Reverse so the stack pops subdirectories in listing order.
            pending.extend(subdirs.into_iter().rev().map(|d| (d, depth + 1)));
        }

        Ok(files)
    }

    async fn list_dir(
        &self,
        target: &RepositoryTarget,
        dir: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TreeEntry>, ListError> {
        self.limiter
            .acquire(cancel)
            .await
            .map_err(|_| ListError::Cancelled)?;

        let url = target.request_url(&target.tree_url(dir)?);
        debug!(%url, "listing directory");

        let request = async {
            let response = self
                .client
                .get(&url, &[])
                .await
                .map_err(|e| ListError::Request {
                    url: url.clone(),
                    message: e.to_string(),
                })?;

            if response.status != STATUS_OK {
                return Err(ListError::Status {
                    url: url.clone(),
                    status: response.status,
                });
            }

            let chunks: Vec<bytes::Bytes> =
                response
                    .body
                    .try_collect()
                    .await
                    .map_err(|e| ListError::Request {
                        url: url.clone(),
                        message: format!("failed to read API response body: {e}"),
                    })?;
            Ok(chunks.concat())
        };

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ListError::Cancelled),
            body = request => body?,
        };

        let entries: Vec<TreeEntry> =
            serde_json::from_slice(&body).map_err(|source| ListError::Json {
                url: url.clone(),
                source,
            })?;
        debug!(%url, entries = entries.len(), "listed directory");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TargetOptions;
    use crate::effects::mock::MockHttpClient;

    const ROOT: &str = "https://hf-mirror.com/api/models/org/repo/tree/main";

    fn target(url: &str) -> RepositoryTarget {
        RepositoryTarget::parse(url, &TargetOptions::default()).unwrap()
    }

    fn unlimited() -> TokenBucket { TokenBucket::per_second(0.0) }

    #[tokio::test]
    async fn test_subfolder_filter_selects_nested_file() {
        let client = MockHttpClient::new();
        client.json(
            ROOT,
            r#"[{"type":"directory","path":"text_encoder_3","size":0},
                {"type":"directory","path":"other","size":0}]"#,
        );
        client.json(
            &format!("{ROOT}/text_encoder_3"),
            r#"[{"type":"file","path":"text_encoder_3/config.json","size":10}]"#,
        );
        client.json(
            &format!("{ROOT}/other"),
            r#"[{"type":"file","path":"other/file.bin","size":20}]"#,
        );
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);

        let t = target("https://huggingface.co/org/repo/tree/main/text_encoder_3");
        let files = resolver
            .list_files(&t, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, "text_encoder_3/config.json");
        assert_eq!(files[0].local_path, "config.json");
        assert_eq!(files[0].size, 10);
        assert_eq!(
            files[0].url,
            "https://hf-mirror.com/org/repo/resolve/main/text_encoder_3/config.json"
        );
        // Filtering never prunes traversal
        assert_eq!(client.requests_for(&format!("{ROOT}/other")).len(), 1);
    }

    #[tokio::test]
    async fn test_recursive_listing_preserves_order() {
        let client = MockHttpClient::new();
        client.json(
            ROOT,
            r#"[{"type":"file","path":"README.md","size":5},
                {"type":"directory","path":"a"},
                {"type":"directory","path":"b"}]"#,
        );
        client.json(
            &format!("{ROOT}/a"),
            r#"[{"type":"directory","path":"a/deep"}]"#,
        );
        client.json(
            &format!("{ROOT}/a/deep"),
            r#"[{"type":"file","path":"a/deep/x.bin","size":1}]"#,
        );
        client.json(
            &format!("{ROOT}/b"),
            r#"[{"type":"file","path":"b/y.bin","size":2}]"#,
        );
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);

        let files = resolver
            .list_files(&target("https://huggingface.co/org/repo"), &CancellationToken::new())
            .await
            .unwrap();

        let paths: Vec<_> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["README.md", "a/deep/x.bin", "b/y.bin"]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_list_error() {
        let client = MockHttpClient::new();
        client.route(ROOT, 401, "unauthorized");
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);

        let err = resolver
            .list_files(&target("https://huggingface.co/org/repo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::Status { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_malformed_json_is_list_error() {
        let client = MockHttpClient::new();
        client.json(ROOT, r#"{"error":"not a list"}"#);
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);

        let err = resolver
            .list_files(&target("https://huggingface.co/org/repo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::Json { .. }));
    }

    #[tokio::test]
    async fn test_unsafe_path_is_rejected() {
        let client = MockHttpClient::new();
        client.json(ROOT, r#"[{"type":"file","path":"../escape","size":1}]"#);
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);

        let err = resolver
            .list_files(&target("https://huggingface.co/org/repo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::UnsafePath(p) if p == "../escape"));
    }

    #[tokio::test]
    async fn test_depth_cap() {
        let client = MockHttpClient::new();
        client.json(ROOT, r#"[{"type":"directory","path":"a"}]"#);
        client.json(&format!("{ROOT}/a"), r#"[{"type":"directory","path":"a/b"}]"#);
        client.json(&format!("{ROOT}/a/b"), r#"[]"#);
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 1);

        let err = resolver
            .list_files(&target("https://huggingface.co/org/repo"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::TooDeep { ref path, max_depth: 1 } if path == "a/b"));
    }

    #[tokio::test]
    async fn test_duplicates_are_dropped() {
        let client = MockHttpClient::new();
        client.json(
            ROOT,
            r#"[{"type":"file","path":"a.bin","size":1},
                {"type":"file","path":"a.bin","size":1}]"#,
        );
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);

        let files = resolver
            .list_files(&target("https://huggingface.co/org/repo"), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let client = MockHttpClient::new();
        client.json(ROOT, "[]");
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = resolver
            .list_files(&target("https://huggingface.co/org/repo"), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ListError::Cancelled));
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn test_proxy_prefix_applies_to_listing() {
        let client = MockHttpClient::new();
        client.json(&format!("https://proxy.example/{ROOT}"), "[]");
        let limiter = unlimited();
        let resolver = TreeResolver::new(&client, &limiter, 8);
        let options = TargetOptions {
            proxy_prefix: "https://proxy.example/".to_string(),
            ..TargetOptions::default()
        };
        let t = RepositoryTarget::parse("https://huggingface.co/org/repo", &options).unwrap();

        let files = resolver.list_files(&t, &CancellationToken::new()).await.unwrap();
        assert!(files.is_empty());
    }
}
