use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::data::{FetchOptions, FileDescriptor, ProgressSink, RepositoryTarget, RunSummary};
use crate::effects::{HttpClient, Scheduler, TreeResolver};
use crate::error::{Error, ListError, Result};
use crate::rate::TokenBucket;

/// Mirrors one repository target to local disk.
///
/// Holds the shared client, the listing rate limiter and the run options.
/// A `Mirror` can be reused for several runs; the limiter state carries over.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use hfmirror_fetch::{
///     FetchOptions, Mirror, NoopSink, ReqwestClient, RepositoryTarget, TargetOptions,
/// };
/// use tokio_util::sync::CancellationToken;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let target = RepositoryTarget::parse(
///     "https://huggingface.co/org/model/tree/main/unet",
///     &TargetOptions::default(),
/// )?;
/// let mirror = Mirror::new(Arc::new(ReqwestClient::new()?), target, FetchOptions::default());
///
/// let root = mirror.target().local_root(".");
/// let summary = mirror.mirror(&root, &NoopSink, &CancellationToken::new()).await?;
/// println!("{} files", summary.files);
/// # Ok(())
/// # }
/// ```
pub struct Mirror<C: HttpClient> {
    client: Arc<C>,
    target: RepositoryTarget,
    limiter: TokenBucket,
    options: FetchOptions,
}

impl<C: HttpClient> Mirror<C> {
    pub fn new(client: Arc<C>, target: RepositoryTarget, options: FetchOptions) -> Self {
        Self {
            limiter: TokenBucket::new(options.api_burst, options.api_rate),
            client,
            target,
            options,
        }
    }

    pub fn target(&self) -> &RepositoryTarget { &self.target }

    pub fn options(&self) -> &FetchOptions { &self.options }

    /// Every file of the target, subfolder filter applied.
    pub async fn list_files(
        &self,
        cancel: &CancellationToken,
    ) -> std::result::Result<Vec<FileDescriptor>, ListError> {
        TreeResolver::new(&*self.client, &self.limiter, self.options.max_tree_depth)
            .list_files(&self.target, cancel)
            .await
    }

    /// Download `descriptors` into `local_root`.
    pub async fn run(
        &self,
        descriptors: &[FileDescriptor],
        local_root: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        Scheduler::new(
            &*self.client,
            self.target.proxy_prefix(),
            self.options.retry,
            self.options.concurrency,
        )
        .run(descriptors, local_root, sink, cancel)
        .await
    }

    /// List the target, then download everything into `local_root`.
    pub async fn mirror(
        &self,
        local_root: &Path,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RunSummary> {
        info!(
            repo = self.target.repo_id(),
            kind = %self.target.kind(),
            branch = self.target.branch(),
            subfolder = self.target.subfolder(),
            "fetching file list"
        );
        let descriptors = self.list_files(cancel).await.map_err(|e| match e {
            ListError::Cancelled => Error::Cancelled,
            other => Error::List(other),
        })?;
        self.run(&descriptors, local_root, sink, cancel).await
    }
}
