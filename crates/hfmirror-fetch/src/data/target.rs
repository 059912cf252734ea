use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{ListError, ParseError};

pub const DEFAULT_MIRROR: &str = "https://hf-mirror.com";
pub const DEFAULT_BRANCH: &str = "main";

const API_SEGMENT: &str = "api";
const TREE_SEGMENT: &str = "tree";
const RESOLVE_SEGMENT: &str = "resolve";
const DATASETS_SEGMENT: &str = "datasets";

/// What kind of repository a target addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositoryKind {
    #[default]
    Model,
    Dataset,
}

impl RepositoryKind {
    fn api_segment(self) -> &'static str {
        match self {
            RepositoryKind::Model => "models",
            RepositoryKind::Dataset => "datasets",
        }
    }

    fn web_prefix(self) -> Option<&'static str> {
        match self {
            RepositoryKind::Model => None,
            RepositoryKind::Dataset => Some(DATASETS_SEGMENT),
        }
    }
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryKind::Model => write!(f, "Model"),
            RepositoryKind::Dataset => write!(f, "Dataset"),
        }
    }
}

/// How a raw repository URL is mapped onto a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetOptions {
    /// Mirror used for both API and file requests.
    pub mirror: String,
    /// Use the scheme and host of the given URL instead of `mirror`.
    pub disable_default_mirror: bool,
    /// Prepended verbatim to every request URL.
    pub proxy_prefix: String,
}

impl Default for TargetOptions {
    fn default() -> Self {
        Self {
            mirror: DEFAULT_MIRROR.to_string(),
            disable_default_mirror: false,
            proxy_prefix: String::new(),
        }
    }
}

/// A repository at a branch, optionally narrowed to a subfolder.
///
/// Built once from user input and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryTarget {
    repo_id: String,
    kind: RepositoryKind,
    branch: String,
    subfolder: Option<String>,
    host: Url,
    proxy_prefix: String,
}

impl RepositoryTarget {
    /// Build a target directly from its parts.
    pub fn new(
        repo_id: impl Into<String>,
        kind: RepositoryKind,
        branch: impl Into<String>,
        subfolder: Option<String>,
        host: &str,
        proxy_prefix: impl Into<String>,
    ) -> Result<Self, ParseError> {
        let repo_id = repo_id.into().trim_matches('/').to_string();
        if repo_id.is_empty() {
            return Err(ParseError::MissingRepository);
        }

        Ok(Self {
            repo_id,
            kind,
            branch: branch.into(),
            subfolder: subfolder
                .map(|s| s.trim_matches('/').to_string())
                .filter(|s| !s.is_empty()),
            host: parse_host(host)?,
            proxy_prefix: proxy_prefix.into(),
        })
    }

    /// Parse a repository web URL such as
    /// `https://huggingface.co/org/name/tree/main/sub/dir`.
    ///
    /// Without a `/tree/` segment the whole path is the repository id and the
    /// branch defaults to `main`. A leading `datasets/` selects a dataset.
    pub fn parse(raw_url: &str, options: &TargetOptions) -> Result<Self, ParseError> {
        let raw_url = raw_url.trim().trim_end_matches('/');
        let parsed = Url::parse(raw_url).map_err(|source| ParseError::InvalidUrl {
            url: raw_url.to_string(),
            source,
        })?;

        let mut parts: Vec<&str> = parsed
            .path_segments()
            .map(|segments| segments.filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();

        let kind = if parts.first() == Some(&DATASETS_SEGMENT) {
            parts.remove(0);
            RepositoryKind::Dataset
        } else {
            RepositoryKind::Model
        };

        let (repo_id, branch, subfolder) = match parts.iter().position(|p| *p == TREE_SEGMENT) {
            None => (parts.join("/"), DEFAULT_BRANCH.to_string(), None),
            Some(idx) => {
                let branch = parts.get(idx + 1).ok_or(ParseError::MissingBranch)?;
                let rest = &parts[(idx + 2).min(parts.len())..];
                let subfolder = (!rest.is_empty()).then(|| rest.join("/"));
                (parts[..idx].join("/"), branch.to_string(), subfolder)
            }
        };

        let host = if options.disable_default_mirror {
            parsed.origin().ascii_serialization()
        } else {
            options.mirror.clone()
        };

        Self::new(
            repo_id,
            kind,
            branch,
            subfolder,
            &host,
            options.proxy_prefix.clone(),
        )
    }

    pub fn repo_id(&self) -> &str { &self.repo_id }

    pub fn kind(&self) -> RepositoryKind { self.kind }

    pub fn branch(&self) -> &str { &self.branch }

    pub fn subfolder(&self) -> Option<&str> { self.subfolder.as_deref() }

    pub fn host(&self) -> &str { self.host.as_str().trim_end_matches('/') }

    pub fn proxy_prefix(&self) -> &str { &self.proxy_prefix }

    /// Last component of the repository id, e.g. `bert-base-uncased`.
    pub fn name(&self) -> &str {
        self.repo_id.rsplit('/').next().unwrap_or(&self.repo_id)
    }

    /// Local directory the repository is mirrored into.
    pub fn local_root(&self, parent: impl AsRef<Path>) -> PathBuf {
        parent.as_ref().join(self.name())
    }

    /// Listing endpoint for the directory at `path` (empty for the root).
    pub fn tree_url(&self, path: &str) -> Result<String, ListError> {
        let kind = self.kind.api_segment();
        self.join([
            API_SEGMENT,
            kind,
            self.repo_id.as_str(),
            TREE_SEGMENT,
            self.branch.as_str(),
            path,
        ])
    }

    /// Download endpoint for the file at `path`.
    pub fn resolve_url(&self, path: &str) -> Result<String, ListError> {
        let prefix = self.kind.web_prefix().unwrap_or_default();
        self.join([
            prefix,
            self.repo_id.as_str(),
            RESOLVE_SEGMENT,
            self.branch.as_str(),
            path,
        ])
    }

    /// Apply the proxy prefix to an already-built URL.
    pub fn request_url(&self, url: &str) -> String {
        format!("{}{}", self.proxy_prefix, url)
    }

    /// Local path of a repository file, relative to the local root.
    pub fn local_relative<'a>(&self, repo_path: &'a str) -> &'a str {
        match &self.subfolder {
            Some(sub) => repo_path
                .strip_prefix(sub.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .unwrap_or(repo_path),
            None => repo_path,
        }
    }

    /// Whether a file at `repo_path` belongs to the requested subfolder.
    pub fn includes(&self, repo_path: &str) -> bool {
        crate::core::matches_subfolder(repo_path, self.subfolder.as_deref())
    }

    fn join<'a>(&self, parts: impl IntoIterator<Item = &'a str>) -> Result<String, ListError> {
        let mut url = self.host.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| ListError::Url(self.host.to_string()))?;
            segments.pop_if_empty();
            for part in parts {
                segments.extend(part.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url.to_string())
    }
}

fn parse_host(host: &str) -> Result<Url, ParseError> {
    let url = Url::parse(host.trim_end_matches('/')).map_err(|source| ParseError::InvalidUrl {
        url: host.to_string(),
        source,
    })?;
    if url.cannot_be_a_base() {
        return Err(ParseError::InvalidHost(host.to_string()));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(url: &str) -> RepositoryTarget {
        RepositoryTarget::parse(url, &TargetOptions::default()).unwrap()
    }

    #[test]
    fn parses_plain_repository() {
        let t = parse("https://huggingface.co/google-bert/bert-base-uncased/");
        assert_eq!(t.repo_id(), "google-bert/bert-base-uncased");
        assert_eq!(t.branch(), "main");
        assert_eq!(t.subfolder(), None);
        assert_eq!(t.kind(), RepositoryKind::Model);
        assert_eq!(t.host(), "https://hf-mirror.com");
    }

    #[test]
    fn parses_tree_with_subfolder() {
        let t = parse("https://huggingface.co/org/name/tree/dev/sub/dir");
        assert_eq!(t.repo_id(), "org/name");
        assert_eq!(t.branch(), "dev");
        assert_eq!(t.subfolder(), Some("sub/dir"));
    }

    #[test]
    fn parses_dataset_prefix() {
        let t = parse("https://huggingface.co/datasets/org/data/tree/main");
        assert_eq!(t.kind(), RepositoryKind::Dataset);
        assert_eq!(t.repo_id(), "org/data");
        assert_eq!(t.subfolder(), None);
    }

    #[test]
    fn missing_branch_is_an_error() {
        let err = RepositoryTarget::parse(
            "https://huggingface.co/org/name/tree/",
            &TargetOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::MissingBranch));
    }

    #[test]
    fn empty_path_is_an_error() {
        let err = RepositoryTarget::parse("https://huggingface.co/", &TargetOptions::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::MissingRepository));
    }

    #[test]
    fn disabled_mirror_uses_url_host() {
        let options = TargetOptions {
            disable_default_mirror: true,
            ..TargetOptions::default()
        };
        let t = RepositoryTarget::parse("https://huggingface.co/org/name", &options).unwrap();
        assert_eq!(t.host(), "https://huggingface.co");
    }

    #[test]
    fn builds_tree_and_resolve_urls() {
        let t = parse("https://hf-mirror.com/core42/sd3/tree/main/text_encoder_3");
        assert_eq!(
            t.tree_url("").unwrap(),
            "https://hf-mirror.com/api/models/core42/sd3/tree/main"
        );
        assert_eq!(
            t.tree_url("text_encoder_3").unwrap(),
            "https://hf-mirror.com/api/models/core42/sd3/tree/main/text_encoder_3"
        );
        assert_eq!(
            t.resolve_url("text_encoder_3/config.json").unwrap(),
            "https://hf-mirror.com/core42/sd3/resolve/main/text_encoder_3/config.json"
        );
    }

    #[test]
    fn dataset_urls_carry_prefix() {
        let t = parse("https://huggingface.co/datasets/org/data");
        assert_eq!(
            t.tree_url("").unwrap(),
            "https://hf-mirror.com/api/datasets/org/data/tree/main"
        );
        assert_eq!(
            t.resolve_url("train.csv").unwrap(),
            "https://hf-mirror.com/datasets/org/data/resolve/main/train.csv"
        );
    }

    #[test]
    fn proxy_prefix_is_prepended_verbatim() {
        let options = TargetOptions {
            proxy_prefix: "https://proxy.example/".to_string(),
            ..TargetOptions::default()
        };
        let t = RepositoryTarget::parse("https://huggingface.co/org/name", &options).unwrap();
        assert_eq!(
            t.request_url("https://hf-mirror.com/x"),
            "https://proxy.example/https://hf-mirror.com/x"
        );
    }

    #[test]
    fn local_paths_strip_subfolder() {
        let t = parse("https://huggingface.co/org/name/tree/main/text_encoder_3");
        assert_eq!(t.local_relative("text_encoder_3/config.json"), "config.json");
        assert_eq!(t.local_relative("text_encoder_3"), "text_encoder_3");
        assert_eq!(t.local_root("/models"), PathBuf::from("/models/name"));
    }
}
