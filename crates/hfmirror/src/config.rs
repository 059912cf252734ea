//! Settings file and the merge of file values with command-line flags.
//!
//! A flag always wins over the file, and the file over built-in defaults.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hfmirror_fetch::data::DEFAULT_MIRROR;
use hfmirror_fetch::{FetchOptions, TargetOptions};
use serde::Deserialize;
use thiserror::Error;

use crate::app::App;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Contents of the `--config` TOML file. Every key is optional.
///
/// ```toml
/// folder = "/data/models"
/// mirror = "https://hf-mirror.com"
/// workers = 4
/// max-attempts = 8
/// retry-base-delay-secs = 2
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileConfig {
    pub folder: Option<PathBuf>,
    pub mirror: Option<String>,
    pub disable_default_mirror: Option<bool>,
    pub proxy_prefix: Option<String>,
    pub http_proxies: Option<Vec<String>>,
    pub workers: Option<usize>,
    pub max_attempts: Option<u32>,
    pub retry_base_delay_secs: Option<u64>,
    pub retry_step_secs: Option<u64>,
    pub api_rate: Option<f64>,
    pub max_tree_depth: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Everything a run needs, after merging flags over the file.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub folder: PathBuf,
    pub target: TargetOptions,
    pub fetch: FetchOptions,
    pub http_proxies: Vec<String>,
}

impl Settings {
    pub fn resolve(app: &App, file: FileConfig) -> Self {
        let target = TargetOptions {
            mirror: app
                .mirror
                .clone()
                .or(file.mirror)
                .unwrap_or_else(|| DEFAULT_MIRROR.to_string()),
            disable_default_mirror: app.disable_default_mirror
                || file.disable_default_mirror.unwrap_or(false),
            proxy_prefix: app
                .proxy_prefix
                .clone()
                .or(file.proxy_prefix)
                .unwrap_or_default(),
        };

        let mut fetch = FetchOptions::default();
        if let Some(workers) = app.workers.or(file.workers) {
            fetch = fetch.concurrency(workers);
        }
        if let Some(attempts) = app.attempts.or(file.max_attempts) {
            fetch = fetch.max_attempts(attempts);
        }
        if let Some(secs) = file.retry_base_delay_secs {
            fetch = fetch.retry_base_delay(Duration::from_secs(secs));
        }
        if let Some(secs) = file.retry_step_secs {
            fetch = fetch.retry_step(Duration::from_secs(secs));
        }
        if let Some(rate) = file.api_rate {
            fetch = fetch.api_rate(rate);
        }
        if let Some(depth) = file.max_tree_depth {
            fetch = fetch.max_tree_depth(depth);
        }

        let http_proxies = if app.http_proxies.is_empty() {
            file.http_proxies.unwrap_or_default()
        } else {
            app.http_proxies.clone()
        };

        Self {
            folder: app
                .folder
                .clone()
                .or(file.folder)
                .unwrap_or_else(|| PathBuf::from(".")),
            target,
            fetch,
            http_proxies,
        }
    }
}
