use std::path::PathBuf;

use clap::{ArgAction, Parser};

const EXAMPLES: &str = "\
Examples:
  hfmirror -u https://huggingface.co/google-bert/bert-base-uncased
  hfmirror -u https://hf-mirror.com/core42/stable-diffusion-3-medium-diffusers/tree/main/text_encoder_3 -f D:/models";

#[derive(Clone, Debug, Parser)]
#[command(
    name = "hfmirror",
    version = env!("CARGO_PKG_VERSION"),
    about = "Download a Hugging Face model or dataset through a mirror site",
    long_about = None,
    after_help = EXAMPLES
)]
pub struct App {
    /// Model or dataset URL, optionally pointing at a subfolder via /tree/<branch>/<path>
    #[arg(short = 'u', long = "url")]
    pub url: String,

    /// Parent folder the repository directory is created in [default: ./]
    #[arg(short = 'f', long = "folder")]
    pub folder: Option<PathBuf>,

    /// Prefix prepended verbatim to every request URL
    #[arg(short = 'p', long = "proxy-prefix")]
    pub proxy_prefix: Option<String>,

    /// Mirror site serving the API and files [default: https://hf-mirror.com]
    #[arg(short = 'm', long = "mirror", env = "HFMIRROR_MIRROR")]
    pub mirror: Option<String>,

    /// Talk to the host from --url instead of the mirror
    #[arg(short = 'd', long = "disable-mirror")]
    pub disable_default_mirror: bool,

    /// Number of concurrent downloads [default: 8]
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<usize>,

    /// Attempts per file before the run is aborted [default: 5]
    #[arg(long = "attempts")]
    pub attempts: Option<u32>,

    /// HTTP(S) proxy for all connections; may be repeated
    #[arg(long = "http-proxy", value_name = "URL")]
    pub http_proxies: Vec<String>,

    /// TOML file with default settings
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}
