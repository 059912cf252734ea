use indicatif::MultiProgress;
use tracing_subscriber::EnvFilter;

use crate::progress::SuspendWriter;

/// Filter directive for a `-v` count when `RUST_LOG` is unset.
fn level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber, writing to stderr between bar redraws.
pub fn init(verbose: u8, bars: &MultiProgress) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level(verbose)));
    let bars = bars.clone();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(move || SuspendWriter::new(bars.clone()))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}
