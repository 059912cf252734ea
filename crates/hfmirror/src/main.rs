use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use hfmirror_fetch::{ClientSetting, Mirror, ReqwestClient, RepositoryTarget};
use indicatif::{HumanBytes, MultiProgress};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::App;
use crate::config::{FileConfig, Settings};
use crate::progress::TerminalProgress;

mod app;
mod config;
mod logging;
mod progress;

const EXIT_FAILURE: u8 = 1;
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let app = App::parse();
    let bars = MultiProgress::new();

    if let Err(err) = logging::init(app.verbose, &bars) {
        eprintln!("Error: {err:#}");
        return ExitCode::from(EXIT_FAILURE);
    }

    match run(app, bars).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if is_cancelled(&err) => {
            eprintln!("Interrupted; partial files are kept and will resume on the next run.");
            ExitCode::from(EXIT_INTERRUPTED)
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<hfmirror_fetch::Error>(),
        Some(hfmirror_fetch::Error::Cancelled)
    )
}

async fn run(app: App, bars: MultiProgress) -> anyhow::Result<()> {
    let file = match &app.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(&app, file);

    let target = RepositoryTarget::parse(&app.url, &settings.target)
        .with_context(|| format!("cannot use {} as a repository URL", app.url))?;
    let local_root = target.local_root(&settings.folder);

    let client = ReqwestClient::with_setting(ClientSetting {
        proxies: settings.http_proxies.clone(),
        ..ClientSetting::default()
    })
    .context("failed to build HTTP client")?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping");
                cancel.cancel();
            }
        }
    });

    info!(
        repo = target.repo_id(),
        host = target.host(),
        root = %local_root.display(),
        "mirroring"
    );
    let mirror = Mirror::new(Arc::new(client), target, settings.fetch);
    let progress = TerminalProgress::new(bars);
    let result = mirror.mirror(&local_root, &progress, &cancel).await;
    progress.finish();

    let summary = result?;
    println!(
        "Done: {} file(s), {} downloaded, {} already present, {} transferred into {}",
        summary.files,
        summary.downloaded,
        summary.skipped,
        HumanBytes(summary.bytes_transferred),
        local_root.display()
    );
    Ok(())
}
