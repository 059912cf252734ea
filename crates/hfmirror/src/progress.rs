use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Mutex;

use hfmirror_fetch::{FileOutcome, ProgressSink};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;

const FILE_STYLE: &str = "{spinner:.blue} {prefix:>24.cyan.bold} [{elapsed_precise}] {wide_bar:.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const TOTAL_STYLE: &str = "{spinner:.green} {prefix:>24.green.bold} [{elapsed_precise}] {wide_bar:.green/white} {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";

const TICK: &str = "⠁⠂⠄⡀⢀⠠⠐⠈ ";

const PB_CHARS: &str = "█▓▒░  ";

const PREFIX_WIDTH: usize = 24;

fn template(style: &str) -> Option<ProgressStyle> {
    ProgressStyle::with_template(style)
        .ok()
        .map(|s| s.tick_chars(TICK).progress_chars(PB_CHARS))
}

static FILE_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| template(FILE_STYLE));

static TOTAL_TEMPLATE: Lazy<Option<ProgressStyle>> = Lazy::new(|| template(TOTAL_STYLE));

fn styled(pb: ProgressBar, style: &Lazy<Option<ProgressStyle>>) -> ProgressBar {
    match style.as_ref() {
        Some(style) => pb.with_style(style.clone()),
        None => pb,
    }
}

/// Shorten long file names from the left so the bars stay aligned.
fn prefix(path: &str) -> String {
    let name = path.rsplit('/').next().unwrap_or(path);
    let count = name.chars().count();
    if count <= PREFIX_WIDTH {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - (PREFIX_WIDTH - 1)).collect();
    format!("…{tail}")
}

/// Terminal progress: one bar per active file plus an aggregate bar.
pub struct TerminalProgress {
    bars: MultiProgress,
    total: ProgressBar,
    files: Mutex<HashMap<String, ProgressBar>>,
}

impl TerminalProgress {
    pub fn new(bars: MultiProgress) -> Self {
        let total = bars.add(styled(ProgressBar::new(0), &TOTAL_TEMPLATE));
        total.set_prefix("total");
        Self {
            bars,
            total,
            files: Mutex::new(HashMap::new()),
        }
    }

    fn with_file(&self, path: &str, f: impl FnOnce(&ProgressBar)) {
        let files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(pb) = files.get(path) {
            f(pb);
        }
    }

    /// Clear every bar, leaving the terminal for the summary.
    pub fn finish(&self) {
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        for (_, pb) in files.drain() {
            pb.finish_and_clear();
        }
        self.total.finish_and_clear();
    }

    pub fn completed(&self) -> u64 { self.total.position() }
}

impl ProgressSink for TerminalProgress {
    fn run_started(&self, total_bytes: u64, files: usize) {
        self.total.set_length(total_bytes);
        self.total.set_message(format!("{files} file(s)"));
    }

    fn file_started(&self, path: &str, size: u64) {
        let pb = self.bars.insert_before(&self.total, styled(ProgressBar::new(size), &FILE_TEMPLATE));
        pb.set_prefix(prefix(path));
        self.files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path.to_string(), pb);
    }

    fn file_advanced(&self, path: &str, bytes: u64) { self.with_file(path, |pb| pb.inc(bytes)); }

    fn file_reset(&self, path: &str, position: u64) {
        self.with_file(path, |pb| pb.set_position(position));
    }

    fn total_advanced(&self, bytes: u64) { self.total.inc(bytes); }

    fn file_finished(&self, path: &str, outcome: FileOutcome) {
        let removed = self
            .files
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(path);
        if let Some(pb) = removed {
            pb.finish_and_clear();
            self.bars.remove(&pb);
        }
        if outcome == FileOutcome::Failed {
            let _ = self.bars.println(format!("failed: {path}"));
        }
    }
}

/// `io::Write` for log output that hides the bars while a line is printed.
pub struct SuspendWriter {
    bars: MultiProgress,
}

impl SuspendWriter {
    pub fn new(bars: MultiProgress) -> Self { Self { bars } }
}

impl Write for SuspendWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bars.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> { io::stderr().flush() }
}
