//! Logging initialization using `tracing` and `tracing-subscriber`.
//!
//! Every event goes to stderr and, when a log file is
//! configured, is mirrored to that file in append mode. When
//! stderr already is that file (the scheduled run redirects
//! into it) events are written once.

use std::fs::{File, OpenOptions};
use std::io::IsTerminal;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

/// Initialize the global subscriber. Safe to call multiple
/// times; subsequent calls no-op.
///
/// A log file that cannot be opened is reported once on stderr
/// and otherwise ignored.
pub fn init_logging(format: LogFormat, log_file: Option<&Path>) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let (file, open_error) = match log_file.map(open_append) {
        Some(Ok(file)) => (Some(file), None),
        Some(Err(e)) => (None, Some(e)),
        None => (None, None),
    };
    let file = file.filter(|f| !stderr_is(f));
    let ansi = std::io::stderr().is_terminal();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stderr_layer = match format {
        LogFormat::Human => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(ansi)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
    };

    let file_layer = file.map(|file| match format {
        LogFormat::Human => fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(Mutex::new(file))
            .with_target(false)
            .boxed(),
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    if let (Some(e), Some(path)) = (open_error, log_file) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "log file unavailable, logging to stderr only"
        );
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Whether stderr refers to the same open file as `file`.
#[cfg(unix)]
fn stderr_is(file: &File) -> bool {
    use std::os::fd::AsFd;

    std::io::stderr()
        .as_fd()
        .try_clone_to_owned()
        .is_ok_and(|fd| same_file(&File::from(fd), file))
}

#[cfg(not(unix))]
const fn stderr_is(_file: &File) -> bool {
    false
}

#[cfg(unix)]
fn same_file(a: &File, b: &File) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (a.metadata(), b.metadata()) {
        (Ok(a), Ok(b)) => a.dev() == b.dev() && a.ino() == b.ino(),
        _ => false,
    }
}
