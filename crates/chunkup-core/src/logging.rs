//! Logging setup for hosts embedding the upload engine.
//!
//! The engine itself only emits `tracing` events; a host calls one of these
//! once at startup to route them to `~/.local/state/chunkup/chunkup.log` or
//! to stderr.

use anyhow::{anyhow, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,chunkup_core=debug";

/// Where log lines go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// `chunkup.log` under the XDG state directory.
    StateDir,
    /// An explicit file (appended to).
    File(PathBuf),
    Stderr,
}

/// Per-event writer: a clone of the log file handle, or stderr when the clone fails.
enum LogWriter {
    File(File),
    Stderr,
}

impl io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            LogWriter::File(f) => f.write(buf),
            LogWriter::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            LogWriter::File(f) => f.flush(),
            LogWriter::Stderr => io::stderr().lock().flush(),
        }
    }
}

struct SharedFile(File);

impl<'a> MakeWriter<'a> for SharedFile {
    type Writer = LogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.0
            .try_clone()
            .map(LogWriter::File)
            .unwrap_or(LogWriter::Stderr)
    }
}

/// `RUST_LOG` if set and valid, otherwise `info,chunkup_core=debug`.
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Resolve the log file path for [`LogTarget::StateDir`].
pub fn default_log_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("chunkup")?;
    Ok(xdg_dirs.get_state_home().join("chunkup.log"))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Install the global subscriber for `target`.
///
/// Fails if the log file cannot be opened or a subscriber is already
/// installed; callers usually fall back to [`init_logging_stderr`].
pub fn init(target: LogTarget) -> Result<()> {
    let (writer, path) = match target {
        LogTarget::Stderr => (BoxMakeWriter::new(io::stderr), None),
        LogTarget::StateDir => {
            let path = default_log_path()?;
            (BoxMakeWriter::new(SharedFile(open_log_file(&path)?)), Some(path))
        }
        LogTarget::File(path) => {
            let file = open_log_file(&path)?;
            (BoxMakeWriter::new(SharedFile(file)), Some(path))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("install tracing subscriber: {}", e))?;

    if let Some(path) = path {
        tracing::info!("chunkup logging initialized at {}", path.display());
    }
    Ok(())
}

/// Log to the XDG state directory.
pub fn init_logging() -> Result<()> {
    init(LogTarget::StateDir)
}

/// Log to stderr only. Ignores an already-installed subscriber.
pub fn init_logging_stderr() {
    let _ = init(LogTarget::Stderr);
}
