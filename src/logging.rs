//! Log sinks handed to the engine, and process-wide tracing setup.

use crate::error::Result;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Receives the engine's messages at four severities.
pub trait LogSink: Send + Sync {
    fn debug(&self, msg: &str);
    fn info(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Drops every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct MutedLogSink;

impl LogSink for MutedLogSink {
    fn debug(&self, _msg: &str) {}
    fn info(&self, _msg: &str) {}
    fn warning(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}

/// Forwards messages to `tracing`, tagged with a source name.
#[derive(Debug, Clone)]
pub struct ConsoleLogSink {
    name: String,
}

impl ConsoleLogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl LogSink for ConsoleLogSink {
    fn debug(&self, msg: &str) {
        tracing::debug!(source = %self.name, "{}", msg);
    }

    fn info(&self, msg: &str) {
        tracing::info!(source = %self.name, "{}", msg);
    }

    fn warning(&self, msg: &str) {
        tracing::warn!(source = %self.name, "{}", msg);
    }

    fn error(&self, msg: &str) {
        tracing::error!(source = %self.name, "{}", msg);
    }
}

/// Appends `<time> - <name> - <LEVEL> - <message>` lines to a file.
///
/// Lines are handed to a background writer thread, so callers on the runtime
/// never block on disk. Dropping the sink flushes what is still queued.
pub struct FileLogSink {
    name: String,
    writer: Mutex<NonBlocking>,
    _guard: WorkerGuard,
}

impl FileLogSink {
    pub fn open(name: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        let (writer, guard) = NonBlockingBuilder::default().lossy(false).finish(file);
        Ok(Self {
            name: name.into(),
            writer: Mutex::new(writer),
            _guard: guard,
        })
    }

    fn write(&self, level: &str, msg: &str) {
        let line = format!(
            "{} - {} - {} - {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S,%3f"),
            self.name,
            level,
            msg
        );
        if let Err(e) = self.writer.lock().write_all(line.as_bytes()) {
            tracing::warn!("Could not write to log '{}': {}", self.name, e);
        }
    }
}

impl LogSink for FileLogSink {
    fn debug(&self, msg: &str) {
        self.write("DEBUG", msg);
    }

    fn info(&self, msg: &str) {
        self.write("INFO", msg);
    }

    fn warning(&self, msg: &str) {
        self.write("WARNING", msg);
    }

    fn error(&self, msg: &str) {
        self.write("ERROR", msg);
    }
}

/// Log of a single video.
///
/// Forwards to an inner sink and keeps the error lines so they can be
/// reported with the video's result. A new instance is made for every video,
/// so errors never leak from one video to the next.
pub struct ItemLog {
    inner: Box<dyn LogSink>,
    errors: Mutex<Vec<String>>,
}

impl ItemLog {
    pub fn new(inner: Box<dyn LogSink>) -> Self {
        Self {
            inner,
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn muted() -> Self {
        Self::new(Box::new(MutedLogSink))
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().clone()
    }

    pub fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut *self.errors.lock())
    }
}

impl LogSink for ItemLog {
    fn debug(&self, msg: &str) {
        self.inner.debug(msg);
    }

    fn info(&self, msg: &str) {
        self.inner.info(msg);
    }

    fn warning(&self, msg: &str) {
        self.inner.warning(msg);
    }

    fn error(&self, msg: &str) {
        self.inner.error(msg);
        self.errors.lock().push(msg.to_string());
    }
}

/// Installs the global subscriber.
///
/// Everything goes to `<log_dir>/<run_stamp>.log`. Daemon mode also logs to
/// stderr; interactive mode leaves the terminal to the progress bars.
pub fn init_tracing(
    log_dir: &Path,
    run_stamp: i64,
    daemon: bool,
    verbose: bool,
) -> Result<WorkerGuard> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let appender = tracing_appender::rolling::never(log_dir, format!("{}.log", run_stamp));
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let console_layer = daemon.then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_item_logs_are_isolated() {
        let first = ItemLog::muted();
        let second = ItemLog::muted();

        first.error("ERROR: first failure");
        first.warning("WARNING: not captured");
        second.error("ERROR: second failure");

        assert_eq!(first.errors(), vec!["ERROR: first failure"]);
        assert_eq!(second.take_errors(), vec!["ERROR: second failure"]);
        assert!(second.errors().is_empty());
    }

    #[test]
    fn test_file_sink_writes_formatted_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("item.log");

        let sink = FileLogSink::open("abc123", &path).unwrap();
        sink.info("starting");
        sink.error("boom");
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - abc123 - INFO - starting"));
        assert!(lines[1].ends_with(" - abc123 - ERROR - boom"));
    }

    #[test]
    fn test_file_sink_keeps_every_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("busy.log");

        let sink = FileLogSink::open("busy", &path).unwrap();
        for i in 0..2000 {
            sink.debug(&format!("[download] line {}", i));
        }
        drop(sink);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2000);
        assert!(content.lines().last().unwrap().ends_with("[download] line 1999"));
    }

    #[test]
    fn test_item_log_forwards_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("item.log");

        let log = ItemLog::new(Box::new(FileLogSink::open("vid", &path).unwrap()));
        log.debug("[youtube] extracting");
        log.error("ERROR: unavailable");
        drop(log);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("DEBUG - [youtube] extracting"));
        assert!(content.contains("ERROR - ERROR: unavailable"));
    }
}
