use anyhow::{Context, Result};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::{
    collections::VecDeque,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use time::{macros::format_description, OffsetDateTime};

pub const LOG_FILE: &str = "refprofile.log";
const LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub level: Level,
    pub message: String,
}

/// Most recent log lines, shared with the log panel.
#[derive(Clone, Default)]
pub struct LogBuffer {
    entries: Arc<Mutex<VecDeque<LogEntry>>>,
}

impl LogBuffer {
    pub fn push(&self, level: Level, message: String) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        entries.push_back(LogEntry { level, message });
        while entries.len() > LOG_CAPACITY {
            entries.pop_front();
        }
    }

    pub fn tail(&self, count: usize) -> Vec<LogEntry> {
        let Ok(entries) = self.entries.lock() else {
            return Vec::new();
        };
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }
}

struct AppLogger {
    path: PathBuf,
    buffer: LogBuffer,
    level: LevelFilter,
    echo: Option<LevelFilter>,
}

impl Log for AppLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with(env!("CARGO_CRATE_NAME"))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        let _ = append_log_file(&self.path, record.level(), &message);
        if self.echo.is_some_and(|echo| record.level() <= echo) {
            eprintln!("[{}] {message}", level_label(record.level()));
        }
        self.buffer.push(record.level(), message);
    }

    fn flush(&self) {}
}

/// Installs the process logger. Lines go to `LOG_FILE` in `data_dir` and to
/// the returned buffer; `echo` also mirrors them to stderr.
pub fn init(data_dir: &Path, level: LevelFilter, echo: Option<LevelFilter>) -> Result<LogBuffer> {
    fs::create_dir_all(data_dir).context("create log dir")?;
    let buffer = LogBuffer::default();
    let logger = AppLogger {
        path: data_dir.join(LOG_FILE),
        buffer: buffer.clone(),
        level,
        echo,
    };
    log::set_boxed_logger(Box::new(logger))
        .map_err(|err| anyhow::anyhow!("install logger: {err}"))?;
    log::set_max_level(level);
    Ok(buffer)
}

pub fn level_label(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

fn append_log_file(path: &Path, level: Level, message: &str) -> std::io::Result<()> {
    let stamp = OffsetDateTime::now_utc()
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_default();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{stamp} [{}] {message}", level_label(level))
}
