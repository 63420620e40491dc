use chrono::Local;
use log::{Level, Metadata, Record, SetLoggerError};
use once_cell::sync::OnceCell;
use std::fs::{OpenOptions, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
struct FileLogger {
    log_path: PathBuf,
    level: Level,
}

static LOGGER: OnceCell<FileLogger> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Could not create log path: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logger already set")]
    AlreadySet,

    #[error("Failed to install logger: {0}")]
    SetLogger(#[from] SetLoggerError),
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let log_entry = format!(
                "{} {} - {}\n",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );

            if let Ok(mut file) = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
            {
                let _ = file.write_all(log_entry.as_bytes());
            }
        }
    }

    fn flush(&self) {}
}

/// Installs the file logger writing to `{log_dir}/log.txt`.
pub fn init(log_dir: &Path, level: Level) -> Result<(), LoggingError> {
    create_dir_all(log_dir)?;

    LOGGER
        .set(FileLogger {
            log_path: log_dir.join("log.txt"),
            level,
        })
        .map_err(|_| LoggingError::AlreadySet)?;

    let logger = LOGGER.get().ok_or(LoggingError::AlreadySet)?;
    log::set_logger(logger)?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}
