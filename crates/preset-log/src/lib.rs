//! File-backed logging for experiment runs
//!
//! A [`FileLogger`] writes timestamped, module-tagged lines to one log file.
//! Handles are cheap: [`FileLogger::with_module`] clones share the sink, and
//! a mutex around it serializes concurrent writers (parallel trials sharing
//! one log), so lines from different callers never interleave.
//!
//! The logger also implements [`preset_core::ConfigLogger`], so it can be
//! injected as the configuration value logger.

use chrono::Local;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Result type for preset-log operations
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warning => "WARNING",
            Level::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// A logger writing `[timestamp][LEVEL][module]` framed lines to a shared
/// file sink.
#[derive(Clone)]
pub struct FileLogger {
    sink: Arc<Mutex<File>>,
    module: String,
}

impl FileLogger {
    /// Opens `<dir>/<file_name>.log` for logging, creating the directory as
    /// needed. With `replace` the file is truncated; otherwise new lines are
    /// appended after a separator marking the new session.
    pub fn create(dir: &Path, file_name: &str, replace: bool) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{file_name}.log"));
        let file = if replace {
            OpenOptions::new().write(true).create(true).truncate(true).open(&path)?
        } else {
            OpenOptions::new().append(true).create(true).open(&path)?
        };
        let logger = Self {
            sink: Arc::new(Mutex::new(file)),
            module: "general".to_string(),
        };
        if !replace {
            logger.log(&"-".repeat(50));
        }
        Ok(logger)
    }

    /// A handle sharing this logger's sink under a different module name.
    pub fn with_module(&self, module: impl Into<String>) -> Self {
        Self {
            sink: self.sink.clone(),
            module: module.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Logs at [`Level::Info`].
    pub fn log(&self, message: &str) {
        self.log_at(Level::Info, message);
    }

    /// Writes one framed line. Failures are swallowed: logging is expected
    /// not to fail and must never disturb the caller.
    pub fn log_at(&self, level: Level, message: &str) {
        let line = format!(
            "[{}][{}][{}] {}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level,
            self.module,
            message
        );
        if let Ok(mut sink) = self.sink.lock() {
            let _ = sink.write_all(line.as_bytes());
            let _ = sink.flush();
        }
    }
}

impl preset_core::ConfigLogger for FileLogger {
    fn log(&self, message: &str) {
        FileLogger::log(self, message);
    }
}

impl fmt::Debug for FileLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileLogger")
            .field("module", &self.module)
            .finish_non_exhaustive()
    }
}
