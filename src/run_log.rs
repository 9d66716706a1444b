//! Per-run log context. Lines are written to `log.txt` in the working directory so that
//! [`crate::diagnostics`] can turn them into the scheduler's diag file, and are mirrored to
//! `tracing` for the console.
use chrono::Local;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const LOG_FILE_NAME: &str = "log.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    /// Numeric level used in the diag document.
    pub fn code(self) -> u8 {
        match self {
            Severity::Error => 1,
            Severity::Warning => 2,
            Severity::Info => 3,
            Severity::Debug => 4,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Some(Severity::Error),
            "WARN" | "WARNING" => Some(Severity::Warning),
            "INFO" => Some(Severity::Info),
            "DEBUG" => Some(Severity::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
            Severity::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

pub struct RunLog {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    threshold: Severity,
    #[cfg(test)]
    lines: Vec<String>,
}

impl RunLog {
    /// Creates (or truncates) `log.txt` in `work_dir`.
    pub fn create(work_dir: &Path, threshold: Severity) -> io::Result<Self> {
        let path = work_dir.join(LOG_FILE_NAME);
        let file = File::create(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            threshold,
            #[cfg(test)]
            lines: vec![],
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines emitted so far, in order.
    #[cfg(test)]
    pub(crate) fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.emit(Severity::Error, message.as_ref());
    }

    pub fn warning(&mut self, message: impl AsRef<str>) {
        self.emit(Severity::Warning, message.as_ref());
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.emit(Severity::Info, message.as_ref());
    }

    pub fn debug(&mut self, message: impl AsRef<str>) {
        self.emit(Severity::Debug, message.as_ref());
    }

    pub fn emit(&mut self, severity: Severity, message: &str) {
        match severity {
            Severity::Error => tracing::error!("{message}"),
            Severity::Warning => tracing::warn!("{message}"),
            Severity::Info => tracing::info!("{message}"),
            Severity::Debug => tracing::debug!("{message}"),
        }
        if severity > self.threshold {
            return;
        }

        // Single line per event keeps the diag conversion line-oriented
        let message = message.replace(['\r', '\n'], " ");
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S,%3f");
        let line = format!("{timestamp} - log - {severity} - {message}");

        if let Some(writer) = self.writer.as_mut() {
            if let Err(e) = writeln!(writer, "{line}") {
                tracing::warn!("Unable to write to {:?}: {}", self.path, e);
            }
        }
        #[cfg(test)]
        self.lines.push(line);
    }

    /// Flushes and closes the log file. Later events still reach `tracing` but not the file.
    pub fn close(&mut self) -> io::Result<()> {
        match self.writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
