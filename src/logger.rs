//! A `log::Log` sink that writes timestamped lines to a file and rotates it
//! to an `old_<name>` companion once it grows past ~5 MiB.
//!
//! This is the same rotation policy the coordinator's original sources
//! hand-rolled around a global `FILE*`, expressed as a reusable sink
//! instead of a process-wide singleton.

use std::fs::{File, OpenOptions, rename};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use parking_lot::Mutex;

const ROTATE_AT_BYTES: u64 = 5 * 1024 * 1024;

struct Inner {
    path: PathBuf,
    file: File,
    written: u64,
}

pub struct FileLogger {
    level: log::LevelFilter,
    inner: Mutex<Inner>,
}

impl FileLogger {
    pub fn open(path: impl AsRef<Path>, level: log::LevelFilter) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            level,
            inner: Mutex::new(Inner {
                path,
                file,
                written,
            }),
        })
    }

    /// Install this logger as the global `log` facade sink.
    pub fn install(self) -> Result<()> {
        let level = self.level;
        log::set_boxed_logger(Box::new(self))
            .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Inner {
    fn rotate_if_needed(&mut self) -> std::io::Result<()> {
        if self.written < ROTATE_AT_BYTES {
            return Ok(());
        }

        let rotated = self
            .path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!(
                "old_{}",
                self.path.file_name().and_then(|n| n.to_str()).unwrap_or("rendezvous.log")
            ));

        self.file.flush()?;
        rename(&self.path, &rotated)?;
        self.file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.written = 0;

        Ok(())
    }

    fn write_line(&mut self, line: &str) {
        if self.rotate_if_needed().is_err() {
            return;
        }

        if self.file.write_all(line.as_bytes()).is_ok() {
            self.written += line.len() as u64;
            let _ = self.file.flush();
        }
    }
}

impl log::Log for FileLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let line = format!(
            "{timestamp} {} [{}] {}\n",
            record.level(),
            record.target(),
            record.args(),
        );

        self.inner.lock().write_line(&line);
    }

    fn flush(&self) {
        let _ = self.inner.lock().file.flush();
    }
}
