//! Diagnostic Log
//!
//! Append-only `LOG` file inside the storage directory. Each line is
//! prefixed with a local timestamp:
//!
//! ```text
//! 2024/03/05 07:08:09.012345 remove 000004.sst: No such file or directory
//! ```
//!
//! Writes never fail the caller: a line that cannot be written is lost.

use std::fmt::{Display, Write as _};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};

use crate::error::{Result, StorageError};

/// Current diagnostic log
pub const LOG_FILE: &str = "LOG";

/// Log from the previous session
pub const OLD_LOG_FILE: &str = "LOG.old";

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.6f";

/// Timestamp-prefixed line writer
///
/// Not synchronized on its own; `Storage` only calls it with its mutex held.
pub struct DiagnosticLog {
    file: File,
    path: PathBuf,
    /// Reused for every line
    buf: String,
}

impl DiagnosticLog {
    /// Open a fresh `LOG` in `dir`
    ///
    /// With `rotate`, an existing `LOG` is first renamed to `LOG.old`; a
    /// failed rename is ignored.
    pub fn open(dir: &Path, rotate: bool) -> Result<Self> {
        let path = dir.join(LOG_FILE);
        if rotate {
            let _ = fs::rename(&path, dir.join(OLD_LOG_FILE));
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StorageError::io("open log", &path, e))?;

        Ok(Self {
            file,
            path,
            buf: String::with_capacity(128),
        })
    }

    /// Append one line stamped with the current local time
    pub fn write(&mut self, message: &str) {
        self.write_at(&Local::now(), message);
    }

    /// Append one line stamped with `time`
    pub fn write_at<Tz>(&mut self, time: &DateTime<Tz>, message: &str)
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.buf.clear();
        let _ = writeln!(self.buf, "{} {}", time.format(TIMESTAMP_FORMAT), message);
        let _ = self.file.write_all(self.buf.as_bytes());
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush the log to disk and close it
    pub fn close(self) -> Result<()> {
        self.file
            .sync_all()
            .map_err(|e| StorageError::io("close log", &self.path, e))
    }
}
