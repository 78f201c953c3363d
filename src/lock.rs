//! Process Lock
//!
//! OS-level exclusive advisory lock on the `LOCK` file. This is what keeps a
//! second process (or a second `Storage` in this process) from opening the
//! same directory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Result, StorageError};

/// Name of the lock file inside the storage directory
pub const LOCK_FILE: &str = "LOCK";

/// Held exclusive lock on `{dir}/LOCK`
///
/// The lock is released by `release()` or, failing that, when the handle is
/// dropped and the file descriptor is closed.
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Take the lock without blocking
    ///
    /// Fails with `AlreadyLocked` if anyone else holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::io("open lock", &path, e))?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => Ok(Self { file, path }),
            Err(e) if is_contended(&e) => Err(StorageError::AlreadyLocked { path }),
            Err(e) => Err(StorageError::io("lock", &path, e)),
        }
    }

    /// Path of the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock; consuming `self` makes a double release impossible
    pub fn release(self) -> Result<()> {
        FileExt::unlock(&self.file).map_err(|e| StorageError::io("unlock", &self.path, e))
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
