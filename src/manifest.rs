//! Manifest Pointer
//!
//! `CURRENT` names the active manifest. It holds exactly one line:
//!
//! ```text
//! MANIFEST-000005\n
//! ```
//!
//! ## Publish Protocol
//! 1. Write the new line to `CURRENT.<seq>` (truncating any leftover)
//! 2. Optionally fsync the temp file
//! 3. Rename `CURRENT.<seq>` over `CURRENT`
//! 4. Optionally fsync the directory
//!
//! Only `Storage::set_manifest` drives steps 1-4, under the storage mutex.
//!
//! A crash before step 3 leaves the old `CURRENT` intact; rename is atomic,
//! so readers see either the old name or the new one.
//!
//! Validation is limited to the trailing newline and the name decoding to a
//! manifest; there is no checksum.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, StorageError};
use crate::naming::{self, FileDescriptor, FileKind};

/// Name of the pointer file
pub const CURRENT_FILE: &str = "CURRENT";

/// Reads and publishes `{dir}/CURRENT`
#[derive(Debug, Clone)]
pub struct ManifestPointer {
    dir: PathBuf,
    sync: bool,
}

impl ManifestPointer {
    pub fn new(dir: impl Into<PathBuf>, sync: bool) -> Self {
        Self {
            dir: dir.into(),
            sync,
        }
    }

    /// Path of `CURRENT`
    pub fn path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    /// Path of the temp file used while publishing manifest `seq`
    pub fn temp_path(&self, seq: u64) -> PathBuf {
        self.dir.join(format!("{}.{}", CURRENT_FILE, seq))
    }

    /// Read the currently published manifest
    pub fn read(&self) -> Result<FileDescriptor> {
        let path = self.path();
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StorageError::NotFound),
            Err(e) => return Err(StorageError::io("read", &path, e)),
        };
        parse_pointer(&bytes)
    }

    /// Write the pointer line for `fd` to its temp file
    ///
    /// Returns the temp file path. `CURRENT` is untouched until `commit()`.
    pub(crate) fn stage(&self, fd: &FileDescriptor) -> Result<PathBuf> {
        check_manifest(fd)?;

        let path = self.temp_path(fd.seq);
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| StorageError::io("create", &path, e))?;

        writeln!(file, "{}", fd.file_name()).map_err(|e| StorageError::io("write", &path, e))?;
        if self.sync {
            file.sync_all()
                .map_err(|e| StorageError::io("sync", &path, e))?;
        }
        Ok(path)
    }

    /// Atomically rename the staged temp file for `fd` over `CURRENT`
    ///
    /// Once this returns Ok the new manifest is live; `sync_dir()` only
    /// makes the rename durable.
    pub(crate) fn commit(&self, fd: &FileDescriptor) -> Result<()> {
        check_manifest(fd)?;

        let temp = self.temp_path(fd.seq);
        fs::rename(&temp, self.path()).map_err(|e| StorageError::io("rename", &temp, e))
    }

    /// fsync the directory after a commit, if configured
    pub(crate) fn sync_dir(&self) -> Result<()> {
        if !self.sync {
            return Ok(());
        }
        sync_dir(&self.dir).map_err(|e| StorageError::io("sync dir", &self.dir, e))
    }

    /// Remove a leftover temp file for manifest `seq`
    pub(crate) fn discard(&self, seq: u64) -> Result<()> {
        let temp = self.temp_path(seq);
        match fs::remove_file(&temp) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io("remove", &temp, e)),
        }
    }
}

pub(crate) fn check_manifest(fd: &FileDescriptor) -> Result<()> {
    if fd.kind != FileKind::Manifest {
        return Err(StorageError::InvalidKind(fd.kind));
    }
    Ok(())
}

/// Parse the raw contents of `CURRENT`
fn parse_pointer(bytes: &[u8]) -> Result<FileDescriptor> {
    let line = bytes
        .strip_suffix(b"\n")
        .ok_or_else(|| StorageError::Corrupt("missing trailing newline".to_string()))?;
    let name = std::str::from_utf8(line)
        .map_err(|_| StorageError::Corrupt("name is not valid UTF-8".to_string()))?;

    match naming::decode(name) {
        Some(fd) if fd.kind == FileKind::Manifest => Ok(fd),
        Some(fd) => Err(StorageError::Corrupt(format!("{} is a {}, not a manifest", name, fd.kind))),
        None => Err(StorageError::Corrupt(format!("unrecognized file name {:?}", name))),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

// Directories cannot be opened for fsync here; the rename is still atomic.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}
