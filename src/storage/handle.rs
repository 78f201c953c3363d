//! File Handles
//!
//! `FileReader` / `FileWriter` wrap an open `std::fs::File` and hold the
//! descriptor's slot in the owning storage's open set until closed.
//!
//! ## Lifecycle
//! - `close()` frees the slot; a second `close()` fails with `Closed`
//! - Dropping an unclosed handle also frees the slot, but is counted and
//!   logged as a leak

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use crate::error::{Result, StorageError};
use crate::naming::FileDescriptor;

use super::Shared;

/// Bookkeeping common to readers and writers
struct HandleSlot {
    shared: Arc<Shared>,
    fd: FileDescriptor,
    /// `None` once closed
    file: Option<File>,
}

impl HandleSlot {
    fn file(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other(format!("{} handle already closed", self.fd)))
    }

    fn file_ref(&self) -> io::Result<&File> {
        self.file
            .as_ref()
            .ok_or_else(|| io::Error::other(format!("{} handle already closed", self.fd)))
    }

    /// Free the slot; `sync` surfaces pending write errors before the file is dropped
    fn close(&mut self, sync: bool) -> Result<()> {
        let mut state = self.shared.state.lock();
        let file = self.file.take().ok_or(StorageError::Closed)?;
        state.open_files.remove(&self.fd);

        let result = if sync { file.sync_all() } else { Ok(()) };
        drop(file);

        if let Err(e) = result {
            state.warn(&format!("close {}: {}", self.fd, e));
            return Err(StorageError::io("close", self.fd.path_in(&self.shared.path), e));
        }

        tracing::debug!("close {} ({} open)", self.fd, state.open_files.len());
        Ok(())
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        if self.file.is_none() {
            return;
        }
        let mut state = self.shared.state.lock();
        state.open_files.remove(&self.fd);
        state.leaked += 1;
        state.warn(&format!("leaked {} handle: dropped without close", self.fd));
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Read-only handle returned by `Storage::open_file`
pub struct FileReader {
    slot: HandleSlot,
}

impl FileReader {
    pub(super) fn new(shared: Arc<Shared>, fd: FileDescriptor, file: File) -> Self {
        Self {
            slot: HandleSlot {
                shared,
                fd,
                file: Some(file),
            },
        }
    }

    pub fn descriptor(&self) -> FileDescriptor {
        self.slot.fd
    }

    /// Size of the file in bytes
    pub fn len(&self) -> Result<u64> {
        let file = self.slot.file_ref().map_err(|e| self.io_error("stat", e))?;
        let meta = file.metadata().map_err(|e| self.io_error("stat", e))?;
        Ok(meta.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read at `offset` without relying on the cursor
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        positioned_read(self.slot.file_ref()?, buf, offset)
    }

    /// Fill `buf` completely from `offset`
    pub fn read_exact_at(&self, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        while !buf.is_empty() {
            match self.read_at(buf, offset) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "failed to fill whole buffer",
                    ))
                }
                Ok(n) => {
                    let rest = buf;
                    buf = &mut rest[n..];
                    offset += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Close the handle and free its slot
    pub fn close(&mut self) -> Result<()> {
        self.slot.close(false)
    }

    fn io_error(&self, op: &'static str, e: io::Error) -> StorageError {
        StorageError::io(op, self.slot.fd.path_in(&self.slot.shared.path), e)
    }
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.slot.file()?.read(buf)
    }
}

impl Seek for FileReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.slot.file()?.seek(pos)
    }
}

impl std::fmt::Debug for FileReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileReader")
            .field("fd", &self.slot.fd)
            .field("closed", &self.slot.file.is_none())
            .finish()
    }
}

// =============================================================================
// Writer
// =============================================================================

/// Write handle returned by `Storage::create_file`
pub struct FileWriter {
    slot: HandleSlot,
}

impl FileWriter {
    pub(super) fn new(shared: Arc<Shared>, fd: FileDescriptor, file: File) -> Self {
        Self {
            slot: HandleSlot {
                shared,
                fd,
                file: Some(file),
            },
        }
    }

    pub fn descriptor(&self) -> FileDescriptor {
        self.slot.fd
    }

    /// fsync data and metadata
    pub fn sync(&mut self) -> Result<()> {
        let fd = self.slot.fd;
        let path = fd.path_in(&self.slot.shared.path);
        let file = self.slot.file().map_err(|e| StorageError::io("sync", &path, e))?;
        file.sync_all().map_err(|e| StorageError::io("sync", &path, e))
    }

    /// Sync, close the handle and free its slot
    ///
    /// The slot is freed even when the final sync fails.
    pub fn close(&mut self) -> Result<()> {
        self.slot.close(true)
    }
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.slot.file()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.slot.file()?.flush()
    }
}

impl Seek for FileWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.slot.file()?.seek(pos)
    }
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("fd", &self.slot.fd)
            .field("closed", &self.slot.file.is_none())
            .finish()
    }
}

#[cfg(unix)]
fn positioned_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(windows)]
fn positioned_read(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}
