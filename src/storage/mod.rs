//! Storage Module
//!
//! File-system storage for one engine directory.
//!
//! ## Responsibilities
//! - Hold the process `LOCK` for the lifetime of the instance
//! - Create, open and remove journal/table/manifest files
//! - Track open handles so a file cannot be opened twice
//! - Publish and read the `CURRENT` manifest pointer
//! - Record secondary failures in the diagnostic `LOG`
//!
//! ## Concurrency
//! All bookkeeping (`open_files`, logical lock slot, log buffer, closed
//! flag) sits behind one mutex held for the full duration of each public
//! operation. Reads and writes on distinct handles do not take it.

mod handle;

pub use handle::{FileReader, FileWriter};

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::diag::DiagnosticLog;
use crate::error::{Result, StorageError};
use crate::lock::ProcessLock;
use crate::manifest::{self, ManifestPointer};
use crate::naming::{self, FileDescriptor, FileKind, FileKindMask};

/// Mutable state guarded by `Shared::state`
struct State {
    /// Set once by `close()` (or drop); never cleared
    closed: bool,
    /// Descriptors with a live handle; its length is the open count
    open_files: HashSet<FileDescriptor>,
    /// Token of the outstanding logical lock, if any
    logical_lock: Option<u64>,
    next_lock_token: u64,
    /// Handles dropped without `close()`
    leaked: usize,
    log: Option<DiagnosticLog>,
    process_lock: Option<ProcessLock>,
}

impl State {
    /// Record a warning in LOG and in tracing
    fn warn(&mut self, message: &str) {
        tracing::warn!("{}", message);
        if let Some(log) = self.log.as_mut() {
            log.write(message);
        }
    }
}

/// Shared between `Storage`, its handles, and its logical lock
struct Shared {
    path: PathBuf,
    manifest: ManifestPointer,
    state: Mutex<State>,
}

/// An opened storage directory
///
/// Must be shut down with `close()`. Dropping it without closing is logged
/// as a leak.
pub struct Storage {
    shared: Arc<Shared>,
}

impl Storage {
    /// Open storage at `path` with the default config
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(Config::with_dir(path.as_ref()))
    }

    /// Open storage with an explicit config
    ///
    /// On open:
    /// 1. Create the directory (if configured)
    /// 2. Take the process lock on `LOCK`
    /// 3. Rotate `LOG` to `LOG.old` and open a fresh `LOG`
    ///
    /// The process lock is released again if step 3 fails.
    pub fn open_with(config: Config) -> Result<Self> {
        config.validate()?;
        let dir = &config.data_dir;

        if config.create_if_missing {
            fs::create_dir_all(dir).map_err(|e| StorageError::io("create dir", dir, e))?;
        } else if !dir.is_dir() {
            let e = io::Error::new(io::ErrorKind::NotFound, "storage directory does not exist");
            return Err(StorageError::io("open dir", dir, e));
        }
        let path = dir
            .canonicalize()
            .map_err(|e| StorageError::io("canonicalize", dir, e))?;

        let process_lock = ProcessLock::acquire(&path)?;

        let log = match DiagnosticLog::open(&path, config.rotate_log) {
            Ok(log) => log,
            Err(e) => {
                if let Err(release_err) = process_lock.release() {
                    tracing::warn!("release lock after failed open: {}", release_err);
                }
                return Err(e);
            }
        };

        tracing::info!("Opened storage at {}", path.display());

        Ok(Self {
            shared: Arc::new(Shared {
                manifest: ManifestPointer::new(&path, config.sync_manifest),
                path,
                state: Mutex::new(State {
                    closed: false,
                    open_files: HashSet::new(),
                    logical_lock: None,
                    next_lock_token: 0,
                    leaked: 0,
                    log: Some(log),
                    process_lock: Some(process_lock),
                }),
            }),
        })
    }

    // =========================================================================
    // Logical Lock
    // =========================================================================

    /// Take the in-process storage lock
    ///
    /// Only one `StorageLock` may be outstanding per instance; a second call
    /// fails with `Locked` until the first is released.
    pub fn lock(&self) -> Result<StorageLock> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        if state.logical_lock.is_some() {
            return Err(StorageError::Locked);
        }

        let token = state.next_lock_token;
        state.next_lock_token += 1;
        state.logical_lock = Some(token);

        Ok(StorageLock {
            shared: Arc::clone(&self.shared),
            token,
        })
    }

    // =========================================================================
    // Directory Operations
    // =========================================================================

    /// List files whose kind is in `mask`, in directory order
    ///
    /// Names the codec does not recognize are skipped. Unpadded names are
    /// accepted too, so `1.sst` and `000001.sst` both list as table 1;
    /// `remove_file` and `open_file` only touch the canonical name.
    pub fn list_files(&self, mask: impl Into<FileKindMask>) -> Result<Vec<FileDescriptor>> {
        let mask = mask.into();
        let state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }

        let dir = &self.shared.path;
        let entries = fs::read_dir(dir).map_err(|e| StorageError::io("read dir", dir, e))?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StorageError::io("read dir", dir, e))?;
            let name = entry.file_name();
            let Some(fd) = name.to_str().and_then(naming::decode) else {
                continue;
            };
            if mask.contains(fd.kind) {
                files.push(fd);
            }
        }
        Ok(files)
    }

    /// Read the manifest named by `CURRENT`
    pub fn get_manifest(&self) -> Result<FileDescriptor> {
        let state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        self.shared.manifest.read()
    }

    /// Publish `fd` as the current manifest
    ///
    /// Writes `CURRENT.<seq>` then renames it over `CURRENT`. If either step
    /// fails the error is logged, the temp file is removed, and the error
    /// returned. A failed directory fsync after the rename is only logged:
    /// the new manifest is already live.
    pub fn set_manifest(&self, fd: &FileDescriptor) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        manifest::check_manifest(fd)?;

        let pointer = &self.shared.manifest;
        let published = pointer.stage(fd).and_then(|_| pointer.commit(fd));
        if let Err(e) = published {
            state.warn(&format!("CURRENT: {}", e));
            if let Err(cleanup) = pointer.discard(fd.seq) {
                state.warn(&format!("remove CURRENT.{}: {}", fd.seq, cleanup));
            }
            return Err(e);
        }
        if let Err(e) = pointer.sync_dir() {
            state.warn(&format!("CURRENT published, {}", e));
        }

        tracing::debug!("Published {} as current manifest", fd);
        Ok(())
    }

    // =========================================================================
    // File Operations
    // =========================================================================

    /// Open an existing file for reading
    pub fn open_file(&self, fd: &FileDescriptor) -> Result<FileReader> {
        let file = self.acquire(fd, "open", |path| File::open(path))?;
        Ok(FileReader::new(Arc::clone(&self.shared), *fd, file))
    }

    /// Create (or truncate) a file for writing
    pub fn create_file(&self, fd: &FileDescriptor) -> Result<FileWriter> {
        let file = self.acquire(fd, "create", |path| {
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(path)
        })?;
        Ok(FileWriter::new(Arc::clone(&self.shared), *fd, file))
    }

    /// Delete a file that has no live handle
    pub fn remove_file(&self, fd: &FileDescriptor) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        check_encodable(fd)?;
        if state.open_files.contains(fd) {
            return Err(StorageError::StillOpen(*fd));
        }

        let path = fd.path_in(&self.shared.path);
        if let Err(e) = fs::remove_file(&path) {
            state.warn(&format!("remove {}: {}", fd, e));
            return Err(StorageError::io("remove", &path, e));
        }

        tracing::debug!("Removed {}", fd);
        Ok(())
    }

    /// Check state, open the backing file, and mark `fd` as open
    fn acquire<F>(&self, fd: &FileDescriptor, op: &'static str, open: F) -> Result<File>
    where
        F: FnOnce(&Path) -> io::Result<File>,
    {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        check_encodable(fd)?;
        if state.open_files.contains(fd) {
            return Err(StorageError::AlreadyOpen(*fd));
        }

        let path = fd.path_in(&self.shared.path);
        let file = open(&path).map_err(|e| StorageError::io(op, &path, e))?;
        state.open_files.insert(*fd);

        tracing::debug!("{} {} ({} open)", op, fd, state.open_files.len());
        Ok(file)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Append a line to `LOG`; ignored once closed
    pub fn log(&self, message: &str) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }
        if let Some(log) = state.log.as_mut() {
            log.write(message);
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Shut the storage down
    ///
    /// Refused with `FilesStillOpen` while any handle is live. Otherwise
    /// releases the process lock and closes `LOG`; a second call fails with
    /// `Closed`.
    pub fn close(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }

        let open = state.open_files.len();
        if open > 0 {
            state.warn(&format!("refuse to close, {} files still open", open));
            return Err(StorageError::FilesStillOpen(open));
        }

        state.closed = true;
        let log_result = state.log.take().map_or(Ok(()), DiagnosticLog::close);
        let lock_result = state.process_lock.take().map_or(Ok(()), ProcessLock::release);

        tracing::info!("Closed storage at {}", self.shared.path.display());
        lock_result.and(log_result)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Canonical path of the storage directory
    pub fn path(&self) -> &Path {
        &self.shared.path
    }

    /// Number of live file handles
    pub fn open_count(&self) -> usize {
        self.shared.state.lock().open_files.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }

    /// Number of handles dropped without being closed
    pub fn leaked_handles(&self) -> usize {
        self.shared.state.lock().leaked
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if state.closed {
            return;
        }

        let open = state.open_files.len();
        state.warn(&format!("storage dropped without close, {} files still open", open));
        state.closed = true;

        // With handles outstanding the lock goes away with the last handle.
        if open == 0 {
            if let Some(log) = state.log.take() {
                if let Err(e) = log.close() {
                    tracing::warn!("close log on drop: {}", e);
                }
            }
            if let Some(lock) = state.process_lock.take() {
                if let Err(e) = lock.release() {
                    tracing::warn!("release lock on drop: {}", e);
                }
            }
        }
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}

fn check_encodable(fd: &FileDescriptor) -> Result<()> {
    if fd.kind == FileKind::Other {
        return Err(StorageError::InvalidKind(fd.kind));
    }
    Ok(())
}

// =============================================================================
// Logical Lock
// =============================================================================

/// Logical lock on a `Storage`, released on `release()` or drop
///
/// Distinct from the process `LOCK`: this serializes the engine's own
/// top-level operations within one process.
#[must_use = "the storage lock is released when dropped"]
pub struct StorageLock {
    shared: Arc<Shared>,
    token: u64,
}

impl StorageLock {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for StorageLock {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        if state.logical_lock == Some(self.token) {
            state.logical_lock = None;
        }
    }
}

impl std::fmt::Debug for StorageLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageLock").field("token", &self.token).finish()
    }
}
