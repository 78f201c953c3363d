//! Error types for atlas-storage
//!
//! Provides a unified error type for all storage operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::naming::{FileDescriptor, FileKind};

/// Result type alias using StorageError
pub type Result<T> = std::result::Result<T, StorageError>;

/// Unified error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error during {op} on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("storage closed")]
    Closed,

    #[error("cannot close, {0} files still open")]
    FilesStillOpen(usize),

    // -------------------------------------------------------------------------
    // Lock Errors
    // -------------------------------------------------------------------------
    /// The LOCK file is held by another process (or another Storage instance)
    #[error("storage directory {} is already locked", path.display())]
    AlreadyLocked { path: PathBuf },

    /// The in-process logical lock is already held
    #[error("storage lock already held")]
    Locked,

    // -------------------------------------------------------------------------
    // File Handle Errors
    // -------------------------------------------------------------------------
    #[error("file {0} already open")]
    AlreadyOpen(FileDescriptor),

    #[error("file {0} still open")]
    StillOpen(FileDescriptor),

    /// Descriptor kind not valid for the operation (e.g. publishing a table)
    #[error("invalid file kind {0} for this operation")]
    InvalidKind(FileKind),

    // -------------------------------------------------------------------------
    // Manifest Pointer Errors
    // -------------------------------------------------------------------------
    #[error("invalid CURRENT file: {0}")]
    Corrupt(String),

    #[error("CURRENT file not found")]
    NotFound,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StorageError {
    /// Tag an I/O error with the failing operation and path
    pub fn io(op: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        StorageError::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Returns the underlying `io::ErrorKind` for I/O failures
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            StorageError::Io { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}
