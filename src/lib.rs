//! # atlas-storage
//!
//! File-system storage layer for an LSM-tree engine:
//! - Canonical names for journal, table and manifest files
//! - Exclusive process lock on the data directory
//! - Double-open protection for file handles
//! - Atomic publication of the current manifest (`CURRENT`)
//! - Timestamped diagnostic `LOG` for secondary failures
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Engine (external)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Storage                                │
//! │              (one mutex over all bookkeeping)                │
//! └───┬──────────────┬──────────────┬──────────────┬────────────┘
//!     │              │              │              │
//!     ▼              ▼              ▼              ▼
//! ┌─────────┐  ┌───────────┐  ┌───────────┐  ┌───────────────┐
//! │ naming  │  │   lock    │  │   diag    │  │   manifest    │
//! │ (codec) │  │  (LOCK)   │  │   (LOG)   │  │  (CURRENT)    │
//! └─────────┘  └───────────┘  └───────────┘  └───────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::io::Write;
//! use atlas_storage::{FileDescriptor, FileKindMask, Storage};
//!
//! let storage = Storage::open("./db")?;
//! let table = FileDescriptor::table(1);
//!
//! let mut writer = storage.create_file(&table)?;
//! writer.write_all(b"payload")?;
//! writer.close()?;
//!
//! assert_eq!(storage.list_files(FileKindMask::TABLE)?, vec![table]);
//! storage.close()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod naming;
pub mod lock;
pub mod diag;
pub mod manifest;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{StorageError, Result};
pub use config::Config;
pub use naming::{FileDescriptor, FileKind, FileKindMask};
pub use storage::{FileReader, FileWriter, Storage, StorageLock};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of atlas-storage
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
