//! Configuration for atlas-storage
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StorageError};

/// Configuration for a storage directory
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Directory Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all storage files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── LOCK             (process lock)
    ///     ├── LOG, LOG.old     (diagnostic log)
    ///     ├── CURRENT          (manifest pointer)
    ///     ├── MANIFEST-000001
    ///     ├── 000002.log       (journal)
    ///     └── 000003.sst       (table)
    pub data_dir: PathBuf,

    /// Create the directory tree on open if it does not exist
    pub create_if_missing: bool,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// fsync the CURRENT.<N> temp file before renaming it over CURRENT,
    /// then fsync the directory
    pub sync_manifest: bool,

    // -------------------------------------------------------------------------
    // Diagnostic Log Configuration
    // -------------------------------------------------------------------------
    /// Keep the previous LOG as LOG.old on open (otherwise it is truncated)
    pub rotate_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./atlas_data"),
            create_if_missing: true,
            sync_manifest: true,
            rotate_log: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Default config rooted at `path`
    pub fn with_dir(path: impl Into<PathBuf>) -> Self {
        Self::builder().data_dir(path).build()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(StorageError::Config("data_dir must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Create the directory if missing (default: true)
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// fsync when publishing a manifest (default: true)
    pub fn sync_manifest(mut self, sync: bool) -> Self {
        self.config.sync_manifest = sync;
        self
    }

    /// Rotate LOG to LOG.old on open (default: true)
    pub fn rotate_log(mut self, rotate: bool) -> Self {
        self.config.rotate_log = rotate;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
