//! Tests for Storage
//!
//! These tests verify:
//! - Opening/creating storage directories
//! - Directory listing by kind mask
//! - Shutdown rules (files still open, double close)
//! - Operations after shutdown
//! - Dropping without close
//! - Config defaults
//! - Concurrent use from several threads

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::sync::Arc;
use std::thread;

use atlas_storage::{Config, FileDescriptor, FileKind, FileKindMask, Storage, StorageError};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("atlas_storage=debug"))
        .with_test_writer()
        .try_init();
}

fn setup_temp_storage() -> (TempDir, Storage) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let storage = Storage::open(temp_dir.path()).unwrap();
    (temp_dir, storage)
}

fn touch(storage: &Storage, fd: &FileDescriptor) {
    let mut writer = storage.create_file(fd).unwrap();
    writer.close().unwrap();
}

fn sorted(mut files: Vec<FileDescriptor>) -> Vec<FileDescriptor> {
    files.sort_by_key(|fd| (fd.seq, fd.kind as u8));
    files
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_directory() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("db");

    assert!(!path.exists());

    let storage = Storage::open(&path).unwrap();

    assert!(path.is_dir());
    assert!(path.join("LOCK").exists());
    assert!(path.join("LOG").exists());
    assert_eq!(storage.open_count(), 0);
    assert!(!storage.is_closed());
    storage.close().unwrap();
}

#[test]
fn test_open_path_is_absolute() {
    let (_temp, storage) = setup_temp_storage();

    assert!(storage.path().is_absolute());
    storage.close().unwrap();
}

#[test]
fn test_open_without_create_if_missing() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("absent");
    let config = Config::builder()
        .data_dir(&path)
        .create_if_missing(false)
        .build();

    let result = Storage::open_with(config);

    assert_eq!(
        result.unwrap_err().io_kind(),
        Some(std::io::ErrorKind::NotFound)
    );
    assert!(!path.exists());
}

#[test]
fn test_open_existing_without_create_if_missing() {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .create_if_missing(false)
        .build();

    let storage = Storage::open_with(config).unwrap();
    storage.close().unwrap();
}

#[test]
fn test_config_defaults() {
    let config = Config::default();

    assert!(config.create_if_missing);
    assert!(config.sync_manifest);
    assert!(config.rotate_log);

    let config = Config::with_dir("/tmp/db");
    assert_eq!(config.data_dir, std::path::PathBuf::from("/tmp/db"));
    assert!(config.sync_manifest);
}

#[test]
fn test_open_empty_path_rejected() {
    let config = Config::builder().data_dir("").build();

    assert!(matches!(Storage::open_with(config), Err(StorageError::Config(_))));
}

// =============================================================================
// Listing Tests
// =============================================================================

#[test]
fn test_list_empty_directory() {
    let (_temp, storage) = setup_temp_storage();

    assert!(storage.list_files(FileKindMask::ALL).unwrap().is_empty());
    storage.close().unwrap();
}

#[test]
fn test_list_by_kind() {
    let (_temp, storage) = setup_temp_storage();
    touch(&storage, &FileDescriptor::journal(1));
    touch(&storage, &FileDescriptor::table(2));
    touch(&storage, &FileDescriptor::table(3));
    touch(&storage, &FileDescriptor::manifest(4));

    assert_eq!(
        sorted(storage.list_files(FileKind::Table).unwrap()),
        vec![FileDescriptor::table(2), FileDescriptor::table(3)]
    );
    assert_eq!(
        storage.list_files(FileKindMask::JOURNAL).unwrap(),
        vec![FileDescriptor::journal(1)]
    );
    assert_eq!(
        storage.list_files(FileKindMask::MANIFEST).unwrap(),
        vec![FileDescriptor::manifest(4)]
    );
    assert_eq!(
        sorted(storage.list_files(FileKindMask::JOURNAL | FileKindMask::MANIFEST).unwrap()),
        vec![FileDescriptor::journal(1), FileDescriptor::manifest(4)]
    );
    assert_eq!(storage.list_files(FileKindMask::ALL).unwrap().len(), 4);
    assert!(storage.list_files(FileKindMask::NONE).unwrap().is_empty());
    storage.close().unwrap();
}

#[test]
fn test_list_skips_foreign_files() {
    let (_temp, storage) = setup_temp_storage();
    touch(&storage, &FileDescriptor::table(1));
    storage.set_manifest(&FileDescriptor::manifest(1)).unwrap();
    fs::write(storage.path().join("notes.txt"), "x").unwrap();
    fs::write(storage.path().join("000002.tmp"), "x").unwrap();
    fs::write(storage.path().join("CURRENT.9"), "x").unwrap();

    // LOCK, LOG, CURRENT and the files above are all skipped
    assert_eq!(
        storage.list_files(FileKindMask::ALL).unwrap(),
        vec![FileDescriptor::table(1)]
    );
    storage.close().unwrap();
}

#[test]
fn test_list_unpadded_name_is_duplicate() {
    let (_temp, storage) = setup_temp_storage();
    let fd = FileDescriptor::table(1);
    touch(&storage, &fd);
    fs::write(storage.path().join("1.sst"), "x").unwrap();

    assert_eq!(storage.list_files(FileKindMask::TABLE).unwrap(), vec![fd, fd]);

    // Only the canonical 000001.sst is removed
    storage.remove_file(&fd).unwrap();
    assert!(!storage.path().join("000001.sst").exists());
    assert!(storage.path().join("1.sst").exists());
    assert_eq!(storage.list_files(FileKindMask::TABLE).unwrap(), vec![fd]);
    storage.close().unwrap();
}

#[test]
fn test_list_wide_sequence_numbers() {
    let (_temp, storage) = setup_temp_storage();
    touch(&storage, &FileDescriptor::table(12_345_678));

    assert_eq!(
        storage.list_files(FileKindMask::TABLE).unwrap(),
        vec![FileDescriptor::table(12_345_678)]
    );
    storage.close().unwrap();
}

// =============================================================================
// Shutdown Tests
// =============================================================================

#[test]
fn test_close_with_open_file() {
    let (_temp, storage) = setup_temp_storage();

    let mut writer = storage.create_file(&FileDescriptor::table(1)).unwrap();

    assert!(matches!(storage.close(), Err(StorageError::FilesStillOpen(1))));
    assert!(!storage.is_closed());

    writer.close().unwrap();
    storage.close().unwrap();
    assert!(storage.is_closed());

    assert!(matches!(storage.close(), Err(StorageError::Closed)));
}

#[test]
fn test_close_releases_process_lock() {
    let (temp, storage) = setup_temp_storage();

    storage.close().unwrap();

    let storage = Storage::open(temp.path()).unwrap();
    storage.close().unwrap();
}

#[test]
fn test_operations_after_close() {
    let (_temp, storage) = setup_temp_storage();
    let fd = FileDescriptor::table(1);
    touch(&storage, &fd);
    storage.close().unwrap();

    assert!(matches!(storage.list_files(FileKindMask::ALL), Err(StorageError::Closed)));
    assert!(matches!(storage.open_file(&fd), Err(StorageError::Closed)));
    assert!(matches!(storage.create_file(&fd), Err(StorageError::Closed)));
    assert!(matches!(storage.remove_file(&fd), Err(StorageError::Closed)));
    assert!(matches!(storage.lock(), Err(StorageError::Closed)));
}

#[test]
fn test_drop_without_close_releases_lock() {
    init_tracing();
    let temp = TempDir::new().unwrap();

    {
        let _storage = Storage::open(temp.path()).unwrap();
    }

    let storage = Storage::open(temp.path()).unwrap();
    storage.close().unwrap();

    let old_log = fs::read_to_string(temp.path().join("LOG.old")).unwrap();
    assert!(old_log.contains("storage dropped without close"), "{}", old_log);
}

#[test]
fn test_drop_after_directory_removed() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("db");

    let storage = Storage::open(&path).unwrap();
    fs::remove_dir_all(&path).unwrap();
    drop(storage);

    let storage = Storage::open(&path).unwrap();
    assert!(storage.list_files(FileKindMask::ALL).unwrap().is_empty());
    storage.close().unwrap();
}

#[test]
fn test_drop_with_open_handle_keeps_lock() {
    init_tracing();
    let temp = TempDir::new().unwrap();

    let storage = Storage::open(temp.path()).unwrap();
    let mut writer = storage.create_file(&FileDescriptor::table(1)).unwrap();
    drop(storage);

    assert!(matches!(
        Storage::open(temp.path()),
        Err(StorageError::AlreadyLocked { .. })
    ));

    writer.close().unwrap();
    drop(writer);
    let storage = Storage::open(temp.path()).unwrap();
    storage.close().unwrap();
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_creates_on_distinct_files() {
    let (_temp, storage) = setup_temp_storage();
    let storage = Arc::new(storage);

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                for i in 0..25u64 {
                    let fd = FileDescriptor::table(t * 100 + i);
                    let mut writer = storage.create_file(&fd).unwrap();
                    writer.write_all(&fd.seq.to_le_bytes()).unwrap();
                    writer.close().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let files: HashSet<_> = storage
        .list_files(FileKindMask::TABLE)
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(files.len(), 200);
    assert_eq!(storage.open_count(), 0);
    storage.close().unwrap();
}

#[test]
fn test_concurrent_open_same_file_single_winner() {
    let (_temp, storage) = setup_temp_storage();
    let fd = FileDescriptor::journal(1);
    touch(&storage, &fd);
    let storage = Arc::new(storage);

    let barrier = Arc::new(std::sync::Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let storage = Arc::clone(&storage);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let result = storage.open_file(&fd);
                let opened = result.is_ok();
                // Hold the handle until every thread has tried
                barrier.wait();
                if let Ok(mut reader) = result {
                    reader.close().unwrap();
                }
                opened
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|opened| *opened)
        .count();

    assert_eq!(winners, 1);
    assert_eq!(storage.open_count(), 0);
    storage.close().unwrap();
}

#[test]
fn test_concurrent_manifest_publish() {
    let (_temp, storage) = setup_temp_storage();
    let storage = Arc::new(storage);

    let handles: Vec<_> = (1..=4u64)
        .map(|t| {
            let storage = Arc::clone(&storage);
            thread::spawn(move || {
                for i in 0..10u64 {
                    storage.set_manifest(&FileDescriptor::manifest(t * 1000 + i)).unwrap();
                    let current = storage.get_manifest().unwrap();
                    assert_eq!(current.kind, FileKind::Manifest);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let current = storage.get_manifest().unwrap();
    assert_eq!(current.seq % 1000, 9);
    storage.close().unwrap();
}
