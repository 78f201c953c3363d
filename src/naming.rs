//! File naming
//!
//! Maps between a `FileDescriptor` (kind + sequence number) and the file
//! name used inside the storage directory.
//!
//! ## Naming Convention
//! ```text
//! MANIFEST-000007   manifest, seq 7
//! 000012.log        journal,  seq 12
//! 000013.sst        table,    seq 13
//! 1234567.sst       sequence numbers wider than 6 digits are kept intact
//! ```

use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

const MANIFEST_PREFIX: &str = "MANIFEST-";
const JOURNAL_EXT: &str = "log";
const TABLE_EXT: &str = "sst";

/// Kind of file stored in the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Manifest,
    Journal,
    Table,
    /// Anything the codec does not own; cannot be encoded
    Other,
}

impl FileKind {
    fn bit(self) -> u8 {
        match self {
            FileKind::Manifest => 1 << 0,
            FileKind::Journal => 1 << 1,
            FileKind::Table => 1 << 2,
            FileKind::Other => 1 << 3,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FileKind::Manifest => "manifest",
            FileKind::Journal => "journal",
            FileKind::Table => "table",
            FileKind::Other => "other",
        };
        f.write_str(name)
    }
}

/// Set of file kinds, used to filter directory listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileKindMask(u8);

impl FileKindMask {
    pub const NONE: FileKindMask = FileKindMask(0);
    pub const MANIFEST: FileKindMask = FileKindMask(1 << 0);
    pub const JOURNAL: FileKindMask = FileKindMask(1 << 1);
    pub const TABLE: FileKindMask = FileKindMask(1 << 2);
    pub const ALL: FileKindMask = FileKindMask(0b111);

    /// Whether `kind` is part of the set
    pub fn contains(self, kind: FileKind) -> bool {
        self.0 & kind.bit() != 0
    }
}

impl From<FileKind> for FileKindMask {
    fn from(kind: FileKind) -> Self {
        FileKindMask(kind.bit())
    }
}

impl BitOr for FileKindMask {
    type Output = FileKindMask;

    fn bitor(self, rhs: FileKindMask) -> FileKindMask {
        FileKindMask(self.0 | rhs.0)
    }
}

impl BitOr<FileKind> for FileKindMask {
    type Output = FileKindMask;

    fn bitor(self, rhs: FileKind) -> FileKindMask {
        self | FileKindMask::from(rhs)
    }
}

/// Logical identity of a file in the storage directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileDescriptor {
    pub kind: FileKind,
    pub seq: u64,
}

impl FileDescriptor {
    pub fn new(kind: FileKind, seq: u64) -> Self {
        Self { kind, seq }
    }

    pub fn manifest(seq: u64) -> Self {
        Self::new(FileKind::Manifest, seq)
    }

    pub fn journal(seq: u64) -> Self {
        Self::new(FileKind::Journal, seq)
    }

    pub fn table(seq: u64) -> Self {
        Self::new(FileKind::Table, seq)
    }

    /// Canonical file name for this descriptor
    ///
    /// # Panics
    ///
    /// Panics if the kind is `FileKind::Other`.
    pub fn file_name(&self) -> String {
        encode(self)
    }

    /// Absolute path of this file inside `dir`
    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

impl fmt::Display for FileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FileKind::Other => write!(f, "other#{}", self.seq),
            _ => f.write_str(&self.file_name()),
        }
    }
}

/// Encode a descriptor into its file name
///
/// # Panics
///
/// Panics if the kind is `FileKind::Other`; the codec is never asked to
/// name a file it does not own.
pub fn encode(fd: &FileDescriptor) -> String {
    match fd.kind {
        FileKind::Manifest => format!("{}{:06}", MANIFEST_PREFIX, fd.seq),
        FileKind::Journal => format!("{:06}.{}", fd.seq, JOURNAL_EXT),
        FileKind::Table => format!("{:06}.{}", fd.seq, TABLE_EXT),
        FileKind::Other => panic!("invalid file kind: cannot encode {:?}", fd),
    }
}

/// Decode a file name; foreign names yield `None`
///
/// "MANIFEST-000003" → Some(Manifest, 3)
/// "000042.sst"      → Some(Table, 42)
/// "LOG.old"         → None
pub fn decode(name: &str) -> Option<FileDescriptor> {
    if let Some(digits) = name.strip_prefix(MANIFEST_PREFIX) {
        return parse_seq(digits).map(FileDescriptor::manifest);
    }

    let (digits, ext) = name.split_once('.')?;
    let kind = match ext {
        JOURNAL_EXT => FileKind::Journal,
        TABLE_EXT => FileKind::Table,
        _ => return None,
    };
    parse_seq(digits).map(|seq| FileDescriptor::new(kind, seq))
}

/// Digits only; no sign, no whitespace, must fit in u64
fn parse_seq(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
