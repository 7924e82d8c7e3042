//! newc (`070701`) cpio archive encoding and decoding.
//!
//! The writer streams entries straight into the underlying sink and performs
//! no reordering or deduplication: callers write entries in final order,
//! parents before children, each path once. The reader exists so finished
//! images can be listed and verified.

mod newc;
mod reader;

pub use newc::{Header, NewcWriter};
pub use reader::{read_image, ArchiveEntry, NewcReader};

use serde::Serialize;

/// File type constants for the mode field (POSIX `S_IF*` values).
const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;
const S_IFREG: u32 = 0o100000;
const S_IFLNK: u32 = 0o120000;

/// Kind of an archive entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
    Symlink,
    /// Anything else found while reading a foreign archive (device nodes, fifos).
    Other,
}

impl EntryKind {
    /// Type bits for the newc mode field.
    pub fn type_bits(self) -> u32 {
        match self {
            Self::Directory => S_IFDIR,
            Self::File => S_IFREG,
            Self::Symlink => S_IFLNK,
            Self::Other => 0,
        }
    }

    /// Classify a full newc mode field.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFDIR => Self::Directory,
            S_IFREG => Self::File,
            S_IFLNK => Self::Symlink,
            _ => Self::Other,
        }
    }

    /// Single-letter marker used by `recinit list`, as in `ls -l`.
    pub fn marker(self) -> char {
        match self {
            Self::Directory => 'd',
            Self::File => '-',
            Self::Symlink => 'l',
            Self::Other => '?',
        }
    }
}

/// Align value up to the 4-byte boundary newc requires.
fn align_to_4(n: usize) -> usize {
    (n + 3) & !3
}
