//! Error types for image building.
//!
//! Every failure inside the (possibly deeply recursive) append chain unwinds
//! to the caller as an [`ImageError`]. The caller is expected to discard the
//! in-progress image; nothing is retried.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, ImageError>;

/// Errors raised while building an image.
#[derive(Error, Debug)]
pub enum ImageError {
    /// A host path could not be opened, created, read, stat'ed or readlink'ed.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Writing to the archive stream failed.
    #[error("failed to write image: {0}")]
    Write(#[source] io::Error),

    /// The destination path was already added to the image.
    #[error("{} has already been added to the image", .0.display())]
    DuplicateEntry(PathBuf),

    /// A file or symlink was aimed at the image root, which is always a directory.
    #[error("the image root can only be a directory")]
    RootEntry,

    /// [`ImageOptions`](crate::image::ImageOptions) rejected at construction.
    #[error("invalid image options: {0}")]
    InvalidOptions(String),

    /// Content starts like a binary object but does not parse as one.
    #[error("malformed binary {}: {reason}", .path.display())]
    MalformedBinary { path: PathBuf, reason: String },

    /// The import list or a required section could not be read.
    #[error("cannot extract dependencies of {}: {reason}", .path.display())]
    DependencyExtraction { path: PathBuf, reason: String },

    /// Symlink/dependency walk exceeded the configured depth.
    #[error(
        "dependency graph too deep at {} (limit {limit}), possible cycle",
        .path.display()
    )]
    TooDeep { path: PathBuf, limit: usize },

    /// Atomic rename onto the destination failed.
    #[error("failed to publish {}: {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The image was already finalized or discarded.
    #[error("image builder is closed")]
    Closed,
}

impl ImageError {
    /// Wrap an I/O error with the host path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
