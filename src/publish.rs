//! Crash-safe output files.
//!
//! A [`PendingFile`] is a temporary sibling of its destination. It is either
//! atomically renamed over the destination with [`PendingFile::publish`] or
//! removed with [`PendingFile::discard`]; dropping it also removes it. The
//! destination is never observed half-written.

use std::fs::Permissions;
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{ImageError, Result};

/// Temporary output waiting to be published at `destination`.
#[derive(Debug)]
pub struct PendingFile {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl PendingFile {
    /// Create the temporary next to `destination` and chmod it to `mode`.
    pub fn create(destination: &Path, mode: u32) -> Result<Self> {
        let dir = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = tempfile::Builder::new()
            .prefix(".recinit-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| ImageError::io(dir, e))?;
        temp.as_file()
            .set_permissions(Permissions::from_mode(mode))
            .map_err(|e| ImageError::io(temp.path(), e))?;

        Ok(Self {
            temp,
            destination: destination.to_path_buf(),
        })
    }

    /// Path of the temporary file.
    fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Sync and atomically replace the destination.
    pub fn publish(self) -> Result<()> {
        self.temp
            .as_file()
            .sync_all()
            .map_err(|e| ImageError::io(self.temp_path(), e))?;
        let destination = self.destination;
        self.temp
            .persist(&destination)
            .map_err(|e| ImageError::Publish {
                path: destination.clone(),
                source: e.error,
            })?;
        Ok(())
    }

    /// Remove the temporary. Errors are ignored; the destination is untouched.
    pub fn discard(self) {
        let _ = self.temp.close();
    }
}

impl Write for PendingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}
