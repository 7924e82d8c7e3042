//! Initramfs image builder.
//!
//! An [`Image`] streams a gzip-compressed newc archive into a temporary file
//! next to its destination. Every append goes through one path set, which
//! guarantees:
//!
//! - every ancestor directory is written before its descendants,
//! - every path is written at most once,
//! - the recursive walks (parent directories, symlink targets, binary
//!   dependencies) terminate on paths that are already present.
//!
//! # Lifecycle
//!
//! ```text
//! create ──> append_* ... ──┬──> finalize  (publishes the destination)
//!                           └──> discard   (destination untouched)
//! ```
//!
//! Appends after either terminal state fail with [`ImageError::Closed`].
//! If any append fails, call [`Image::discard`] (dropping the image does the
//! same).

mod deps;

use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;

use crate::archive::{EntryKind, Header, NewcWriter};
use crate::common::paths;
use crate::error::{ImageError, Result};
use crate::object::{ElfReader, ObjectReader, ParseError};
use crate::publish::PendingFile;

/// Mode of every directory entry.
pub const DIR_MODE: u32 = 0o755;
/// Mode of synthetic symlinks added with [`Image::append_symlink`].
pub const SYMLINK_MODE: u32 = 0o777;
/// Library directory used when a dependency is not an absolute path.
pub const DEFAULT_LIBRARY_DIR: &str = "/usr/lib";
/// Default limit on nested symlink/dependency hops.
pub const DEFAULT_MAX_DEPTH: usize = 64;
/// Default gzip level.
pub const DEFAULT_GZIP_LEVEL: u32 = 6;
/// Default mode of the published image file.
pub const DEFAULT_OUTPUT_MODE: u32 = 0o644;

type Output = NewcWriter<GzEncoder<PendingFile>>;

/// Tunables for an [`Image`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageOptions {
    /// Directories searched, in order, for dependencies given by bare name.
    pub library_dirs: Vec<PathBuf>,
    /// Maximum nesting of symlink/dependency hops.
    pub max_depth: usize,
    /// gzip level, 0-9.
    pub gzip_level: u32,
    /// Permission bits of the output file.
    pub output_mode: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            library_dirs: vec![PathBuf::from(DEFAULT_LIBRARY_DIR)],
            max_depth: DEFAULT_MAX_DEPTH,
            gzip_level: DEFAULT_GZIP_LEVEL,
            output_mode: DEFAULT_OUTPUT_MODE,
        }
    }
}

impl ImageOptions {
    /// Library dirs must be absolute so every resolved dependency is rooted.
    fn validate(&self) -> Result<()> {
        if let Some(dir) = self.library_dirs.iter().find(|d| d.is_relative()) {
            return Err(ImageError::InvalidOptions(format!(
                "library directory {} is not absolute",
                dir.display()
            )));
        }
        if self.gzip_level > 9 {
            return Err(ImageError::InvalidOptions(format!(
                "gzip level {} is out of range 0-9",
                self.gzip_level
            )));
        }
        Ok(())
    }
}

/// How a file walk reached a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reach {
    /// Requested by the caller. Re-adding a file is a duplicate.
    Direct,
    /// Reached through a symlink or a dependency. Present paths end the walk.
    Transitive,
}

/// A build-in-progress initramfs image.
pub struct Image<R: ObjectReader = ElfReader> {
    destination: PathBuf,
    out: Option<Output>,
    /// Logical paths already written, always rooted and cleaned.
    present: HashSet<PathBuf>,
    reader: R,
    options: ImageOptions,
}

impl Image<ElfReader> {
    /// Open an image at `destination` with default options.
    pub fn create(destination: impl AsRef<Path>) -> Result<Self> {
        Self::with_options(destination, ImageOptions::default(), ElfReader)
    }
}

impl<R: ObjectReader> Image<R> {
    /// Open an image at `destination` with explicit options and reader.
    pub fn with_options(
        destination: impl AsRef<Path>,
        options: ImageOptions,
        reader: R,
    ) -> Result<Self> {
        options.validate()?;
        let destination = destination.as_ref().to_path_buf();
        let file = PendingFile::create(&destination, options.output_mode)?;
        let gz = GzEncoder::new(file, Compression::new(options.gzip_level));

        info!(destination = %destination.display(), "creating image");
        Ok(Self {
            destination,
            out: Some(NewcWriter::new(gz)),
            present: HashSet::new(),
            reader,
            options,
        })
    }

    /// Where the image will be published.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Whether a logical path has already been added.
    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.present.contains(&paths::logical(path.as_ref()))
    }

    /// Number of entries written so far.
    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    /// Whether the image was finalized or discarded.
    pub fn is_closed(&self) -> bool {
        self.out.is_none()
    }

    /// Write the trailer, flush compression and atomically publish.
    ///
    /// The builder is closed afterwards whether this succeeds or not; on
    /// failure the temporary output has already been removed.
    #[instrument(skip(self), fields(destination = %self.destination.display()))]
    pub fn finalize(&mut self) -> Result<()> {
        let out = self.out.take().ok_or(ImageError::Closed)?;
        let gz = out.finish().map_err(ImageError::Write)?;
        let file = gz.finish().map_err(ImageError::Write)?;
        file.publish()?;
        info!(entries = self.present.len(), "image published");
        Ok(())
    }

    /// Drop all output and remove the temporary file. Never fails.
    pub fn discard(&mut self) {
        if let Some(out) = self.out.take() {
            debug!(destination = %self.destination.display(), "discarding image");
            if let Ok(file) = out.into_inner().finish() {
                file.discard();
            }
        }
    }

    /// Append a directory and, first, all of its missing ancestors.
    ///
    /// Appending a directory that is already present is a no-op.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn append_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        self.add_directory(&paths::logical(path.as_ref()))
    }

    /// Append a regular file with literal content at a logical path.
    ///
    /// Fails with [`ImageError::DuplicateEntry`] if the path is present.
    /// If the content is a binary object, its runtime dependencies are
    /// appended as well.
    #[instrument(skip(self, content, destination), fields(destination = %destination.as_ref().display(), size = content.len()))]
    pub fn append_content(
        &mut self,
        content: &[u8],
        mode: u32,
        destination: impl AsRef<Path>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.add_content(content, mode, &paths::logical(destination.as_ref()), 0)
    }

    /// Append a file from the host filesystem at the same path in the image.
    ///
    /// Symlinks are stored as symlinks and their targets are added too;
    /// binaries pull in their libraries and dynamic linker.
    #[instrument(skip(self, source), fields(source = %source.as_ref().display()))]
    pub fn append_file(&mut self, source: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        let source = source.as_ref();
        let path = paths::absolutize(source).map_err(|e| ImageError::io(source, e))?;
        self.add_file(&path, Reach::Direct, 0)
    }

    /// Append a symlink entry without touching the host filesystem.
    #[instrument(skip(self, target, destination), fields(destination = %destination.as_ref().display()))]
    pub fn append_symlink(
        &mut self,
        target: impl AsRef<Path>,
        destination: impl AsRef<Path>,
    ) -> Result<()> {
        self.ensure_open()?;
        let destination = paths::logical(destination.as_ref());
        self.add_symlink(
            &destination,
            target.as_ref().as_os_str().as_bytes(),
            SYMLINK_MODE,
        )
    }

    /// Append every entry below a host directory, in file-name order.
    ///
    /// Entries that are already present (for example libraries pulled in by
    /// an earlier binary) are skipped.
    #[instrument(skip(self, root), fields(root = %root.as_ref().display()))]
    pub fn append_tree(&mut self, root: impl AsRef<Path>) -> Result<()> {
        self.ensure_open()?;
        let root = root.as_ref();
        let root = paths::absolutize(root).map_err(|e| ImageError::io(root, e))?;

        for entry in WalkDir::new(&root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&root).to_path_buf();
                ImageError::io(path, e.into())
            })?;
            self.add_file(entry.path(), Reach::Transitive, 0)?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.out.is_some() {
            Ok(())
        } else {
            Err(ImageError::Closed)
        }
    }

    fn add_directory(&mut self, path: &Path) -> Result<()> {
        if self.present.contains(path) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            self.add_directory(parent)?;
        }
        self.write_entry(path, EntryKind::Directory, DIR_MODE, &[])
    }

    fn add_parent(&mut self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) => self.add_directory(parent),
            None => Ok(()),
        }
    }

    fn add_content(&mut self, content: &[u8], mode: u32, path: &Path, depth: usize) -> Result<()> {
        if path.parent().is_none() {
            return Err(ImageError::RootEntry);
        }
        if self.present.contains(path) {
            return Err(ImageError::DuplicateEntry(path.to_path_buf()));
        }
        self.add_parent(path)?;
        self.write_entry(path, EntryKind::File, mode, content)?;

        if content.len() < self.reader.min_header_size() {
            return Ok(());
        }
        let dependencies = match self.reader.parse(content) {
            Ok(object) => deps::dependencies(path, object.as_ref())?,
            Err(ParseError::NotBinary) => return Ok(()),
            Err(ParseError::Malformed(reason)) => {
                return Err(ImageError::MalformedBinary {
                    path: path.to_path_buf(),
                    reason,
                })
            }
        };
        self.append_dependencies(path, &dependencies, depth)
    }

    fn add_symlink(&mut self, path: &Path, target: &[u8], mode: u32) -> Result<()> {
        if path.parent().is_none() {
            return Err(ImageError::RootEntry);
        }
        if self.present.contains(path) {
            return Err(ImageError::DuplicateEntry(path.to_path_buf()));
        }
        self.add_parent(path)?;
        self.write_entry(path, EntryKind::Symlink, mode, target)
    }

    /// Walk one host path. `path` is absolute and clean.
    fn add_file(&mut self, path: &Path, reach: Reach, depth: usize) -> Result<()> {
        if reach == Reach::Transitive && self.present.contains(path) {
            debug!(path = %path.display(), "already present");
            return Ok(());
        }
        if depth > self.options.max_depth {
            return Err(ImageError::TooDeep {
                path: path.to_path_buf(),
                limit: self.options.max_depth,
            });
        }

        self.add_parent(path)?;
        let meta = fs::symlink_metadata(path).map_err(|e| ImageError::io(path, e))?;
        let mode = meta.permissions().mode() & 0o7777;

        if meta.file_type().is_symlink() {
            let target = fs::read_link(path).map_err(|e| ImageError::io(path, e))?;
            self.add_symlink(path, target.as_os_str().as_bytes(), mode)?;

            let resolved = paths::resolve_link(path, &target);
            debug!(link = %path.display(), target = %resolved.display(), "following symlink");
            self.add_file(&resolved, Reach::Transitive, depth + 1)
        } else if meta.is_dir() {
            self.add_directory(path)
        } else {
            let content = fs::read(path).map_err(|e| ImageError::io(path, e))?;
            self.add_content(&content, mode, path, depth)
        }
    }

    /// Write one entry and record its path. Callers check for duplicates.
    fn write_entry(&mut self, path: &Path, kind: EntryKind, mode: u32, data: &[u8]) -> Result<()> {
        let out = self.out.as_mut().ok_or(ImageError::Closed)?;
        let header = Header::new(paths::archive_name(path), kind, mode, data.len() as u64);
        out.write_header(&header).map_err(ImageError::Write)?;
        out.write_all(data).map_err(ImageError::Write)?;

        self.present.insert(path.to_path_buf());
        debug!(
            path = %path.display(),
            ?kind,
            mode = format_args!("{:o}", mode),
            size = data.len(),
            "wrote entry"
        );
        Ok(())
    }
}

impl<R: ObjectReader> Drop for Image<R> {
    fn drop(&mut self) {
        if self.out.is_some() {
            warn!(
                destination = %self.destination.display(),
                "image dropped before finalize, discarding"
            );
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::read_image;
    use tempfile::TempDir;

    fn names(dest: &Path) -> Vec<String> {
        read_image(dest)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect()
    }

    #[test]
    fn test_directory_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.img");
        let mut image = Image::create(&dest).unwrap();

        image.append_directory("/a/b").unwrap();
        image.append_directory("/a/b").unwrap();
        image.finalize().unwrap();

        assert_eq!(names(&dest), vec![".", "a", "a/b"]);
    }

    #[test]
    fn test_ancestors_precede_files() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.img");
        let mut image = Image::create(&dest).unwrap();

        image.append_content(b"c", 0o644, "/a/b/c").unwrap();
        image.append_content(b"d", 0o644, "/a/b/d").unwrap();
        image.finalize().unwrap();

        assert_eq!(names(&dest), vec![".", "a", "a/b", "a/b/c", "a/b/d"]);
    }

    #[test]
    fn test_relative_logical_paths_are_rooted() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.img");
        let mut image = Image::create(&dest).unwrap();

        image.append_content(b"x", 0o600, "etc/./secret").unwrap();
        assert!(image.contains("/etc/secret"));
        assert!(image.contains("etc"));
        image.discard();
    }

    #[test]
    fn test_closed_after_finalize() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.img");
        let mut image = Image::create(&dest).unwrap();
        image.finalize().unwrap();

        assert!(image.is_closed());
        assert!(matches!(image.append_directory("/x"), Err(ImageError::Closed)));
        assert!(matches!(image.finalize(), Err(ImageError::Closed)));
        image.discard();
    }

    #[test]
    fn test_drop_discards() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.img");
        {
            let mut image = Image::create(&dest).unwrap();
            image.append_directory("/bin").unwrap();
        }
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
