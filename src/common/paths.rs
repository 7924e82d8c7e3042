//! Lexical path handling for logical image paths and host paths.
//!
//! Everything here is purely lexical: no function touches the filesystem
//! except [`absolutize`], which reads the current working directory.

use std::ffi::OsStr;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path.
///
/// Removes `.` components and duplicate separators and folds `..` into the
/// preceding component. `..` never climbs above the root of a rooted path.
/// A relative path that cleans away to nothing becomes `.`.
///
/// ```ignore
/// assert_eq!(clean(Path::new("/usr//lib/../bin/./sh")), PathBuf::from("/usr/bin/sh"));
/// ```
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Prefix(p) => out.push(p.as_os_str()),
            Component::RootDir => out.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    out.pop();
                    depth -= 1;
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(name) => {
                out.push(name);
                depth += 1;
            }
        }
    }

    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Turn any path into a rooted logical image path.
///
/// Paths without a leading `/` are taken relative to the image root.
pub fn logical(path: &Path) -> PathBuf {
    clean(&Path::new("/").join(path))
}

/// Resolve a host path against the current working directory and clean it.
pub fn absolutize(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(clean(path))
    } else {
        Ok(clean(&std::env::current_dir()?.join(path)))
    }
}

/// Name under which a logical path is stored in the archive.
///
/// The leading `/` is dropped; the root directory itself is stored as `.`.
pub fn archive_name(path: &Path) -> Vec<u8> {
    let bytes = path.as_os_str().as_bytes();
    let trimmed = bytes.strip_prefix(b"/").unwrap_or(bytes);
    if trimmed.is_empty() {
        b".".to_vec()
    } else {
        trimmed.to_vec()
    }
}

/// Resolve a symlink target to the absolute path it points at.
///
/// Absolute targets are used as-is. Relative targets are resolved against
/// the directory containing the link, not the working directory.
pub fn resolve_link(link: &Path, target: &Path) -> PathBuf {
    if target.is_absolute() {
        clean(target)
    } else {
        let dir = link.parent().unwrap_or_else(|| Path::new("/"));
        clean(&dir.join(target))
    }
}

/// Take bytes up to the first NUL, or all of them if there is none.
pub fn until_nul(bytes: &[u8]) -> &OsStr {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    OsStr::from_bytes(&bytes[..end])
}
