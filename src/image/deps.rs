//! Runtime dependency resolution for binaries added to an image.
//!
//! A binary's dependencies are its imported libraries, in declaration order,
//! followed by its dynamic linker (the `.interp` section). Each one is added
//! with [`Image::append_file`] semantics, so libraries that are themselves
//! binaries recurse until every path is already present.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Image, Reach};
use crate::common::paths;
use crate::error::{ImageError, Result};
use crate::object::{BinaryObject, ObjectReader, ParseError, INTERP_SECTION};

/// Ordered dependency list of a parsed binary at `path`.
pub(super) fn dependencies(path: &Path, object: &dyn BinaryObject) -> Result<Vec<String>> {
    let extraction = |e: ParseError| ImageError::DependencyExtraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut deps = object.imported_libraries().map_err(extraction)?;
    if let Some(interp) = object.section(INTERP_SECTION).map_err(extraction)? {
        deps.push(paths::until_nul(&interp).to_string_lossy().into_owned());
    }
    Ok(deps)
}

impl<R: ObjectReader> Image<R> {
    /// Add every dependency of the binary at `binary`, depth-first.
    pub(super) fn append_dependencies(
        &mut self,
        binary: &Path,
        deps: &[String],
        depth: usize,
    ) -> Result<()> {
        for name in deps {
            let path = self.locate(name);
            debug!(
                binary = %binary.display(),
                dependency = %name,
                path = %path.display(),
                "adding dependency"
            );
            self.add_file(&path, Reach::Transitive, depth + 1)?;
        }
        Ok(())
    }

    /// Map a dependency name to a host path.
    ///
    /// Absolute names are used as-is. Bare names go to the first library
    /// directory that holds them, or to the first library directory if none
    /// does (the following stat then reports the missing file).
    fn locate(&self, name: &str) -> PathBuf {
        let name_path = Path::new(name);
        if name_path.is_absolute() {
            return paths::clean(name_path);
        }

        let dirs = &self.options.library_dirs;
        dirs.iter()
            .map(|dir| paths::clean(&dir.join(name_path)))
            .find(|candidate| candidate.symlink_metadata().is_ok())
            .unwrap_or_else(|| {
                let first = dirs
                    .first()
                    .map(PathBuf::as_path)
                    .unwrap_or_else(|| Path::new(super::DEFAULT_LIBRARY_DIR));
                paths::clean(&first.join(name_path))
            })
    }
}
