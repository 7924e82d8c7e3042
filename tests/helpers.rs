//! Shared test utilities for recinit tests.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use recinit::archive::{read_image, ArchiveEntry, EntryKind};
use recinit::object::{BinaryObject, ObjectReader, ParseError, INTERP_SECTION};
use recinit::{Image, ImageOptions};

/// Test environment with a mock host tree and an output directory.
pub struct TestEnv {
    /// Temporary directory (kept alive for lifetime of TestEnv)
    pub _temp_dir: TempDir,
    /// Mock host filesystem that files are added from
    pub host: PathBuf,
    /// Mock library directory inside `host`
    pub lib: PathBuf,
    /// Directory the image is published into
    pub out_dir: PathBuf,
    /// Published image path
    pub image: PathBuf,
}

impl TestEnv {
    /// Create a new test environment with temporary directories.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base = temp_dir.path();

        let host = base.join("host");
        let lib = host.join("usr/lib");
        let out_dir = base.join("out");
        let image = out_dir.join("initramfs.img");

        fs::create_dir_all(&lib).expect("Failed to create mock lib dir");
        fs::create_dir_all(&out_dir).expect("Failed to create out dir");

        Self {
            _temp_dir: temp_dir,
            host,
            lib,
            out_dir,
            image,
        }
    }

    /// Options that resolve bare library names inside the mock host.
    pub fn options(&self) -> ImageOptions {
        ImageOptions {
            library_dirs: vec![self.lib.clone()],
            ..ImageOptions::default()
        }
    }

    /// Image at `self.image` using the fake object format.
    pub fn fake_image(&self) -> Image<FakeReader> {
        Image::with_options(&self.image, self.options(), FakeReader).expect("Failed to create image")
    }

    /// Path inside the mock host.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.host.join(rel)
    }

    /// Entries of the published image.
    pub fn entries(&self) -> Vec<ArchiveEntry> {
        read_image(&self.image).expect("Failed to read image")
    }

    /// Files in the output directory (published image plus any leftovers).
    pub fn out_dir_files(&self) -> Vec<PathBuf> {
        fs::read_dir(&self.out_dir)
            .expect("Failed to read out dir")
            .map(|e| e.expect("Failed to read dir entry").path())
            .collect()
    }
}

/// Archive name of a host path: the path without its leading `/`.
pub fn name_of(path: &Path) -> String {
    path.to_str()
        .expect("test paths are UTF-8")
        .trim_start_matches('/')
        .to_string()
}

/// Write a file with a mode, creating parent directories.
pub fn create_file(path: &Path, content: &[u8], mode: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, content).expect("Failed to write file");
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).expect("Failed to chmod");
}

/// Create a symlink, creating parent directories.
pub fn create_symlink(target: &str, link: &Path) {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    std::os::unix::fs::symlink(target, link).expect("Failed to create symlink");
}

/// Entries named `name`, however many there are.
pub fn find<'a>(entries: &'a [ArchiveEntry], name: &str) -> Vec<&'a ArchiveEntry> {
    entries.iter().filter(|e| e.name == name).collect()
}

/// The single entry named `name`; fails if missing or duplicated.
pub fn single<'a>(entries: &'a [ArchiveEntry], name: &str) -> &'a ArchiveEntry {
    let found = find(entries, name);
    assert_eq!(found.len(), 1, "expected exactly one entry named {name}, found {}", found.len());
    found[0]
}

/// Position of the entry named `name`.
pub fn position(entries: &[ArchiveEntry], name: &str) -> usize {
    entries
        .iter()
        .position(|e| e.name == name)
        .unwrap_or_else(|| panic!("no entry named {name}"))
}

/// Assert no name repeats and every entry's parent directory precedes it.
pub fn assert_tree_invariants(entries: &[ArchiveEntry]) {
    let mut seen: Vec<&str> = Vec::new();
    for entry in entries {
        assert!(!entry.name.starts_with('/'), "{} has a leading slash", entry.name);
        assert!(!seen.contains(&entry.name.as_str()), "{} appears twice", entry.name);

        if entry.name != "." {
            let parent = match entry.name.rsplit_once('/') {
                Some((parent, _)) => parent,
                None => ".",
            };
            let parent_entry = entries
                .iter()
                .take(seen.len())
                .find(|e| e.name == parent)
                .unwrap_or_else(|| panic!("parent of {} missing or after it", entry.name));
            assert_eq!(parent_entry.kind, EntryKind::Directory);
        }
        seen.push(&entry.name);
    }
}

// =============================================================================
// Fake binary objects
// =============================================================================

const FAKE_MAGIC: &[u8] = b"#!fakeobj\n";
const FAKE_MIN_SIZE: usize = 64;

/// Bytes of a fake binary object importing `needed`, with an optional interpreter.
///
/// Format: a magic line, then `needed <name>` / `interp <path>` lines,
/// padded to the minimum header size with a comment line.
pub fn fake_object(needed: &[&str], interp: Option<&str>) -> Vec<u8> {
    let mut text = String::from_utf8(FAKE_MAGIC.to_vec()).unwrap();
    for lib in needed {
        text.push_str(&format!("needed {lib}\n"));
    }
    if let Some(interp) = interp {
        text.push_str(&format!("interp {interp}\n"));
    }
    pad(text)
}

/// Fake object that passes the magic check but is structurally invalid.
pub fn broken_fake_object() -> Vec<u8> {
    let mut text = String::from_utf8(FAKE_MAGIC.to_vec()).unwrap();
    text.push_str("broken\n");
    pad(text)
}

fn pad(mut text: String) -> Vec<u8> {
    text.push('#');
    while text.len() < FAKE_MIN_SIZE {
        text.push('-');
    }
    text.push('\n');
    text.into_bytes()
}

/// [`ObjectReader`] for the fake format above.
pub struct FakeReader;

struct FakeObject {
    needed: Vec<String>,
    interp: Option<String>,
}

impl ObjectReader for FakeReader {
    fn min_header_size(&self) -> usize {
        FAKE_MIN_SIZE
    }

    fn parse<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn BinaryObject + 'a>, ParseError> {
        if !bytes.starts_with(FAKE_MAGIC) {
            return Err(ParseError::NotBinary);
        }
        let text = String::from_utf8_lossy(&bytes[FAKE_MAGIC.len()..]);
        let mut object = FakeObject {
            needed: Vec::new(),
            interp: None,
        };
        for line in text.lines() {
            if line == "broken" {
                return Err(ParseError::Malformed("broken fake object".into()));
            } else if let Some(lib) = line.strip_prefix("needed ") {
                object.needed.push(lib.to_string());
            } else if let Some(interp) = line.strip_prefix("interp ") {
                object.interp = Some(interp.to_string());
            }
        }
        Ok(Box::new(object))
    }
}

impl BinaryObject for FakeObject {
    fn imported_libraries(&self) -> Result<Vec<String>, ParseError> {
        Ok(self.needed.clone())
    }

    fn section(&self, name: &str) -> Result<Option<Vec<u8>>, ParseError> {
        if name != INTERP_SECTION {
            return Ok(None);
        }
        Ok(self.interp.as_ref().map(|p| {
            let mut data = p.as_bytes().to_vec();
            data.push(0);
            data
        }))
    }
}
