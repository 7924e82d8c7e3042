//! newc reader, used to list and verify finished images.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Serialize;

use super::newc::TRAILER;
use super::{align_to_4, EntryKind};

const HEADER_LEN: usize = 110;

/// One entry read back from an archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub kind: EntryKind,
    /// Permission bits only (type bits stripped).
    pub mode: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
    pub size: u64,
}

impl ArchiveEntry {
    /// Symlink target, for symlink entries.
    pub fn link_target(&self) -> Option<String> {
        (self.kind == EntryKind::Symlink).then(|| String::from_utf8_lossy(&self.data).into_owned())
    }
}

/// Iterator over the entries of a newc stream, stopping at the trailer.
pub struct NewcReader<R: Read> {
    inner: R,
    done: bool,
}

impl<R: Read> NewcReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, done: false }
    }

    fn read_entry(&mut self) -> io::Result<Option<ArchiveEntry>> {
        let mut header = [0u8; HEADER_LEN];
        self.inner.read_exact(&mut header)?;
        if &header[..6] != b"070701" {
            return Err(invalid_data("bad newc magic"));
        }

        let mode = field(&header, 1)?;
        let filesize = field(&header, 6)? as usize;
        let namesize = field(&header, 11)? as usize;
        if namesize == 0 {
            return Err(invalid_data("entry has an empty name field"));
        }

        let mut name = vec![0u8; namesize];
        self.inner.read_exact(&mut name)?;
        self.skip(align_to_4(HEADER_LEN + namesize) - (HEADER_LEN + namesize))?;
        if name.last() == Some(&0) {
            name.pop();
        }
        if name == TRAILER {
            return Ok(None);
        }

        let mut data = vec![0u8; filesize];
        self.inner.read_exact(&mut data)?;
        self.skip(align_to_4(filesize) - filesize)?;

        Ok(Some(ArchiveEntry {
            name: String::from_utf8_lossy(&name).into_owned(),
            kind: EntryKind::from_mode(mode),
            mode: mode & 0o7777,
            data,
            size: filesize as u64,
        }))
    }

    fn skip(&mut self, n: usize) -> io::Result<()> {
        let mut pad = [0u8; 4];
        self.inner.read_exact(&mut pad[..n])
    }
}

impl<R: Read> Iterator for NewcReader<R> {
    type Item = io::Result<ArchiveEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read every entry of a gzip-compressed newc image on disk.
pub fn read_image(path: &Path) -> io::Result<Vec<ArchiveEntry>> {
    let file = File::open(path)?;
    NewcReader::new(BufReader::new(GzDecoder::new(file))).collect()
}

/// Parse header field `index` (0 = c_ino) as 8 hex digits.
fn field(header: &[u8; HEADER_LEN], index: usize) -> io::Result<u32> {
    let start = 6 + index * 8;
    let text = std::str::from_utf8(&header[start..start + 8])
        .map_err(|_| invalid_data("non-ASCII header field"))?;
    u32::from_str_radix(text, 16).map_err(|_| invalid_data(format!("bad header field {text:?}")))
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}
