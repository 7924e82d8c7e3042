//! Streaming newc writer.
//!
//! Each entry is a 110-byte ASCII header, the NUL-terminated name, padding to
//! 4 bytes, then the data padded to 4 bytes. The archive ends with a
//! `TRAILER!!!` entry.

use std::io::{self, Write};

use super::{align_to_4, EntryKind};

const MAGIC: &str = "070701";
const HEADER_LEN: usize = 110;
pub(super) const TRAILER: &[u8] = b"TRAILER!!!";
const ZEROS: [u8; 4] = [0; 4];

/// Header of one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Entry name without a leading `/`.
    pub name: Vec<u8>,
    pub kind: EntryKind,
    /// Permission bits (`0o7777` mask is applied when encoding).
    pub mode: u32,
    /// Number of content bytes that follow the header.
    pub size: u64,
}

impl Header {
    pub fn new(name: impl Into<Vec<u8>>, kind: EntryKind, mode: u32, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            mode,
            size,
        }
    }
}

/// newc archive writer over any byte sink.
pub struct NewcWriter<W: Write> {
    inner: W,
    next_ino: u32,
    /// Content bytes still owed for the current entry.
    remaining: u64,
    /// Padding owed after the current entry's content.
    pad: usize,
}

impl<W: Write> NewcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            next_ino: 1,
            remaining: 0,
            pad: 0,
        }
    }

    /// Start a new entry. The previous entry must have received all its bytes.
    pub fn write_header(&mut self, header: &Header) -> io::Result<()> {
        self.complete_entry()?;

        if header.name.contains(&0) {
            return Err(invalid_input("entry name contains a NUL byte"));
        }
        let filesize = u32::try_from(header.size)
            .map_err(|_| invalid_input("entry exceeds the 4 GiB newc size limit"))?;
        let nlink = if header.kind == EntryKind::Directory { 2 } else { 1 };
        let ino = self.next_ino;
        self.next_ino += 1;

        self.write_raw_header(
            ino,
            header.kind.type_bits() | (header.mode & 0o7777),
            nlink,
            filesize,
            &header.name,
        )?;

        self.remaining = header.size;
        self.pad = align_to_4(filesize as usize) - filesize as usize;
        Ok(())
    }

    /// Write the trailer and hand back the underlying sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.complete_entry()?;
        self.write_raw_header(0, 0, 1, 0, TRAILER)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    /// Hand back the underlying sink without writing a trailer.
    pub fn into_inner(self) -> W {
        self.inner
    }

    fn complete_entry(&mut self) -> io::Result<()> {
        if self.remaining != 0 {
            return Err(invalid_input(format!(
                "previous entry is {} bytes short",
                self.remaining
            )));
        }
        if self.pad > 0 {
            self.inner.write_all(&ZEROS[..self.pad])?;
            self.pad = 0;
        }
        Ok(())
    }

    fn write_raw_header(
        &mut self,
        ino: u32,
        mode: u32,
        nlink: u32,
        filesize: u32,
        name: &[u8],
    ) -> io::Result<()> {
        let namesize = name.len() + 1;
        let header = format_header(ino, mode, nlink, filesize, namesize as u32);
        self.inner.write_all(header.as_bytes())?;
        self.inner.write_all(name)?;
        self.inner.write_all(&[0])?;

        let used = HEADER_LEN + namesize;
        let pad = align_to_4(used) - used;
        self.inner.write_all(&ZEROS[..pad])
    }
}

impl<W: Write> Write for NewcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.len() as u64 > self.remaining {
            return Err(invalid_input(format!(
                "entry content exceeds its header by {} bytes",
                buf.len() as u64 - self.remaining
            )));
        }
        let n = self.inner.write(buf)?;
        self.remaining -= n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Format a newc header: magic plus 13 fields of 8 hex digits.
///
/// uid, gid and mtime are always zero so images are reproducible.
fn format_header(ino: u32, mode: u32, nlink: u32, filesize: u32, namesize: u32) -> String {
    format!(
        "{MAGIC}\
         {ino:08X}\
         {mode:08X}\
         {uid:08X}\
         {gid:08X}\
         {nlink:08X}\
         {mtime:08X}\
         {filesize:08X}\
         {devmajor:08X}\
         {devminor:08X}\
         {rdevmajor:08X}\
         {rdevminor:08X}\
         {namesize:08X}\
         {check:08X}",
        uid = 0,
        gid = 0,
        mtime = 0,
        devmajor = 0,
        devminor = 0,
        rdevmajor = 0,
        rdevminor = 0,
        check = 0,
    )
}

fn invalid_input(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg.into())
}
