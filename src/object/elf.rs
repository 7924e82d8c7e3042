//! ELF reader backed by goblin.
//!
//! Reads `DT_NEEDED` entries straight from the dynamic section instead of
//! running `ldd`, so nothing on the host is executed and cross-architecture
//! binaries work the same way.

use goblin::elf::Elf;
use goblin::error::Error as GoblinError;

use super::{BinaryObject, ObjectReader, ParseError};

/// Size of a 64-bit ELF header, the smallest possible ELF file we care about.
const MIN_ELF_SIZE: usize = 64;

/// Production [`ObjectReader`] for ELF binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct ElfReader;

impl ObjectReader for ElfReader {
    fn min_header_size(&self) -> usize {
        MIN_ELF_SIZE
    }

    fn parse<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn BinaryObject + 'a>, ParseError> {
        match Elf::parse(bytes) {
            Ok(elf) => Ok(Box::new(ElfObject { elf, bytes })),
            Err(GoblinError::BadMagic(_)) => Err(ParseError::NotBinary),
            Err(e) => Err(ParseError::Malformed(e.to_string())),
        }
    }
}

struct ElfObject<'a> {
    elf: Elf<'a>,
    bytes: &'a [u8],
}

impl BinaryObject for ElfObject<'_> {
    fn imported_libraries(&self) -> Result<Vec<String>, ParseError> {
        Ok(self.elf.libraries.iter().map(|lib| lib.to_string()).collect())
    }

    fn section(&self, name: &str) -> Result<Option<Vec<u8>>, ParseError> {
        let Some(header) = self
            .elf
            .section_headers
            .iter()
            .find(|sh| self.elf.shdr_strtab.get_at(sh.sh_name) == Some(name))
        else {
            return Ok(None);
        };

        let start = usize::try_from(header.sh_offset)
            .map_err(|_| ParseError::Malformed(format!("{name} offset out of range")))?;
        let len = usize::try_from(header.sh_size)
            .map_err(|_| ParseError::Malformed(format!("{name} size out of range")))?;
        start
            .checked_add(len)
            .and_then(|end| self.bytes.get(start..end))
            .map(|data| Some(data.to_vec()))
            .ok_or_else(|| ParseError::Malformed(format!("{name} extends past end of file")))
    }
}
