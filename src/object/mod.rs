//! Binary object inspection.
//!
//! The image builder only needs three things from a binary: whether it is one
//! at all, the libraries it imports, and the raw bytes of a named section.
//! [`ObjectReader`] is that seam; [`ElfReader`] is the production reader.

mod elf;

pub use elf::ElfReader;

use thiserror::Error;

/// Name of the section holding the dynamic-linker path.
pub const INTERP_SECTION: &str = ".interp";

/// Why bytes could not be parsed as a binary object.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Leading bytes are not the object magic. Expected for most files.
    #[error("not a binary object")]
    NotBinary,

    /// Magic matched but the structure is invalid.
    #[error("{0}")]
    Malformed(String),
}

/// A parsed binary object.
pub trait BinaryObject {
    /// Dynamically imported library names, in declaration order.
    fn imported_libraries(&self) -> Result<Vec<String>, ParseError>;

    /// Raw content of the named section, or `None` if the object has none.
    fn section(&self, name: &str) -> Result<Option<Vec<u8>>, ParseError>;
}

/// Parses raw file content into a [`BinaryObject`].
pub trait ObjectReader {
    /// Content shorter than this is never parsed.
    fn min_header_size(&self) -> usize;

    fn parse<'a>(&self, bytes: &'a [u8]) -> Result<Box<dyn BinaryObject + 'a>, ParseError>;
}
