//! recinit library exports.
//!
//! Builds self-contained initramfs images: every binary added to an
//! [`image::Image`] pulls in its shared libraries and dynamic linker,
//! transitively, so the archive boots without the host root filesystem.

pub mod archive;
pub mod common;
pub mod config;
pub mod error;
pub mod image;
pub mod object;
pub mod publish;
pub mod timing;

pub use error::{ImageError, Result};
pub use image::{Image, ImageOptions};
