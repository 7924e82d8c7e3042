//! CLI command handlers.
//!
//! Each submodule handles a specific CLI command:
//! - `build` - Build an image from host files
//! - `list` - List the entries of a finished image
//! - `show` - Display the effective configuration

pub mod build;
pub mod list;
pub mod show;

pub use build::cmd_build;
pub use list::cmd_list;
pub use show::cmd_show_config;
