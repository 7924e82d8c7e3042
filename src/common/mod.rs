//! Shared utilities across recinit modules.

pub mod paths;
