//! Configuration management for recinit.
//!
//! Reads configuration from environment variables. `main` loads a `.env`
//! file (via dotenvy) first, so values there act as defaults that the real
//! environment overrides.

use anyhow::{bail, Context, Result};
use std::path::PathBuf;

use crate::image::{ImageOptions, DEFAULT_GZIP_LEVEL, DEFAULT_LIBRARY_DIR, DEFAULT_MAX_DEPTH};

/// Colon-separated list of library search directories.
pub const LIBRARY_DIRS_ENV: &str = "RECINIT_LIBRARY_DIRS";
/// Maximum symlink/dependency nesting.
pub const MAX_DEPTH_ENV: &str = "RECINIT_MAX_DEPTH";
/// gzip level for the image, 0-9.
pub const GZIP_LEVEL_ENV: &str = "RECINIT_GZIP_LEVEL";

/// recinit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where bare library names are looked up (default: /usr/lib)
    pub library_dirs: Vec<PathBuf>,
    /// Limit on nested symlink/dependency hops (default: 64)
    pub max_depth: usize,
    /// gzip compression level (default: 6)
    pub gzip_level: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library_dirs: vec![PathBuf::from(DEFAULT_LIBRARY_DIR)],
            max_depth: DEFAULT_MAX_DEPTH,
            gzip_level: DEFAULT_GZIP_LEVEL,
        }
    }
}

impl Config {
    /// Load configuration from the process environment.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup. Unset or empty keys use defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(dirs) = get(LIBRARY_DIRS_ENV) {
            config.library_dirs = dirs
                .split(':')
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect();
            if let Some(relative) = config.library_dirs.iter().find(|d| d.is_relative()) {
                bail!(
                    "{} entries must be absolute paths, got '{}'",
                    LIBRARY_DIRS_ENV,
                    relative.display()
                );
            }
        }

        if let Some(depth) = get(MAX_DEPTH_ENV) {
            config.max_depth = depth
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number, got '{}'", MAX_DEPTH_ENV, depth))?;
        }

        if let Some(level) = get(GZIP_LEVEL_ENV) {
            let level: u32 = level
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number, got '{}'", GZIP_LEVEL_ENV, level))?;
            if level > 9 {
                bail!("{} must be between 0 and 9, got {}", GZIP_LEVEL_ENV, level);
            }
            config.gzip_level = level;
        }

        Ok(config)
    }

    /// Options for a new image built with this configuration.
    pub fn image_options(&self) -> ImageOptions {
        ImageOptions {
            library_dirs: self.library_dirs.clone(),
            max_depth: self.max_depth,
            gzip_level: self.gzip_level,
            ..ImageOptions::default()
        }
    }

    /// Print configuration for debugging.
    pub fn print(&self) {
        let dirs: Vec<String> = self
            .library_dirs
            .iter()
            .map(|d| d.display().to_string())
            .collect();
        println!("Configuration:");
        println!("  {}: {}", LIBRARY_DIRS_ENV, dirs.join(":"));
        println!("  {}: {}", MAX_DEPTH_ENV, self.max_depth);
        println!("  {}: {}", GZIP_LEVEL_ENV, self.gzip_level);
    }
}
