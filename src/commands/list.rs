//! List command - shows the entries of a finished image.

use anyhow::{Context, Result};
use std::path::Path;

use recinit::archive::{read_image, ArchiveEntry};

/// Execute the list command.
pub fn cmd_list(image: &Path, json: bool) -> Result<()> {
    let entries =
        read_image(image).with_context(|| format!("Failed to read image {}", image.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    println!("\n{} entries", entries.len());
    Ok(())
}

/// One `ls -l`-like line: kind, mode, size, name and symlink target.
fn format_entry(entry: &ArchiveEntry) -> String {
    let mut line = format!(
        "{}{:04o} {:>10} {}",
        entry.kind.marker(),
        entry.mode,
        entry.size,
        entry.name
    );
    if let Some(target) = entry.link_target() {
        line.push_str(" -> ");
        line.push_str(&target);
    }
    line
}
