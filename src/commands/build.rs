//! Build command - builds an initramfs image from host files.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use recinit::common::paths;
use recinit::config::Config;
use recinit::image::Image;
use recinit::object::ElfReader;
use recinit::timing::Timer;

/// A synthetic symlink given on the command line as `DEST=TARGET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymlinkArg {
    pub destination: PathBuf,
    pub target: PathBuf,
}

impl FromStr for SymlinkArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((dest, target)) if !dest.is_empty() && !target.is_empty() => Ok(Self {
                destination: PathBuf::from(dest),
                target: PathBuf::from(target),
            }),
            _ => Err(format!("expected DEST=TARGET, got '{}'", s)),
        }
    }
}

/// What to put into the image.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    /// Published image path.
    pub output: PathBuf,
    /// Host files. Bare names (no `/`) are looked up on PATH.
    pub files: Vec<String>,
    /// Host directories added recursively.
    pub trees: Vec<PathBuf>,
    /// Symlinks that do not exist on the host.
    pub symlinks: Vec<SymlinkArg>,
}

/// Execute the build command.
///
/// Any failure discards the in-progress image, leaving the output path as it
/// was before the build started.
pub fn cmd_build(request: &BuildRequest, config: &Config) -> Result<()> {
    if request.files.is_empty() && request.trees.is_empty() && request.symlinks.is_empty() {
        bail!("Nothing to add. Pass at least one file, --tree or --symlink.");
    }

    println!("=== Building initramfs image ===\n");
    let timer = Timer::start("image build");

    let mut image = Image::with_options(&request.output, config.image_options(), ElfReader)
        .with_context(|| format!("Failed to create image at {}", request.output.display()))?;

    if let Err(e) = populate(&mut image, request) {
        image.discard();
        return Err(e);
    }
    let entries = image.len();
    if let Err(e) = image.finalize() {
        image.discard();
        return Err(e).context("Failed to publish image");
    }
    timer.finish();

    let size = fs::metadata(&request.output)?.len();
    let digest = sha256_file(&request.output)?;
    println!("\n=== Image Complete ===");
    println!("  Output: {}", request.output.display());
    println!("  Entries: {}", entries);
    println!("  Size: {} KB", size / 1024);
    println!("  SHA256: {}", digest);

    Ok(())
}

fn populate(image: &mut Image, request: &BuildRequest) -> Result<()> {
    for arg in &request.files {
        let path = resolve_source(arg)?;
        if image.contains(&path) {
            println!("  {} already in image, skipping", path.display());
            continue;
        }
        println!("  Adding {}", path.display());
        image
            .append_file(&path)
            .with_context(|| format!("Failed to add {}", path.display()))?;
    }

    for tree in &request.trees {
        println!("  Adding tree {}", tree.display());
        image
            .append_tree(tree)
            .with_context(|| format!("Failed to add tree {}", tree.display()))?;
    }

    for link in &request.symlinks {
        println!(
            "  Linking {} -> {}",
            link.destination.display(),
            link.target.display()
        );
        image
            .append_symlink(&link.target, &link.destination)
            .with_context(|| format!("Failed to add symlink {}", link.destination.display()))?;
    }

    Ok(())
}

/// Turn a command-line file argument into an absolute host path.
fn resolve_source(arg: &str) -> Result<PathBuf> {
    if arg.contains('/') {
        return paths::absolutize(Path::new(arg))
            .with_context(|| format!("Failed to resolve {}", arg));
    }
    which::which(arg).with_context(|| format!("'{}' not found on PATH", arg))
}

/// Hex SHA-256 of a file.
fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symlink_arg_parse() {
        let link: SymlinkArg = "/init=/bin/busybox".parse().unwrap();
        assert_eq!(link.destination, PathBuf::from("/init"));
        assert_eq!(link.target, PathBuf::from("/bin/busybox"));
        assert!("/init".parse::<SymlinkArg>().is_err());
        assert!("=/bin/sh".parse::<SymlinkArg>().is_err());
    }

    #[test]
    fn test_nothing_to_add() {
        let request = BuildRequest {
            output: PathBuf::from("unused.img"),
            ..BuildRequest::default()
        };
        assert!(cmd_build(&request, &Config::default()).is_err());
    }

    #[test]
    fn test_build_publishes_image() {
        let dir = tempfile::TempDir::new().unwrap();
        let motd = dir.path().join("etc/motd");
        fs::create_dir_all(motd.parent().unwrap()).unwrap();
        fs::write(&motd, "welcome\n").unwrap();

        let request = BuildRequest {
            output: dir.path().join("initramfs.img"),
            files: vec![motd.to_str().unwrap().to_string()],
            trees: vec![dir.path().join("etc")],
            symlinks: vec!["/init=/bin/busybox".parse().unwrap()],
        };
        cmd_build(&request, &Config::default()).unwrap();

        let entries = recinit::archive::read_image(&request.output).unwrap();
        let motd_name = motd.to_str().unwrap().trim_start_matches('/');
        assert_eq!(entries.iter().filter(|e| e.name == motd_name).count(), 1);
        let init = entries.iter().find(|e| e.name == "init").unwrap();
        assert_eq!(init.link_target().as_deref(), Some("/bin/busybox"));
    }

    #[test]
    fn test_failed_build_keeps_previous_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("initramfs.img");
        fs::write(&output, "old").unwrap();

        let request = BuildRequest {
            output: output.clone(),
            files: vec![dir.path().join("missing").to_str().unwrap().to_string()],
            ..BuildRequest::default()
        };
        assert!(cmd_build(&request, &Config::default()).is_err());
        assert_eq!(fs::read_to_string(&output).unwrap(), "old");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_resolve_source_keeps_paths() {
        assert_eq!(
            resolve_source("/bin/../bin/sh").unwrap(),
            PathBuf::from("/bin/sh")
        );
    }
}
