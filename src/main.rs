//! recinit - self-contained initramfs image builder.
//!
//! Adds host files to a gzip-compressed newc image. Binaries pull in every
//! shared library and dynamic linker they need, transitively, so the image
//! runs without the host root filesystem.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::build::{BuildRequest, SymlinkArg};
use recinit::config::Config;

#[derive(Parser)]
#[command(name = "recinit")]
#[command(about = "Self-contained initramfs image builder")]
#[command(
    after_help = "QUICK START:\n  recinit build -o initramfs.img busybox /etc/passwd\n  recinit list initramfs.img\n  recinit show-config"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an image; binaries pull in their libraries and dynamic linker
    Build {
        /// Output image path (replaced atomically on success)
        #[arg(short, long)]
        output: PathBuf,

        /// Add a host directory recursively (repeatable)
        #[arg(long = "tree", value_name = "DIR")]
        trees: Vec<PathBuf>,

        /// Add a symlink that does not exist on the host (repeatable)
        #[arg(long = "symlink", value_name = "DEST=TARGET")]
        symlinks: Vec<SymlinkArg>,

        /// Host files to add; bare names are looked up on PATH
        files: Vec<String>,
    },

    /// List the entries of a finished image
    List {
        /// Image to read
        image: PathBuf,

        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration
    ShowConfig,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Load .env if present; the real environment wins
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    match cli.command {
        Commands::Build {
            output,
            trees,
            symlinks,
            files,
        } => {
            let request = BuildRequest {
                output,
                files,
                trees,
                symlinks,
            };
            commands::cmd_build(&request, &config)?;
        }

        Commands::List { image, json } => {
            commands::cmd_list(&image, json)?;
        }

        Commands::ShowConfig => {
            commands::cmd_show_config(&config);
        }
    }

    Ok(())
}
