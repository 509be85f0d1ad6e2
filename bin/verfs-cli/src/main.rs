//! VerFS CLI - Admin Command Line Interface
//!
//! Opens a VerFS storage directory and runs a single operation against it.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use verfs_common::{Config, FileKind, VersionId};
use verfs_engine::VersionedFs;

#[derive(Parser, Debug)]
#[command(name = "verfs-cli")]
#[command(about = "VerFS Admin CLI")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "verfs.toml")]
    config: PathBuf,

    /// Storage directory holding the metadata and version roots
    #[arg(short, long, env = "VERFS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the storage roots
    Init,
    /// Show file or directory attributes
    Stat {
        path: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print file content
    Cat {
        path: String,
        /// Read this version instead of the latest
        #[arg(long)]
        version: Option<u64>,
    },
    /// Write data into a file, creating a new version
    Write {
        path: String,
        /// Byte offset to write at
        #[arg(short, long, default_value_t = 0)]
        offset: u64,
        /// Data to write; read from stdin when omitted
        #[arg(long)]
        data: Option<String>,
    },
    /// Create an empty file
    Touch {
        path: String,
        /// Permission bits (octal)
        #[arg(short, long, default_value = "644", value_parser = parse_mode)]
        mode: u32,
    },
    /// Remove a file and all of its versions
    Rm { path: String },
    /// Create a directory
    Mkdir {
        path: String,
        /// Permission bits (octal)
        #[arg(short, long, default_value = "755", value_parser = parse_mode)]
        mode: u32,
    },
    /// Remove an empty directory
    Rmdir { path: String },
    /// Set the file length, creating a new version
    Truncate { path: String, size: u64 },
    /// Show the version history of a file
    Log { path: String },
}

fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    let mode = u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal mode {s:?}: {e}"))?;
    if mode > 0o7777 {
        return Err(format!("mode {s} has bits outside 0o7777"));
    }
    Ok(mode)
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let config_str = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&config_str)
        .with_context(|| format!("Failed to parse config file {}", path.display()))
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Merge CLI args with config file (CLI takes precedence)
    let mut config = load_config(&args.config)?;
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    config.validate()?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    debug!("Config file: {}", args.config.display());
    let fs = VersionedFs::new(config.storage)?;
    run(&fs, args.command)
}

fn run(fs: &VersionedFs, command: Commands) -> Result<()> {
    match command {
        Commands::Init => {
            info!("Storage initialized");
            println!("Initialized {}", fs.config().data_dir.display());
        }
        Commands::Stat { path, json } => {
            let attrs = fs.stat(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&attrs)?);
            } else {
                let kind = match attrs.kind() {
                    FileKind::File => "file",
                    FileKind::Directory => "directory",
                };
                println!("Path:  {path}");
                println!("Type:  {kind}");
                println!("Mode:  {:o}", attrs.permissions());
                println!("Size:  {}", attrs.size);
                println!("Mtime: {}", attrs.mtime);
                println!("Links: {}", attrs.nlink);
            }
        }
        Commands::Ls { path, json } => {
            let entries = fs.list(&path)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                for entry in entries {
                    match entry.kind {
                        FileKind::Directory => println!("{}/", entry.name),
                        FileKind::File => println!("{}", entry.name),
                    }
                }
            }
        }
        Commands::Cat { path, version } => {
            let data = match version {
                Some(id) => fs.read_version(&path, VersionId::new(id), 0, usize::MAX)?,
                None => fs.read(&path, 0, usize::MAX)?,
            };
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
        Commands::Write { path, offset, data } => {
            let data = match data {
                Some(data) => data.into_bytes(),
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin()
                        .read_to_end(&mut buf)
                        .context("Failed to read data from stdin")?;
                    buf
                }
            };
            let written = fs.write(&path, offset, &data)?;
            let versions = fs.versions(&path)?;
            println!(
                "Wrote {written} bytes to {path} (version {})",
                versions.len()
            );
        }
        Commands::Touch { path, mode } => {
            fs.create(&path, mode)?;
            println!("Created {path}");
        }
        Commands::Rm { path } => {
            fs.unlink(&path)?;
            println!("Removed {path}");
        }
        Commands::Mkdir { path, mode } => {
            fs.mkdir(&path, mode)?;
            println!("Created directory {path}");
        }
        Commands::Rmdir { path } => {
            fs.rmdir(&path)?;
            println!("Removed directory {path}");
        }
        Commands::Truncate { path, size } => {
            fs.truncate(&path, size)?;
            println!("Truncated {path} to {size} bytes");
        }
        Commands::Log { path } => {
            let versions = fs.versions(&path)?;
            println!("{:<8} {:<12} BLOB", "VERSION", "TIMESTAMP");
            for version in versions {
                println!(
                    "{:<8} {:<12} {}",
                    version.version_id.get(),
                    version.timestamp,
                    version.blob_ref.display()
                );
            }
        }
    }

    Ok(())
}
