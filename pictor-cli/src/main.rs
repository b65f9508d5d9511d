//! pictor-cli — admin frontend for the Pictor embedding service and its
//! vector collection
//!
//! # Subcommands
//! - `init`           — drop and recreate the vector collection
//! - `backfill [DIR]` — embed every image in a directory and insert the vectors
//! - `status`         — show service health and collection size

mod backfill;
mod init;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pictor_core::PictorConfig;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "pictor-cli",
    version,
    about = "Pictor vector collection admin CLI"
)]
struct Cli {
    /// Path to the config file
    #[arg(short, long, default_value = "pictor.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the vector collection, dropping any existing one
    Init,

    /// Embed every image in a directory via the running service and insert
    /// the vectors into the collection
    Backfill {
        /// Image directory; defaults to `[backfill].image_dir` from config
        dir: Option<PathBuf>,
    },

    /// Show embedding service health and collection size
    Status,
}

#[tokio::main]
async fn main() {
    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let cli = Cli::parse();

    let config = match PictorConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Init => init::run(&config).await,
        Commands::Backfill { dir } => backfill::run(&config, dir).await,
        Commands::Status => status::run(&config).await,
    };

    if let Err(e) = result {
        eprintln!("pictor-cli: {}", e);
        std::process::exit(1);
    }
}
