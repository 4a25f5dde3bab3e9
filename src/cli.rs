use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backfill missing thumbnails, then follow bucket notifications until interrupted
    Run,

    /// Generate all missing thumbnails once and exit
    Backfill,

    /// List media keys that have no thumbnail yet
    Missing,

    /// Generate the thumbnail for a single media object
    Generate {
        /// Key of the media object
        #[arg(short, long)]
        key: String,

        /// Content fingerprint used to name the temporary files
        #[arg(short, long)]
        etag: Option<String>,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Output configuration file
        #[arg(short, long, default_value = "thumbnailer.toml")]
        output: PathBuf,
    },
}
