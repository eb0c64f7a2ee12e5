//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Song download bot
///
/// Fetches audio for links sent in chat and replies with the files.
#[derive(Parser, Debug)]
#[command(name = "songbot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (defaults to SONGBOT_CONFIG or the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to Telegram and serve requests until Ctrl-C
    Run,

    /// Check tool, config, token and workspace setup
    Doctor,

    /// Download a URL into a local directory without messaging
    Fetch {
        /// Track, album or playlist URL
        url: String,

        /// Directory to copy the audio files into
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// Show version
    Version,
}
