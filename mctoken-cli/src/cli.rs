use std::path::PathBuf;

use clap::Parser;

/// Convert refresh tokens into game-service access tokens.
#[derive(Debug, Parser)]
#[command(name = "mctoken", version, about)]
pub struct Args {
    /// Path to the JSON configuration file
    #[arg(short, long, env = "MCTOKEN_CONFIG", default_value = "config.json")]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}
