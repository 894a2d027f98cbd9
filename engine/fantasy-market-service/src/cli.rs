//! Command line arguments

use clap::Parser;
use league_store::LeagueId;
use std::path::PathBuf;

/// Fantasy league market service
#[derive(Parser, Debug)]
#[command(name = "fantasy-market")]
#[command(version, about = "Runs the fantasy league market: auctions, rotation and the HTTP gateway")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Seed this league from `--catalog` before serving
    #[arg(long, requires = "catalog")]
    pub seed_league: Option<LeagueId>,

    /// JSON array of catalog entries (`kind`, `catalog_id`, `value`)
    #[arg(long, requires = "seed_league")]
    pub catalog: Option<PathBuf>,
}
