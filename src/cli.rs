//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{IndexerKind, SnapshotKind};
use crate::ledger::CreditPolicy;

#[derive(Parser, Debug)]
#[command(name = "yoki-drops")]
#[command(about = "Season eligibility, address list tooling and rewards submission for Yoki airdrops", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON); missing is fine when flags cover everything
    #[arg(short, long, env = "YOKI_CONFIG", default_value = "config.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay transfers up to the season cutoff and list qualified holders
    Eligibility {
        /// Transfer feed, overrides `indexer.kind`
        #[arg(short, long, value_enum)]
        source: Option<IndexerKind>,

        /// Indexer endpoint, overrides `indexer.url`
        #[arg(long, env = "YOKI_INDEXER_URL")]
        url: Option<String>,

        /// Overrides `season.credit_policy`
        #[arg(long, value_enum)]
        policy: Option<CreditPolicy>,

        /// Stop each token after this many pages
        #[arg(long)]
        max_pages: Option<u32>,

        /// Qualified addresses, one per line
        #[arg(short, long, default_value = "data/eligible.csv")]
        output: PathBuf,

        /// Also write a rewards batch for the qualified addresses
        #[arg(long)]
        batch: Option<PathBuf>,
    },

    /// Read a pre-computed season table from a Squid or subgraph indexer
    Snapshot {
        #[arg(short, long, value_enum)]
        kind: Option<SnapshotKind>,

        #[arg(long, env = "YOKI_SNAPSHOT_URL")]
        url: Option<String>,

        /// Season number (Squid)
        #[arg(long)]
        season: Option<u32>,

        /// Entity collection (The Graph)
        #[arg(long)]
        collection: Option<String>,

        #[arg(short, long, default_value = "data/snapshot.csv")]
        output: PathBuf,
    },

    /// Diff two address lists in both directions
    Compare {
        a: PathBuf,
        b: PathBuf,

        /// Receives `<a>_not_in_<b>.csv`, `<b>_not_in_<a>.csv` and `<a>_and_<b>.csv`
        #[arg(short, long, default_value = "data/diff")]
        out_dir: PathBuf,
    },

    /// Report repeated addresses in a list
    Duplicates {
        file: PathBuf,

        /// How many of the most repeated addresses to print
        #[arg(long, default_value = "10")]
        top: usize,

        /// Write the deduplicated list here
        #[arg(long)]
        dedup_output: Option<PathBuf>,
    },

    /// Turn an address list into rewards batch JSON
    Batch {
        input: PathBuf,

        #[arg(short, long, default_value = "data/batch.json")]
        output: PathBuf,

        #[arg(long)]
        defi_id: Option<u64>,

        /// Fixed amount per user
        #[arg(long, conflicts_with = "pool")]
        amount: Option<u64>,

        /// Total to split evenly, rounded down
        #[arg(long)]
        pool: Option<u64>,

        #[arg(long)]
        description: Option<String>,
    },

    /// Sign and submit rewards batch files
    Send {
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print the signed request instead of sending it
        #[arg(long)]
        dry_run: bool,

        /// Overrides `rewards.endpoint`
        #[arg(long)]
        endpoint: Option<String>,
    },
}
