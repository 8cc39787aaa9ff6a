use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "westio", version, about = "Inspect and manage weighted-ensemble iteration stores")]
pub struct Cli {
    /// Increase log verbosity (-v: debug, -vv: trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new, empty iteration store.
    Create(CreateArgs),
    /// Print the attributes and per-iteration summary of a store.
    Info(InfoArgs),
}

#[derive(Debug, clap::Args)]
pub struct CreateArgs {
    /// Path of the store file to create.
    pub path: PathBuf,

    /// Optional TOML file overriding the store configuration.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, clap::Args)]
pub struct InfoArgs {
    /// Path of an existing store file.
    pub path: PathBuf,
}
