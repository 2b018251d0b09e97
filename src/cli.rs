use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "logship")]
#[command(about = "Batch access-log lines into object storage", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Read newline-delimited entries from stdin and ship them
    Pipe(PipeArgs),
}

#[derive(clap::Args, Debug)]
pub struct PipeArgs {
    /// Project the entries belong to
    #[arg(long)]
    pub project: String,

    /// Destination bucket
    #[arg(long)]
    pub bucket: String,

    /// Object key prefix for shipments
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Configuration file (defaults to $LOGSHIP_CONFIG or config/logship.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}
