mod cli;
mod pipe;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logship::observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Pipe(args) => pipe::run(args).await?,
    }

    Ok(())
}
