//! tidescale - self-hosted control server for a mesh overlay network

use clap::Parser;
use color_eyre::eyre::Result;
use tidescale::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(cmd) => cmd.run().await,
        Command::Authkeys(cmd) => cmd.run().await,
    }
}
