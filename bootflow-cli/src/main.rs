//! Bootflow CLI: staged, profile-guided compiler bootstrap.
//!
//! Loads `bootflow.toml`, assembles the stage plan and drives the build
//! tool through it, writing a JSON run report next to the stage directories.

mod commands;

use anyhow::Result;
use clap::Parser;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
