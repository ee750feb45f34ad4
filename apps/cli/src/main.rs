//! artmatch CLI: match artworks to buyers with a language model.
//!
//! Reads a buyer table and an artwork table, labels every artwork with
//! buyer-side attribute values, and writes the enriched table plus a
//! ranked recommendation table.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
