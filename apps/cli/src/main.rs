//! Distill CLI: turn an academic paper into a structured Obsidian note.
//!
//! A reasoning service drives the parse, digest, link, gap-analysis and
//! note-writing steps; this binary wires the services from config and
//! reports progress.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env is fine; variables may come from the shell.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
