//! tspages - render a directory of TypeScript page modules to HTML.

mod build;
mod cli;
mod config;
mod host;
mod page;
mod plugin;
mod reload;
mod serve;
mod utils;
mod watch;

use anyhow::{Context, Result};
use build::build_site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use page::{PageRoot, collect_entries};
use serve::serve_site;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SiteConfig::load(&cli)?;

    match &cli.command {
        Commands::Build { .. } => build_site(&config).map(|_| ()),
        Commands::Serve { .. } => serve_site(&config),
        Commands::Entries => print_entries(&config),
    }
}

/// Print the build entry map as JSON on stdout.
fn print_entries(config: &SiteConfig) -> Result<()> {
    let entries = collect_entries(&PageRoot::from_config(&config.pages))?;
    let json = serde_json::to_string_pretty(&entries).context("Failed to serialize entries")?;
    println!("{json}");
    Ok(())
}
