//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Render a directory of TypeScript page modules to HTML
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root directory (default: current directory)
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Page directory path (relative to project root)
    #[arg(short, long)]
    pub pages: Option<PathBuf>,

    /// Config file name (default: tspages.toml)
    #[arg(short = 'C', long, default_value = "tspages.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Render every page, format it and write the bundle
    Build {
        /// Clean output directory completely before building
        #[arg(long)]
        clean: bool,

        /// Output directory path (relative to project root)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Serve pages on demand. Reload the browser on change automatically
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short = 'P', long)]
        port: Option<u16>,

        /// enable watch
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,
    },

    /// Print the build entry map as JSON
    Entries,
}
