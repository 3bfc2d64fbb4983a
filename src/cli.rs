//! Command-line interface definitions.
//!
//! Defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ssgen static site generator CLI
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Project root, other paths are relative to it
    #[arg(short, long)]
    pub root: Option<PathBuf>,

    /// Directory holding the markdown sources
    #[arg(short, long)]
    pub content: Option<PathBuf>,

    /// Output directory for the compiled site
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Directory holding page templates (and `include/` fragments)
    #[arg(short, long)]
    pub templates: Option<PathBuf>,

    /// Directory served verbatim at `/static` by the dev server
    #[arg(short = 's', long = "static")]
    pub static_dir: Option<PathBuf>,

    /// Print debug messages
    #[arg(short, long)]
    pub debug: bool,

    /// Config file name (default: ssgen.toml)
    #[arg(short = 'C', long, default_value = "ssgen.toml")]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Compile the content tree into the output directory once
    Build,

    /// Compile, then serve the output. Rebuild and reload on change automatically
    Serve {
        /// Interface to bind on
        #[arg(short, long)]
        interface: Option<String>,

        /// The port you should provide
        #[arg(short, long)]
        port: Option<u16>,

        /// Rebuild when sources or templates change
        #[arg(short, long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        watch: Option<bool>,

        /// Inject the reloader script and expose `/reload`
        #[arg(short = 'R', long, action = clap::ArgAction::Set, num_args = 0..=1, default_missing_value = "true", require_equals = false)]
        reload: Option<bool>,
    },
}
