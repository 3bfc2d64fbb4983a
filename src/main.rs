//! ssgen - a static site generator for Markdown sites.

mod build;
mod cli;
mod compiler;
mod config;
mod content;
mod logger;
mod serve;
mod templates;
mod utils;
mod watch;

use anyhow::Result;
use build::build_site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_site;
use std::path::Path;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config: &'static SiteConfig = Box::leak(Box::new(load_config(&cli)?));

    match &cli.command {
        Commands::Build => build_site(config).map(|_| ()),
        Commands::Serve { .. } => {
            build_site(config)?;
            serve_site(config)
        }
    }
}

/// Load, merge and validate configuration from CLI arguments.
///
/// The config file is optional; without it defaults and flags apply.
fn load_config(cli: &Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli);
    config.validate()?;
    logger::set_debug(config.build.debug);
    if config.config_path.exists() {
        debug!("using config '{}'", config.config_path.display());
    }

    Ok(config)
}
