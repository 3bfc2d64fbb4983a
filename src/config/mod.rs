//! Site configuration management for `ssgen.toml`.
//!
//! # Sections
//!
//! | Section     | Purpose                                           |
//! |-------------|---------------------------------------------------|
//! | `[build]`   | Source, output, template and static directories   |
//! | `[serve]`   | Development server (interface, port, watch, reload) |
//!
//! The file is optional: without it every field takes its default and the
//! CLI flags alone describe the site.
//!
//! # Example
//!
//! ```toml
//! [build]
//! content = "src"
//! output = "build"
//!
//! [serve]
//! port = 8080
//! reload = true
//! ```

mod build;
mod defaults;
mod error;
mod serve;

use build::BuildConfig;
use error::ConfigError;
use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing ssgen.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Development server settings
    #[serde(default)]
    pub serve: ServeConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: SiteConfig = toml::from_str(content).map_err(ConfigError::from)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf());
    }

    /// Whether rendered pages carry the reloader snippet.
    ///
    /// Only meaningful while serving: a plain build never links to `/reload`.
    pub const fn inject_reloader(&self) -> bool {
        self.serve.enabled && self.serve.reload
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());

        Self::update_option(&mut self.build.content, cli.content.as_ref());
        Self::update_option(&mut self.build.output, cli.output.as_ref());
        Self::update_option(&mut self.build.templates, cli.templates.as_ref());
        Self::update_option(&mut self.build.static_dir, cli.static_dir.as_ref());
        self.build.debug |= cli.debug;

        self.update_path_with_root(&root, &cli.config);

        if let Commands::Serve {
            interface,
            port,
            watch,
            reload,
        } = &cli.command
        {
            self.serve.enabled = true;
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
            Self::update_option(&mut self.serve.reload, reload.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Update all paths relative to root directory and normalize to absolute paths
    fn update_path_with_root(&mut self, root: &Path, config_name: &Path) {
        let root = Self::normalize_path(root);
        self.set_root(&root);

        self.config_path = Self::normalize_path(&root.join(config_name));
        self.build.content = Self::normalize_path(&root.join(&self.build.content));
        self.build.output = Self::normalize_path(&root.join(&self.build.output));
        self.build.templates = Self::normalize_path(&root.join(&self.build.templates));
        self.build.static_dir = Self::normalize_path(&root.join(&self.build.static_dir));
    }

    /// Normalize a path to absolute, using canonicalize if the path exists
    fn normalize_path(path: &Path) -> PathBuf {
        path.canonicalize().unwrap_or_else(|_| {
            // For non-existent paths, manually make them absolute
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                std::env::current_dir()
                    .map(|cwd| cwd.join(path))
                    .unwrap_or_else(|_| path.to_path_buf())
            }
        })
    }

    /// Validate the merged configuration
    pub fn validate(&self) -> Result<()> {
        let content = &self.build.content;
        if !content.exists() {
            bail!(ConfigError::Validation(format!(
                "[build.content] `{}` not found",
                content.display()
            )));
        }
        if !content.is_dir() {
            bail!(ConfigError::Validation(format!(
                "[build.content] `{}` is not a directory",
                content.display()
            )));
        }
        if self.serve.enabled && self.serve.interface.parse::<std::net::IpAddr>().is_err() {
            bail!(ConfigError::Validation(format!(
                "[serve.interface] `{}` is not an IP address",
                self.serve.interface
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::fs;
    use tempfile::TempDir;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_from_str_rejects_unknown_section() {
        assert!(SiteConfig::from_str("[deploy]\nforce = true\n").is_err());
    }

    #[test]
    fn test_from_path_missing_file() {
        let err = SiteConfig::from_path(Path::new("/definitely/missing/ssgen.toml")).unwrap_err();
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_cli_overrides_and_root_join() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = cli(&["ssgen", "--root", root, "-c", "posts", "-o", "public", "build"]);

        let mut config = SiteConfig::default();
        config.update_with_cli(&cli);

        let root = dir.path().canonicalize().unwrap();
        assert_eq!(config.build.content, root.join("posts"));
        assert_eq!(config.build.output, root.join("public"));
        assert_eq!(config.build.templates, root.join("templates"));
        assert_eq!(config.config_path, root.join("ssgen.toml"));
        assert!(!config.serve.enabled);
        assert!(!config.inject_reloader());
    }

    #[test]
    fn test_serve_flags_enable_reloader() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().to_str().unwrap();
        let cli = cli(&["ssgen", "--root", root, "serve", "--port", "9000", "--reload"]);

        let mut config = SiteConfig::default();
        config.update_with_cli(&cli);

        assert!(config.serve.enabled);
        assert_eq!(config.serve.port, 9000);
        assert!(config.inject_reloader());
    }

    #[test]
    fn test_reload_in_file_needs_serve() {
        let mut config = SiteConfig::from_str("[serve]\nreload = true\n").unwrap();
        assert!(!config.inject_reloader());
        config.serve.enabled = true;
        assert!(config.inject_reloader());
    }

    #[test]
    fn test_validate_content_dir() {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.build.content = dir.path().join("src");
        assert!(config.validate().is_err());

        fs::write(&config.build.content, "not a dir").unwrap();
        assert!(config.validate().is_err());

        fs::remove_file(&config.build.content).unwrap();
        fs::create_dir(&config.build.content).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_interface() {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::default();
        config.build.content = dir.path().to_path_buf();
        config.serve.enabled = true;
        config.serve.interface = "localhost".into();
        assert!(config.validate().is_err());
    }
}
