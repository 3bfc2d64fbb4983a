//! `[build]` section configuration.
//!
//! Contains the source, output, template and static directories.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in ssgen.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// content = "src"          # Markdown sources
/// output = "build"         # Compiled site
/// templates = "templates"  # Page templates, fragments under templates/include
/// static = "static"        # Served at /static by the dev server
/// debug = true             # Print debug messages
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Markdown source directory.
    #[serde(default = "defaults::build::content")]
    #[educe(Default = defaults::build::content())]
    pub content: PathBuf,

    /// Build output directory.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Page template directory.
    #[serde(default = "defaults::build::templates")]
    #[educe(Default = defaults::build::templates())]
    pub templates: PathBuf,

    /// Static files served verbatim at `/static`.
    #[serde(rename = "static", default = "defaults::build::static_dir")]
    #[educe(Default = defaults::build::static_dir())]
    pub static_dir: PathBuf,

    /// Print debug messages.
    #[serde(default = "defaults::r#false")]
    #[educe(Default = false)]
    pub debug: bool,
}

impl BuildConfig {
    /// Directory of shared template fragments.
    pub fn includes(&self) -> PathBuf {
        self.templates.join("include")
    }
}
