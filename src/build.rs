//! Site building orchestration.
//!
//! ```text
//! build_site()
//!     │
//!     ├── content::load()     ──► documents + directory index
//!     ├── Templates::load()   ──► page templates + includes + main
//!     └── compiler::compile() ──► output tree
//! ```
//!
//! Every call is a full rebuild: nothing is cached between runs.

use crate::{compiler, config::SiteConfig, content, log, templates::Templates};
use anyhow::{Context, Result};

/// Load, render and write the whole site. Returns the number of pages written.
pub fn build_site(config: &SiteConfig) -> Result<usize> {
    let build = &config.build;
    log!(
        "build";
        "compiling '{}' to '{}'...",
        build.content.display(),
        build.output.display()
    );

    let site = content::load(&build.content).context("Failed to load content")?;
    let templates = Templates::load(&build.templates, config.inject_reloader())
        .context("Failed to load templates")?;
    let written = compiler::compile(&site, &templates, &build.output)?;

    log!("build"; "{written} pages written");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir) -> SiteConfig {
        let mut config = SiteConfig::default();
        config.build.content = dir.path().join("src");
        config.build.templates = dir.path().join("templates");
        config.build.output = dir.path().join("build");
        config
    }

    #[test]
    fn test_build_site_writes_pages() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir_all(config.build.content.join("posts")).unwrap();
        fs::create_dir_all(&config.build.templates).unwrap();
        fs::write(config.build.content.join("posts/a.md"), "# A").unwrap();
        fs::write(config.build.templates.join("posts.html"), "{{ file.body }}{{ reloader() }}").unwrap();

        assert_eq!(build_site(&config).unwrap(), 1);
        let html = fs::read_to_string(config.build.output.join("posts/a/index.html")).unwrap();
        assert!(html.starts_with("<h1 id=\"a\">A"));
        assert!(!html.contains("EventSource"));
    }

    #[test]
    fn test_build_site_injects_reloader_when_serving() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(&dir);
        config.serve.enabled = true;
        config.serve.reload = true;
        fs::create_dir_all(&config.build.content).unwrap();
        fs::create_dir_all(&config.build.templates).unwrap();
        fs::write(config.build.content.join("about.md"), "hi").unwrap();
        fs::write(config.build.templates.join("about.html"), "{{ reloader() }}").unwrap();

        build_site(&config).unwrap();
        let html = fs::read_to_string(config.build.output.join("about/index.html")).unwrap();
        assert!(html.contains("EventSource"));
    }

    #[test]
    fn test_build_site_reports_missing_template() {
        let dir = TempDir::new().unwrap();
        let config = config_in(&dir);
        fs::create_dir_all(&config.build.content).unwrap();
        fs::write(config.build.content.join("about.md"), "hi").unwrap();

        let err = build_site(&config).unwrap_err();
        assert!(err.to_string().contains("about.html"));
    }
}
