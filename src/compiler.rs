//! Page compilation.
//!
//! Renders every loaded document with the template its location selects and
//! writes it under the output root. Resolution rules live in
//! [`crate::utils::slug`]; this module only drives them.

use crate::{
    content::Site,
    debug,
    templates::{self, Templates},
    utils::slug,
};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("template `{0}` not found")]
    TemplateNotFound(String),

    #[error("cannot render `{path}` with `{template}`")]
    Render {
        path: String,
        template: String,
        #[source]
        source: minijinja::Error,
    },

    #[error("IO error when writing `{0}`")]
    Io(PathBuf, #[source] io::Error),
}

/// Render and write every document of `site` into `output_root`.
///
/// Stops at the first failure; pages written before it stay on disk.
/// Returns the number of pages written.
pub fn compile(
    site: &Site,
    templates: &Templates,
    output_root: &Path,
) -> Result<usize, CompileError> {
    let root = templates::index_value(&site.tree);
    let mut written = 0;

    for document in &site.documents {
        if document.metadata.contains_key("skip") {
            debug!("skipping output of file '{}'...", document.source.display());
            continue;
        }

        let template = slug::template_name(&document.path, &document.metadata);
        if !templates.contains(&template) {
            return Err(CompileError::TemplateNotFound(template));
        }

        let target = slug::write_target(output_root, &document.path, &document.metadata);
        debug!(
            "compiling '{}' with '{}' to '{}'...",
            document.source.display(),
            template,
            target.display()
        );

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| CompileError::Io(parent.to_path_buf(), e))?;
        }
        let html = templates
            .render(&template, document, &root)
            .map_err(|source| CompileError::Render {
                path: document.path.clone(),
                template: template.clone(),
                source,
            })?;
        fs::write(&target, html).map_err(|e| CompileError::Io(target.clone(), e))?;
        written += 1;
    }

    Ok(written)
}
