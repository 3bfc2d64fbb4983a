//! Content loading error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading the source tree.
///
/// Any of these aborts the whole load: a site is never built from a
/// partially parsed tree.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("IO error when walking the source tree")]
    Walk(#[from] walkdir::Error),

    #[error("cannot render `{path}`: {message}")]
    Render { path: PathBuf, message: String },

    #[error("invalid front matter in `{path}`: {message}")]
    Metadata { path: PathBuf, message: String },

    #[error("`published` in `{path}` must be a string or a date, found {found}")]
    MetadataType { path: PathBuf, found: &'static str },
}
