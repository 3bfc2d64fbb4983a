//! Request path resolution against a served directory.
//!
//! Resolution never touches the response: it maps a decoded URL path to a
//! file to send, a redirect or an error, so the rules are testable without
//! a socket.
//!
//! | Request       | On disk                  | Result              |
//! |---------------|--------------------------|---------------------|
//! | `/foo`        | `foo/` (directory)       | 301 → `/foo/`       |
//! | `/foo/`       | `foo/index.html`         | 200 `foo/index.html`|
//! | `/foo/`       | no index candidate       | 404                 |
//! | `/foo/index.html` | file                 | 301 → `/foo/`       |
//! | `/a.css/`     | file                     | 301 → `/a.css`      |

use crate::utils::slug;
use std::{
    fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Directory index candidates, in priority order.
pub const INDEX_PAGES: [&str; 6] = [
    "index.html",
    "index.htm",
    "index.txt",
    "default.html",
    "default.htm",
    "default.txt",
];

#[derive(Debug, PartialEq, Eq)]
pub enum Resolved {
    File {
        path: PathBuf,
        modified: Option<SystemTime>,
    },
    /// 301 to a site path (not yet percent-encoded)
    Redirect(String),
    Error { status: u16, body: String },
}

impl Resolved {
    /// Map an IO failure to the status the file server reports.
    pub fn from_io(err: &io::Error) -> Self {
        let (status, body) = match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => (404, "not found".into()),
            io::ErrorKind::PermissionDenied => (403, "permission denied".into()),
            _ => (500, err.to_string()),
        };
        Self::Error { status, body }
    }

    fn not_found() -> Self {
        Self::from_io(&io::ErrorKind::NotFound.into())
    }

    fn redirect(path: &str) -> Self {
        Self::Redirect(format!("/{}", path.trim_start_matches('/')))
    }
}

/// Resolve `url_path` (decoded, without query) under `root`.
///
/// `..` segments are resolved lexically and never leave `root`.
pub fn resolve(root: &Path, url_path: &str) -> Resolved {
    let mut path = slug::join("/", url_path);
    if url_path.ends_with('/') && path != "/" {
        path.push('/');
    }
    let local = root.join(path.trim_matches('/'));

    let meta = match fs::metadata(&local) {
        Ok(meta) => meta,
        Err(err) => return Resolved::from_io(&err),
    };

    if meta.is_dir() {
        if !path.ends_with('/') {
            return Resolved::redirect(&format!("{path}/"));
        }
        return resolve_index(&local);
    }

    if let Some(trimmed) = path.strip_suffix('/') {
        return Resolved::redirect(trimmed);
    }
    let name = slug::base(&path);
    if INDEX_PAGES.contains(&name) {
        return Resolved::redirect(&path[..path.len() - name.len()]);
    }

    Resolved::File {
        path: local,
        modified: meta.modified().ok(),
    }
}

/// First existing index candidate in `dir`. A candidate that turns out to be
/// a directory ends the search with a 404.
fn resolve_index(dir: &Path) -> Resolved {
    for index in INDEX_PAGES {
        let candidate = dir.join(index);
        let Ok(meta) = fs::metadata(&candidate) else {
            continue;
        };
        if meta.is_dir() {
            return Resolved::not_found();
        }
        return Resolved::File {
            path: candidate,
            modified: meta.modified().ok(),
        };
    }
    Resolved::not_found()
}
