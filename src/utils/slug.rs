//! URL slugification and site path utilities.
//!
//! Site paths are `/`-separated, rooted at `/` and carry no extension:
//! `src/posts/hello.md` becomes `/posts/hello`. Everything here is a pure
//! string transform so the compiler and the loader agree on every edge case.
//!
//! # Path Mapping Examples
//!
//! | Source                | site path         | template      | written to                    |
//! |-----------------------|-------------------|---------------|-------------------------------|
//! | `about.md`            | `/about`          | `about.html`  | `build/about/index.html`      |
//! | `post.extra.md`       | `/post.extra`     | `post.html`   | `build/post.extra/index.html` |
//! | `posts/hello.md`      | `/posts/hello`    | `posts.html`  | `build/posts/hello/index.html`|
//! | `posts/index.md`      | `/posts/index`    | `posts.html`  | `build/posts/index.html`      |

use crate::content::Metadata;
use regex::Regex;
use std::{
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

/// Name of the bootstrap template used when resolution lands on the site root.
pub const MAIN_TEMPLATE: &str = "main";

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static NOT_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9\-\s]").unwrap());

// ============================================================================
// Slugification
// ============================================================================

/// Convert a label to a URL slug.
///
/// Lowercases and trims, collapses whitespace runs into one `-`, then drops
/// every character outside `[A-Za-z0-9-]`.
///
/// `"Hello, World!  Foo"` → `"hello-world-foo"`
pub fn slugify(label: &str) -> String {
    let slug = label.trim().to_lowercase();
    let slug = WHITESPACE.replace_all(&slug, "-");
    NOT_SLUG.replace_all(&slug, "").into_owned()
}

// ============================================================================
// Site Path Primitives
// ============================================================================

/// Lexically clean a `/`-separated path: drop empty and `.` segments and
/// resolve `..` without leaving the root.
fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".into();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            segment => parts.push(segment),
        }
    }

    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".into(),
        (false, false) => joined,
    }
}

/// Parent directory of a site path. `"/about"` → `"/"`, `"about"` → `"."`.
pub fn dir(path: &str) -> String {
    match path.rfind('/') {
        Some(i) => clean(&path[..=i]),
        None => ".".into(),
    }
}

/// Last element of a site path. `"/"` → `"/"`, `""` → `"."`.
pub fn base(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rfind('/').map_or(trimmed, |i| &trimmed[i + 1..])
}

/// Join two site path fragments and clean the result.
pub fn join(dir: &str, name: &str) -> String {
    match (dir.is_empty(), name.is_empty()) {
        (true, true) => String::new(),
        (true, false) => clean(name),
        (false, true) => clean(dir),
        (false, false) => clean(&format!("{dir}/{name}")),
    }
}

// ============================================================================
// Document Paths
// ============================================================================

/// Site path of a source file given its location relative to the source root.
///
/// The final extension is dropped, earlier dots are kept:
/// `posts/post.extra.md` → `/posts/post.extra`.
pub fn site_path(relative: &Path) -> String {
    let stripped = relative.with_extension("");
    let segments: Vec<String> = stripped
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    format!("/{}", segments.join("/"))
}

/// Apply `name` and `slug` metadata overrides to a site path.
///
/// `name` is slugified, `slug` is taken literally; both replace the last
/// segment, and `slug` wins when both are present.
pub fn apply_overrides(path: String, metadata: &Metadata) -> String {
    let parent = dir(&path);
    let mut path = path;
    if let Some(name) = metadata.get("name") {
        path = join(&parent, &slugify(&name.to_string()));
    }
    if let Some(slug) = metadata.get("slug") {
        path = join(&parent, &slug.to_string());
    }
    path
}

/// Resolve the registry name of the template that renders a document.
///
/// 1. The base name of the document's directory selects the template.
/// 2. Documents at the site root use their file name up to the first `.`.
/// 3. Paths without any directory use the whole path.
/// 4. A `template` metadata value replaces all of the above verbatim.
///
/// The result is `"<name>.html"`, or [`MAIN_TEMPLATE`] when the name is `/`.
pub fn template_name(path: &str, metadata: &Metadata) -> String {
    let parent = dir(path);
    let mut name = match base(&parent) {
        "/" => {
            let file = base(path);
            file.split_once('.').map_or(file, |(head, _)| head).to_owned()
        }
        "." => path.to_owned(),
        dir_name => dir_name.to_owned(),
    };
    if let Some(template) = metadata.get("template") {
        name = template.to_string();
    }

    if name == "/" {
        MAIN_TEMPLATE.into()
    } else {
        format!("{name}.html")
    }
}

/// Site location a document is rendered to: its path, or `dir/slug` when a
/// `slug` is set.
pub fn output_location(path: &str, metadata: &Metadata) -> String {
    match metadata.get("slug") {
        Some(slug) => join(&dir(path), &slug.to_string()),
        None => path.to_owned(),
    }
}

/// File a document is written to under `output_root`.
///
/// Paths ending in `/index` become `<location>.html`; everything else
/// becomes `<location>/index.html` so it is reachable at `<location>/`.
pub fn write_target(output_root: &Path, path: &str, metadata: &Metadata) -> PathBuf {
    let location = output_location(path, metadata);
    let relative = location.trim_start_matches('/');

    if path.ends_with("/index") {
        output_root.join(format!("{relative}.html"))
    } else {
        output_root.join(relative).join("index.html")
    }
}
