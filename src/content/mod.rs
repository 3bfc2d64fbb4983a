//! Source tree loading.
//!
//! Walks the content root in file name order, renders every Markdown file
//! and groups the resulting documents by directory:
//!
//! ```text
//! src/
//! ├── about.md              → /about           (not indexed)
//! ├── .drafts/              → pruned
//! └── posts/
//!     ├── index.md          → /posts/index     tree["posts"]
//!     └── 2024/hello.md     → /posts/2024/hello tree["posts.2024"]
//! ```

mod error;
mod fences;
mod markdown;
mod meta;

pub use error::ContentError;
pub use meta::{MetaValue, Metadata};

use crate::{debug, utils::slug};
use chrono::{DateTime, Local};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};
use walkdir::{DirEntry, WalkDir};

/// Extensions (lowercase) treated as Markdown sources.
const MARKDOWN_EXTENSIONS: [&str; 2] = ["md", "markdown"];

/// Documents grouped by the dotted key of their directory.
pub type DirectoryIndex = BTreeMap<String, Vec<Arc<Document>>>;

/// One rendered source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// File on disk the document was read from
    pub source: PathBuf,
    /// Site path without extension, after `name`/`slug` overrides
    pub path: String,
    /// Front matter, always holding `published`
    pub metadata: Metadata,
    /// Rendered HTML body
    pub body: String,
}

/// Everything one load pass produces.
#[derive(Debug, Default)]
pub struct Site {
    /// Documents in walk order
    pub documents: Vec<Arc<Document>>,
    pub tree: DirectoryIndex,
}

impl Site {
    fn insert(&mut self, document: Document) {
        let document = Arc::new(document);
        let key = tree_key(&document.path);
        if !key.is_empty() {
            self.tree.entry(key).or_default().push(Arc::clone(&document));
        }
        self.documents.push(document);
    }
}

/// Dotted index key of a document's directory: `/posts/2024/a` → `posts.2024`.
pub fn tree_key(path: &str) -> String {
    slug::dir(path).trim_start_matches('/').replace('/', ".")
}

/// Load every Markdown document under `root`.
///
/// Hidden entries are pruned with their whole subtree. Siblings are visited
/// in file name order so repeated builds see the same document order.
pub fn load(root: &Path) -> Result<Site, ContentError> {
    let mut site = Site::default();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));

    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_dir() || !is_markdown(entry.path()) {
            continue;
        }
        debug!("parsing '{}'...", entry.path().display());
        site.insert(parse(root, entry.path())?);
    }

    Ok(site)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.file_name().to_string_lossy().starts_with('.')
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MARKDOWN_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Read and render one source file.
fn parse(root: &Path, file: &Path) -> Result<Document, ContentError> {
    let io_err = |err| ContentError::Io(file.to_path_buf(), err);

    let bytes = fs::read(file).map_err(io_err)?;
    let modified = fs::metadata(file)
        .and_then(|m| m.modified())
        .map_err(io_err)?;
    let text = String::from_utf8(bytes).map_err(|e| ContentError::Render {
        path: file.to_path_buf(),
        message: e.to_string(),
    })?;

    let relative = file.strip_prefix(root).unwrap_or(file);
    let (body, mut metadata) = markdown::render_body(file, &text)?;
    let path = slug::apply_overrides(slug::site_path(relative), &metadata);

    match metadata.get("published") {
        None => {
            metadata.insert("published".into(), default_published(modified));
        }
        Some(MetaValue::Text(_) | MetaValue::Timestamp(_)) => {}
        Some(other) => {
            return Err(ContentError::MetadataType {
                path: file.to_path_buf(),
                found: other.kind(),
            });
        }
    }

    Ok(Document {
        source: file.to_path_buf(),
        path,
        metadata,
        body,
    })
}

/// `published` fallback: the file's modification date as `YYYY/MM/DD`.
fn default_published(modified: SystemTime) -> MetaValue {
    let local: DateTime<Local> = modified.into();
    MetaValue::Text(local.format("%Y/%m/%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn paths(site: &Site) -> Vec<&str> {
        site.documents.iter().map(|d| d.path.as_str()).collect()
    }

    #[test]
    fn test_tree_key() {
        assert_eq!(tree_key("/posts/2024/a"), "posts.2024");
        assert_eq!(tree_key("/posts/a"), "posts");
        assert_eq!(tree_key("/about"), "");
    }

    #[test]
    fn test_is_markdown_case_insensitive() {
        assert!(is_markdown(Path::new("a.md")));
        assert!(is_markdown(Path::new("a.MarkDown")));
        assert!(is_markdown(Path::new("a.MD")));
        assert!(!is_markdown(Path::new("a.txt")));
        assert!(!is_markdown(Path::new("md")));
    }

    #[test]
    fn test_load_sorted_and_indexed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "posts/b.md", "B");
        write(root, "posts/a.md", "A");
        write(root, "about.md", "About");
        write(root, "posts/2024/c.markdown", "C");
        write(root, "notes.txt", "ignored");

        let site = load(root).unwrap();
        assert_eq!(
            paths(&site),
            ["/about", "/posts/2024/c", "/posts/a", "/posts/b"]
        );

        let keys: Vec<&str> = site.tree.keys().map(String::as_str).collect();
        assert_eq!(keys, ["posts", "posts.2024"]);
        let posts: Vec<&str> = site.tree["posts"].iter().map(|d| d.path.as_str()).collect();
        assert_eq!(posts, ["/posts/a", "/posts/b"]);
    }

    #[test]
    fn test_hidden_entries_pruned() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, ".drafts/secret.md", "hidden");
        write(root, "posts/.wip.md", "hidden");
        write(root, "posts/ok.md", "visible");

        let site = load(root).unwrap();
        assert_eq!(paths(&site), ["/posts/ok"]);
    }

    #[test]
    fn test_published_defaults_to_mtime() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "body");

        let site = load(dir.path()).unwrap();
        let published = site.documents[0].metadata["published"].as_text().unwrap();
        let expected = Local::now().format("%Y/%m/%d").to_string();
        // the file was written moments ago
        assert_eq!(published, expected);
    }

    #[test]
    fn test_published_kept_when_given() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "---\npublished: 2020-05-01\n---\nbody");
        write(dir.path(), "b.md", "@published = someday\nbody");

        let site = load(dir.path()).unwrap();
        assert_eq!(
            site.documents[0].metadata["published"].to_string(),
            "2020-05-01"
        );
        assert_eq!(
            site.documents[1].metadata["published"],
            MetaValue::Text("someday".into())
        );
    }

    #[test]
    fn test_published_wrong_type() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "---\npublished: true\n---\nbody");

        let err = load(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ContentError::MetadataType { found: "boolean", .. }
        ));
    }

    #[test]
    fn test_name_and_slug_overrides() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write(root, "posts/a.md", "---\nname: My First Post\n---\n");
        write(root, "posts/b.md", "---\nname: Ignored\nslug: literal_Slug\n---\n");

        let site = load(root).unwrap();
        assert_eq!(paths(&site), ["/posts/my-first-post", "/posts/literal_Slug"]);
        assert_eq!(site.documents[0].source, root.join("posts/a.md"));
    }

    #[test]
    fn test_invalid_utf8_is_render_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.md"), [0xff, 0xfe, 0x00]).unwrap();

        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, ContentError::Render { .. }));
    }

    #[test]
    fn test_missing_root_is_walk_error() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, ContentError::Walk(_)));
    }
}
