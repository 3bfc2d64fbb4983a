//! Template registry.
//!
//! Page templates are the `*.html` files directly under the templates root;
//! fragments under `include/` are shared by every page. A bootstrap `main`
//! template always exists so documents at the site root render even without
//! any custom template:
//!
//! ```text
//! templates/
//! ├── posts.html        → "posts.html"
//! ├── about.html        → "about.html"
//! └── include/
//!     └── nav.html      → "include/nav.html" (fragment, not a page)
//! ```
//!
//! Templates see `file` (the current document) and `root` (the directory
//! index), plus the helper functions registered in [`Templates::load`].

use crate::{
    content::{DirectoryIndex, Document},
    utils::slug::{self, MAIN_TEMPLATE},
};
use minijinja::{
    AutoEscape, Environment, Value, context,
    value::{DynObject, Enumerator, Object},
};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use walkdir::WalkDir;

/// Subdirectory of the templates root holding shared fragments.
const INCLUDE_DIR: &str = "include";

/// Bootstrap root template. Pages may `{% extends "main" %}` and override `base`.
const MAIN_SOURCE: &str = "{% block base %}{{ debug() }}{% endblock %}";

/// Lines kept by `readmore` when no limit is given.
const READMORE_LINES: usize = 5;

/// Script injected by `reloader()` while serving with live reload.
///
/// Listens on `/reload` and keeps the scroll position across the reload.
const RELOADER_SNIPPET: &str = r#"
<script type="text/javascript">
(function () {
    function listen() {
        var scrollpos = sessionStorage.getItem("scrollpos");
        if (scrollpos) {
            window.scrollTo(0, scrollpos);
            sessionStorage.removeItem("scrollpos");
        }
        var source = new EventSource("/reload");
        source.addEventListener("reload", function () { window.location.reload(); });
    }
    if (document.readyState !== "loading") { listen(); } else {
        document.addEventListener("DOMContentLoaded", listen);
    }
    window.addEventListener("beforeunload", function () {
        sessionStorage.setItem("scrollpos", window.scrollY);
    });
})();
</script>
"#;

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("IO error when reading `{0}`")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("cannot parse template `{path}`")]
    Parse {
        path: PathBuf,
        #[source]
        source: minijinja::Error,
    },
}

/// Compiled templates addressable by name.
pub struct Templates {
    env: Environment<'static>,
    /// Names a document may resolve to: page file names and `main`
    pages: BTreeSet<String>,
}

impl Templates {
    /// Compile every template under `root`.
    ///
    /// A missing `root` (or `include/`) leaves only `main`. `reload` controls
    /// whether `reloader()` emits the live reload script.
    pub fn load(root: &Path, reload: bool) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        register_helpers(&mut env, reload);

        env.add_template(MAIN_TEMPLATE, MAIN_SOURCE)
            .map_err(|source| TemplateError::Parse {
                path: PathBuf::from(MAIN_TEMPLATE),
                source,
            })?;
        let mut pages = BTreeSet::from([MAIN_TEMPLATE.to_owned()]);

        for (name, path) in html_files(&root.join(INCLUDE_DIR))? {
            add_file(&mut env, format!("{INCLUDE_DIR}/{name}"), &path)?;
        }
        for (name, path) in html_files(root)? {
            add_file(&mut env, name.clone(), &path)?;
            pages.insert(name);
        }

        Ok(Self { env, pages })
    }

    /// Whether `name` is a page template (or `main`).
    pub fn contains(&self, name: &str) -> bool {
        self.pages.contains(name)
    }

    /// Render page template `name` for one document.
    pub fn render(
        &self,
        name: &str,
        file: &Arc<Document>,
        root: &Value,
    ) -> Result<String, minijinja::Error> {
        let template = self.env.get_template(name)?;
        template.render(context! {
            file => document_value(file),
            root => root.clone(),
        })
    }
}

/// Directory index as a template value: dotted key → list of documents.
pub fn index_value(tree: &DirectoryIndex) -> Value {
    let map: BTreeMap<String, Value> = tree
        .iter()
        .map(|(key, docs)| {
            let docs: Vec<Value> = docs.iter().map(document_value).collect();
            (key.clone(), Value::from(docs))
        })
        .collect();
    Value::from(map)
}

fn document_value(document: &Arc<Document>) -> Value {
    Value::from_dyn_object(DynObject::new(Arc::clone(document)))
}

impl Object for Document {
    fn get_value(self: &Arc<Self>, key: &Value) -> Option<Value> {
        match key.as_str()? {
            "path" => Some(Value::from(self.path.as_str())),
            "source" => Some(Value::from(self.source.to_string_lossy().into_owned())),
            "metadata" => Some(Value::from_serialize(&self.metadata)),
            "body" => Some(Value::from_safe_string(self.body.clone())),
            _ => None,
        }
    }

    fn enumerate(self: &Arc<Self>) -> Enumerator {
        Enumerator::Str(&["path", "source", "metadata", "body"])
    }
}

/// `*.html` files directly inside `dir`, sorted by name.
fn html_files(dir: &Path) -> Result<Vec<(String, PathBuf)>, TemplateError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            TemplateError::Io(path, e.into())
        })?;
        let is_html = entry.path().extension().is_some_and(|ext| ext == "html");
        if entry.file_type().is_file() && is_html {
            let name = entry.file_name().to_string_lossy().into_owned();
            files.push((name, entry.into_path()));
        }
    }
    Ok(files)
}

fn add_file(env: &mut Environment<'static>, name: String, path: &Path) -> Result<(), TemplateError> {
    let source = fs::read_to_string(path).map_err(|e| TemplateError::Io(path.to_path_buf(), e))?;
    env.add_template_owned(name, source)
        .map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

// ============================================================================
// Helper Functions
// ============================================================================

fn register_helpers(env: &mut Environment<'static>, reload: bool) {
    env.add_function("slugify", |label: String| slug::slugify(&label));
    env.add_filter("slugify", |label: String| slug::slugify(&label));
    env.add_function("readmore", readmore);
    env.add_function("sortItems", sort_items);

    let snippet = move || Value::from_safe_string(reloader_snippet(reload).to_owned());
    env.add_function("reloader", snippet);
    env.add_function("reloaderSnippet", snippet);
}

/// Cut `body` to its first `limit` lines and append a "read more" link.
///
/// Bodies with at most `limit` lines are returned unchanged.
fn readmore(body: String, link: String, limit: Option<usize>) -> Value {
    let limit = limit.unwrap_or(READMORE_LINES);
    let lines: Vec<&str> = body.split('\n').collect();
    if lines.len() <= limit {
        return Value::from_safe_string(body);
    }
    Value::from_safe_string(format!(
        "{}\n<a class=\"read-more\" href=\"{link}\">read more</a>",
        lines[..limit].join("\n")
    ))
}

/// Sort documents by the string value of `metadata[key]`; `-key` reverses.
///
/// Items without a string value under `key` keep their slot; the sortable
/// ones are stably sorted among the remaining slots.
fn sort_items(key: String, items: Vec<Value>) -> Vec<Value> {
    let (key, reverse) = match key.strip_prefix('-') {
        Some(rest) => (rest, true),
        None => (key.as_str(), false),
    };
    if key.is_empty() {
        return items;
    }

    let mut slots = Vec::new();
    let mut sortable = Vec::new();
    for (i, item) in items.iter().enumerate() {
        if let Some(k) = sort_key(item, key) {
            slots.push(i);
            sortable.push((k, item.clone()));
        }
    }

    if reverse {
        sortable.sort_by(|a, b| b.0.cmp(&a.0));
    } else {
        sortable.sort_by(|a, b| a.0.cmp(&b.0));
    }

    let mut sorted = items;
    for (slot, (_, item)) in slots.into_iter().zip(sortable) {
        sorted[slot] = item;
    }
    sorted
}

fn sort_key(item: &Value, key: &str) -> Option<String> {
    let document = item.downcast_object_ref::<Document>()?;
    document.metadata.get(key)?.as_text().map(str::to_owned)
}

const fn reloader_snippet(reload: bool) -> &'static str {
    if reload { RELOADER_SNIPPET } else { "" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{MetaValue, Metadata};
    use tempfile::TempDir;

    fn doc(path: &str, pairs: &[(&str, &str)]) -> Arc<Document> {
        let metadata: Metadata = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), MetaValue::Text((*v).to_owned())))
            .collect();
        Arc::new(Document {
            source: PathBuf::from(format!("src{path}.md")),
            path: path.to_owned(),
            metadata,
            body: format!("<p>{path}</p>"),
        })
    }

    fn paths(values: &[Value]) -> Vec<String> {
        values
            .iter()
            .map(|v| v.downcast_object_ref::<Document>().unwrap().path.clone())
            .collect()
    }

    fn setup(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_sort_items_incomparable_keep_slot() {
        let a = document_value(&doc("/a", &[("date", "2020/01/01")]));
        let b = document_value(&doc("/b", &[]));
        let c = document_value(&doc("/c", &[("date", "2021/01/01")]));

        let sorted = sort_items("date".into(), vec![c.clone(), b.clone(), a.clone()]);
        assert_eq!(paths(&sorted), ["/a", "/b", "/c"]);

        let sorted = sort_items("date".into(), vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(paths(&sorted), ["/a", "/b", "/c"]);

        let sorted = sort_items("-date".into(), vec![a, b, c]);
        assert_eq!(paths(&sorted), ["/c", "/b", "/a"]);
    }

    #[test]
    fn test_sort_items_stable_for_equal_keys() {
        let items = vec![
            document_value(&doc("/x", &[("tag", "b")])),
            document_value(&doc("/y", &[("tag", "a")])),
            document_value(&doc("/z", &[("tag", "a")])),
        ];
        assert_eq!(paths(&sort_items("tag".into(), items)), ["/y", "/z", "/x"]);
    }

    #[test]
    fn test_sort_items_empty_key_is_copy() {
        let items = vec![
            document_value(&doc("/b", &[])),
            document_value(&doc("/a", &[])),
        ];
        assert_eq!(paths(&sort_items("-".into(), items)), ["/b", "/a"]);
    }

    #[test]
    fn test_readmore_limit() {
        let body = "1\n2\n3\n4\n5\n6".to_owned();
        let out = readmore(body.clone(), "/post/".into(), None);
        assert_eq!(
            out.as_str().unwrap(),
            "1\n2\n3\n4\n5\n<a class=\"read-more\" href=\"/post/\">read more</a>"
        );

        let out = readmore(body.clone(), "/post/".into(), Some(6));
        assert_eq!(out.as_str().unwrap(), body);

        let out = readmore(body, "/p/".into(), Some(2));
        assert!(out.as_str().unwrap().starts_with("1\n2\n<a"));
    }

    #[test]
    fn test_reloader_snippet_toggle() {
        assert_eq!(reloader_snippet(false), "");
        assert!(reloader_snippet(true).contains("new EventSource(\"/reload\")"));
        assert!(reloader_snippet(true).contains("sessionStorage"));
    }

    #[test]
    fn test_load_missing_root_has_main_only() {
        let dir = TempDir::new().unwrap();
        let templates = Templates::load(&dir.path().join("missing"), false).unwrap();
        assert!(templates.contains("main"));
        assert!(!templates.contains("posts.html"));
    }

    #[test]
    fn test_pages_and_includes() {
        let dir = setup(&[
            ("posts.html", "{% include \"include/nav.html\" %}|{{ file.path }}|{{ file.body }}"),
            ("include/nav.html", "<nav>{{ slugify(\"Hello World\") }}</nav>"),
            ("notes.txt", "not a template"),
        ]);
        let templates = Templates::load(dir.path(), false).unwrap();
        assert!(templates.contains("posts.html"));
        assert!(!templates.contains("include/nav.html"));
        assert!(!templates.contains("notes.txt"));

        let out = templates
            .render("posts.html", &doc("/posts/a", &[]), &Value::UNDEFINED)
            .unwrap();
        assert_eq!(out, "<nav>hello-world</nav>|/posts/a|<p>/posts/a</p>");
    }

    #[test]
    fn test_page_extends_main() {
        let dir = setup(&[(
            "about.html",
            "{% extends \"main\" %}{% block base %}<h1>{{ file.metadata.title | slugify }}</h1>{{ reloader() }}{% endblock %}",
        )]);
        let templates = Templates::load(dir.path(), true).unwrap();
        let out = templates
            .render("about.html", &doc("/about", &[("title", "About Me")]), &Value::UNDEFINED)
            .unwrap();
        assert!(out.starts_with("<h1>about-me</h1>"));
        assert!(out.contains("EventSource"));
    }

    #[test]
    fn test_root_listing_sorted() {
        let dir = setup(&[(
            "index.html",
            "{% for d in sortItems(\"-date\", root.posts) %}{{ d.path }};{% endfor %}",
        )]);
        let templates = Templates::load(dir.path(), false).unwrap();

        let mut tree = DirectoryIndex::new();
        tree.insert(
            "posts".into(),
            vec![
                doc("/posts/old", &[("date", "2020")]),
                doc("/posts/new", &[("date", "2024")]),
            ],
        );
        let out = templates
            .render("index.html", &doc("/index", &[]), &index_value(&tree))
            .unwrap();
        assert_eq!(out, "/posts/new;/posts/old;");
    }

    #[test]
    fn test_parse_error_names_file() {
        let dir = setup(&[("broken.html", "{% for x in %}")]);
        let err = Templates::load(dir.path(), false).err().unwrap();
        match err {
            TemplateError::Parse { path, .. } => assert!(path.ends_with("broken.html")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
