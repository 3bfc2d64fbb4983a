//! Fenced `:::` containers.
//!
//! A line of three or more colons followed by an attribute list opens a
//! `<div>`; a bare colon line closes the innermost open one:
//!
//! ```text
//! ::: {.note #tip}          <div class="note" id="tip">
//! Inside *markdown*    →    <p>Inside <em>markdown</em></p>
//! :::                       </div>
//! ```
//!
//! Expansion runs on the source text before parsing. Each fence becomes a
//! standalone HTML block surrounded by blank lines, so the content in between
//! is still parsed as Markdown. Lines inside code blocks are left alone.

use super::markdown::escape_html;

/// Rewrite container fences in `body` into raw `<div>` blocks.
///
/// Containers still open at the end of the body are closed there.
pub fn expand(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 32);
    let mut code = CodeFence::default();
    let mut depth = 0usize;

    for line in body.lines() {
        if code.update(line) || code.inside() {
            out.push_str(line);
            out.push('\n');
            continue;
        }

        match parse_fence(line) {
            Some(Fence::Close) if depth > 0 => {
                depth -= 1;
                out.push_str("\n</div>\n\n");
            }
            Some(Fence::Open(attrs)) => {
                depth += 1;
                out.push_str(&format!("\n<div{}>\n\n", render_attrs(&attrs)));
            }
            _ => {
                out.push_str(line);
                out.push('\n');
            }
        }
    }

    for _ in 0..depth {
        out.push_str("\n</div>\n");
    }
    out
}

#[derive(Debug, PartialEq)]
enum Fence {
    Open(Vec<(String, String)>),
    Close,
}

/// Recognise a fence line. Lines indented four or more spaces are code.
fn parse_fence(line: &str) -> Option<Fence> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }

    let trimmed = line.trim();
    let colons = trimmed.chars().take_while(|&c| c == ':').count();
    if colons < 3 {
        return None;
    }

    let rest = trimmed[colons..].trim();
    if rest.is_empty() {
        return Some(Fence::Close);
    }

    let attrs = match rest.strip_prefix('{') {
        Some(inner) => parse_attrs(inner.strip_suffix('}')?),
        // `::: note` is shorthand for `::: {.note}`
        None if rest.chars().all(is_name_char) => vec![("class".into(), rest.into())],
        None => return None,
    };
    Some(Fence::Open(attrs))
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// Parse `.class #id key=value key="quoted value"` into ordered attributes.
///
/// Classes are merged into a single `class` attribute.
fn parse_attrs(source: &str) -> Vec<(String, String)> {
    let mut classes = Vec::new();
    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut rest = source.trim();

    while !rest.is_empty() {
        let (token, remaining) = next_token(rest);
        rest = remaining.trim_start();

        if let Some(class) = token.strip_prefix('.') {
            if !class.is_empty() {
                classes.push(class.to_owned());
            }
        } else if let Some(id) = token.strip_prefix('#') {
            if !id.is_empty() {
                attrs.retain(|(k, _)| k != "id");
                attrs.push(("id".into(), id.to_owned()));
            }
        } else if let Some((key, value)) = token.split_once('=') {
            let value = value.trim_matches('"');
            if key == "class" {
                classes.extend(value.split_whitespace().map(str::to_owned));
            } else if !key.is_empty() {
                attrs.push((key.to_owned(), value.to_owned()));
            }
        } else if !token.is_empty() {
            attrs.push((token.to_owned(), String::new()));
        }
    }

    if !classes.is_empty() {
        attrs.insert(0, ("class".into(), classes.join(" ")));
    }
    attrs
}

/// Split off one whitespace-separated token, keeping quoted values whole.
fn next_token(source: &str) -> (&str, &str) {
    let mut quoted = false;
    for (i, c) in source.char_indices() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => return (&source[..i], &source[i..]),
            _ => {}
        }
    }
    (source, "")
}

fn render_attrs(attrs: &[(String, String)]) -> String {
    attrs
        .iter()
        .map(|(key, value)| format!(" {}=\"{}\"", key, escape_html(value)))
        .collect()
}

/// Tracks fenced code blocks so their content is never expanded.
#[derive(Debug, Default)]
struct CodeFence {
    marker: Option<(char, usize)>,
}

impl CodeFence {
    fn inside(&self) -> bool {
        self.marker.is_some()
    }

    /// Returns `true` if `line` opened or closed a code block.
    fn update(&mut self, line: &str) -> bool {
        let trimmed = line.trim_start();
        let Some(first) = trimmed.chars().next().filter(|&c| c == '`' || c == '~') else {
            return false;
        };
        let len = trimmed.chars().take_while(|&c| c == first).count();
        if len < 3 {
            return false;
        }

        match self.marker {
            Some((ch, open)) if ch == first && len >= open && trimmed[len..].trim().is_empty() => {
                self.marker = None;
                true
            }
            Some(_) => false,
            None => {
                self.marker = Some((first, len));
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fence() {
        assert_eq!(parse_fence(":::"), Some(Fence::Close));
        assert_eq!(parse_fence("::::  "), Some(Fence::Close));
        assert_eq!(
            parse_fence("::: {.note}"),
            Some(Fence::Open(vec![("class".into(), "note".into())]))
        );
        assert_eq!(
            parse_fence(":::warning"),
            Some(Fence::Open(vec![("class".into(), "warning".into())]))
        );
        assert_eq!(parse_fence("::"), None);
        assert_eq!(parse_fence("    :::"), None);
        assert_eq!(parse_fence("::: two words"), None);
        assert_eq!(parse_fence("::: {.unclosed"), None);
    }

    #[test]
    fn test_parse_attrs() {
        let attrs = parse_attrs(r#".note #tip .wide data-title="Read this" hidden"#);
        assert_eq!(
            attrs,
            [
                ("class".to_owned(), "note wide".to_owned()),
                ("id".to_owned(), "tip".to_owned()),
                ("data-title".to_owned(), "Read this".to_owned()),
                ("hidden".to_owned(), String::new()),
            ]
        );
    }

    #[test]
    fn test_expand_wraps_content() {
        let out = expand("::: {.note}\nInside\n:::\n");
        assert_eq!(out, "\n<div class=\"note\">\n\nInside\n\n</div>\n\n");
    }

    #[test]
    fn test_expand_nested_and_unclosed() {
        let out = expand("::: outer\n:::: {#inner}\ntext\n::::\nstill outer\n");
        assert!(out.contains("<div class=\"outer\">"));
        assert!(out.contains("<div id=\"inner\">"));
        assert_eq!(out.matches("</div>").count(), 2);
        assert!(out.trim_end().ends_with("</div>"));
    }

    #[test]
    fn test_stray_close_is_text() {
        assert_eq!(expand("a\n:::\n"), "a\n:::\n");
    }

    #[test]
    fn test_code_blocks_untouched() {
        let src = "```\n::: {.note}\n:::\n```\n";
        assert_eq!(expand(src), src);

        let src = "~~~~\n```\n::: note\n~~~~\n";
        assert_eq!(expand(src), src);
    }

    #[test]
    fn test_attribute_values_escaped() {
        let out = expand("::: {title=\"a<b\"}\nx\n:::");
        assert!(out.contains("<div title=\"a&lt;b\">"));
    }
}
