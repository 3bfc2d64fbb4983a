//! Markdown body rendering.
//!
//! Converts one document into an HTML fragment plus its decoded front matter
//! in a single pass. On top of CommonMark with the GFM extensions this adds
//! `:::` containers, heading anchors and image figures.

use super::{
    ContentError, fences,
    meta::{self, Metadata},
};
use crate::utils::slug::slugify;
use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};
use std::{collections::HashMap, path::Path};

fn options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
        | Options::ENABLE_GFM
}

/// Render a document's text into `(html, metadata)`.
///
/// `path` is only used to label errors.
pub fn render_body(path: &Path, text: &str) -> Result<(String, Metadata), ContentError> {
    let (front, body) = meta::split_front_matter(text);
    let metadata = meta::decode(front).map_err(|message| ContentError::Metadata {
        path: path.to_path_buf(),
        message,
    })?;

    let body = body.trim();
    if body.is_empty() {
        return Ok((String::new(), metadata));
    }

    let expanded = fences::expand(body);
    let events: Vec<Event<'_>> = Parser::new_ext(&expanded, options()).collect();
    let events = figures(anchor_headings(events));

    let mut out = String::with_capacity(body.len() * 3 / 2);
    html::write_html_fmt(&mut out, events.into_iter()).map_err(|e| ContentError::Render {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok((out, metadata))
}

/// Give every heading an id and a trailing `#` anchor link.
///
/// Explicit `{#id}` attributes are kept; generated ids are slugs of the
/// heading text, suffixed `-1`, `-2`, ... when repeated.
fn anchor_headings(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut out = Vec::with_capacity(events.len());
    let mut iter = events.into_iter();

    while let Some(event) = iter.next() {
        let (level, id, classes, attrs) = match event {
            Event::Start(Tag::Heading {
                level,
                id,
                classes,
                attrs,
            }) => (level, id, classes, attrs),
            other => {
                out.push(other);
                continue;
            }
        };

        let mut inner = Vec::new();
        let mut text = String::new();
        let mut end = None;
        for event in iter.by_ref() {
            if matches!(event, Event::End(TagEnd::Heading(_))) {
                end = Some(event);
                break;
            }
            if let Event::Text(t) | Event::Code(t) = &event {
                text.push_str(t);
            }
            inner.push(event);
        }

        let id = id.map_or_else(|| unique_id(&mut seen, &text), |id| id.to_string());
        out.push(Event::Start(Tag::Heading {
            level,
            id: Some(CowStr::from(id.clone())),
            classes,
            attrs,
        }));
        out.extend(inner);
        out.push(Event::InlineHtml(CowStr::from(format!(
            " <a class=\"anchor\" href=\"#{id}\">#</a>"
        ))));
        out.extend(end);
    }
    out
}

fn unique_id(seen: &mut HashMap<String, usize>, text: &str) -> String {
    let mut id = slugify(text);
    if id.is_empty() {
        id = "heading".into();
    }
    let count = seen.entry(id.clone()).or_insert(0);
    let unique = if *count == 0 {
        id
    } else {
        format!("{id}-{count}")
    };
    *count += 1;
    unique
}

/// Turn paragraphs holding exactly one image into `<figure>` blocks with the
/// alt text as caption.
fn figures(events: Vec<Event<'_>>) -> Vec<Event<'_>> {
    let mut out = Vec::with_capacity(events.len());
    let mut i = 0;

    while i < events.len() {
        if let Some(image_end) = lone_image(&events, i) {
            let alt: String = events[i + 2..image_end]
                .iter()
                .filter_map(|e| match e {
                    Event::Text(t) | Event::Code(t) => Some(t.as_ref()),
                    _ => None,
                })
                .collect();

            out.push(Event::Html(CowStr::from("<figure>\n")));
            out.extend(events[i + 1..=image_end].iter().cloned());
            out.push(Event::Html(CowStr::from(format!(
                "\n<figcaption>{}</figcaption>\n</figure>\n",
                escape_html(&alt)
            ))));
            // skip the paragraph start, the image and the paragraph end
            i = image_end + 2;
        } else {
            out.push(events[i].clone());
            i += 1;
        }
    }
    out
}

/// If a paragraph starting at `start` contains only an image, return the
/// index of the image's end event.
fn lone_image(events: &[Event<'_>], start: usize) -> Option<usize> {
    if !matches!(events.get(start), Some(Event::Start(Tag::Paragraph))) {
        return None;
    }
    if !matches!(events.get(start + 1), Some(Event::Start(Tag::Image { .. }))) {
        return None;
    }
    let image_end = (start + 2..events.len())
        .find(|&j| matches!(events[j], Event::End(TagEnd::Image)))?;
    matches!(events.get(image_end + 1), Some(Event::End(TagEnd::Paragraph))).then_some(image_end)
}

pub(super) fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
