//! Front matter extraction and metadata values.
//!
//! Three header styles are recognized at the top of a document:
//!
//! ```text
//! ---                  +++                   @title = Hello
//! title: Hello         title = "Hello"       @skip
//! date: 2024-01-31     date = 2024-01-31
//! ---                  +++
//! ```
//!
//! YAML (`---`), TOML (`+++`) and the line-based `@key = value` header.
//! Only flat scalar mappings are accepted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use std::{collections::HashMap, fmt};

/// Front matter of one document, keyed case-sensitively.
pub type Metadata = HashMap<String, MetaValue>;

/// A single front matter value.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Text(String),
    Timestamp(NaiveDateTime),
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl MetaValue {
    /// The string payload, for `Text` values only.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Short type name used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "string",
            Self::Timestamp(_) => "date",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Timestamp(t) if t.time() == NaiveTime::default() => {
                write!(f, "{}", t.format("%Y-%m-%d"))
            }
            Self::Timestamp(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S")),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

impl Serialize for MetaValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Integer(i) => serializer.serialize_i64(*i),
            Self::Float(x) => serializer.serialize_f64(*x),
            Self::Text(_) | Self::Timestamp(_) => serializer.collect_str(self),
        }
    }
}

// ============================================================================
// Header Splitting
// ============================================================================

/// Raw front matter found at the top of a document.
#[derive(Debug, PartialEq)]
pub enum FrontMatter<'a> {
    None,
    Yaml(&'a str),
    Toml(&'a str),
    Lines(Vec<(&'a str, &'a str)>),
}

/// Split a document into its front matter and the remaining body.
pub fn split_front_matter(text: &str) -> (FrontMatter<'_>, &str) {
    let text = text.trim_start();

    if let Some((header, body)) = fenced(text, "---") {
        return (FrontMatter::Yaml(header), body);
    }
    if let Some((header, body)) = fenced(text, "+++") {
        return (FrontMatter::Toml(header), body);
    }
    if text.starts_with('@') {
        return split_at_lines(text);
    }
    (FrontMatter::None, text)
}

/// Find a header between two `fence` lines at the very start of `text`.
fn fenced<'a>(text: &'a str, fence: &str) -> Option<(&'a str, &'a str)> {
    let rest = text.strip_prefix(fence)?;
    let rest = rest
        .strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == fence {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

/// Consume leading `@key = value` lines. A missing value is the empty string.
fn split_at_lines(text: &str) -> (FrontMatter<'_>, &str) {
    let mut pairs = Vec::new();
    let mut rest = text;

    while let Some(stripped) = rest.strip_prefix('@') {
        let (line, next) = stripped.split_once('\n').unwrap_or((stripped, ""));
        let (key, value) = line.split_once('=').unwrap_or((line, ""));
        pairs.push((key.trim(), value.trim()));
        rest = next;
    }
    (FrontMatter::Lines(pairs), rest)
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode raw front matter into metadata.
///
/// The error is a human readable reason; the caller attaches the file path.
pub fn decode(front: FrontMatter<'_>) -> Result<Metadata, String> {
    match front {
        FrontMatter::None => Ok(Metadata::new()),
        FrontMatter::Lines(pairs) => Ok(pairs
            .into_iter()
            .map(|(k, v)| (k.to_owned(), MetaValue::Text(v.to_owned())))
            .collect()),
        FrontMatter::Yaml(src) => decode_yaml(src),
        FrontMatter::Toml(src) => decode_toml(src),
    }
}

fn decode_yaml(src: &str) -> Result<Metadata, String> {
    use serde_yaml::Value;

    let value: Value = serde_yaml::from_str(src).map_err(|e| format!("invalid YAML: {e}"))?;
    let mapping = match value {
        Value::Null => return Ok(Metadata::new()),
        Value::Mapping(mapping) => mapping,
        _ => return Err("front matter is not a key/value mapping".into()),
    };

    mapping
        .into_iter()
        .map(|(key, value)| {
            let key = match key {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err("front matter keys must be scalars".to_owned()),
            };
            let value = match value {
                Value::Null => MetaValue::Text(String::new()),
                Value::Bool(b) => MetaValue::Bool(b),
                Value::Number(n) => match n.as_i64() {
                    Some(i) => MetaValue::Integer(i),
                    None => MetaValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                },
                Value::String(s) => parse_timestamp(&s).map_or(MetaValue::Text(s), MetaValue::Timestamp),
                _ => return Err(format!("`{key}` is not a scalar value")),
            };
            Ok((key, value))
        })
        .collect()
}

fn decode_toml(src: &str) -> Result<Metadata, String> {
    use toml::Value;

    let table: toml::Table = toml::from_str(src).map_err(|e| format!("invalid TOML: {e}"))?;

    table
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => MetaValue::Text(s),
                Value::Integer(i) => MetaValue::Integer(i),
                Value::Float(x) => MetaValue::Float(x),
                Value::Boolean(b) => MetaValue::Bool(b),
                Value::Datetime(dt) => toml_timestamp(&dt)
                    .map(MetaValue::Timestamp)
                    .ok_or_else(|| format!("`{key}` is a time without a date"))?,
                Value::Array(_) | Value::Table(_) => {
                    return Err(format!("`{key}` is not a scalar value"));
                }
            };
            Ok((key, value))
        })
        .collect()
}

/// Interpret a YAML string as a timestamp when it is written like one.
///
/// Accepts `YYYY-MM-DD`, optionally followed by a time separated by `T` or a
/// space, optionally with an RFC 3339 offset (which is dropped).
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.len() < 10 || !s.as_bytes()[0].is_ascii_digit() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::default()));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Convert a TOML datetime, keeping wall-clock time and dropping any offset.
fn toml_timestamp(dt: &toml::value::Datetime) -> Option<NaiveDateTime> {
    let date = dt.date?;
    let date = NaiveDate::from_ymd_opt(
        i32::from(date.year),
        u32::from(date.month),
        u32::from(date.day),
    )?;
    let time = match dt.time {
        Some(t) => NaiveTime::from_hms_nano_opt(
            u32::from(t.hour),
            u32::from(t.minute),
            u32::from(t.second),
            t.nanosecond,
        )?,
        None => NaiveTime::default(),
    };
    Some(date.and_time(time))
}
