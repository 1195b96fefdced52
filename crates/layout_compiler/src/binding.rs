//! Named data bindings.
//!
//! Templates reference resident data with `{path}` placeholders in text and
//! attribute values, e.g. `{owner.displayName}` or `{posts.0.id}`. A path is
//! a dotted list of identifiers and numeric indices. Anything else between
//! braces is ordinary text; there is no expression language.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Roots that resolve against the resident data context.
pub const DATA_ROOTS: &[&str] = &[
    "owner",
    "viewer",
    "posts",
    "guestbook",
    "capabilities",
    "images",
    "profileImages",
];

/// Maximum number of segments in a binding path.
const MAX_SEGMENTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// A parsed binding path such as `owner.displayName`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BindingPath {
    segments: Vec<PathSegment>,
}

impl BindingPath {
    /// Parse a path. Surrounding braces (`{items}`) are accepted so prop
    /// values may be written either way.
    pub fn parse(source: &str) -> Option<Self> {
        let trimmed = source.trim();
        let inner = trimmed
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(trimmed)
            .trim();

        let mut segments = Vec::new();
        for (i, part) in inner.split('.').enumerate() {
            if segments.len() == MAX_SEGMENTS {
                return None;
            }
            if is_identifier(part) {
                segments.push(PathSegment::Key(part.to_string()));
            } else if i > 0 && !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) {
                segments.push(PathSegment::Index(part.parse().ok()?));
            } else {
                return None;
            }
        }
        Some(Self { segments })
    }

    /// The first segment, which names either a resident-data root or a loop
    /// variable.
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Key(key)) => key,
            _ => "",
        }
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Segments after the root.
    pub fn rest(&self) -> &[PathSegment] {
        self.segments.get(1..).unwrap_or_default()
    }
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                PathSegment::Key(key) => f.write_str(key)?,
                PathSegment::Index(index) => write!(f, "{index}")?,
            }
        }
        Ok(())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut bytes = s.bytes();
    bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// One piece of a text or attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart<'a> {
    Literal(&'a str),
    Binding(BindingPath),
}

/// Split a text or attribute value into literal runs and bindings.
pub fn split_bindings(source: &str) -> Vec<TemplatePart<'_>> {
    let mut parts = Vec::new();
    let mut literal_start = 0;
    let mut cursor = 0;

    while let Some(open) = source[cursor..].find('{') {
        let open = cursor + open;
        let Some(close) = source[open..].find('}') else {
            break;
        };
        let close = open + close;
        match BindingPath::parse(&source[open + 1..close]) {
            Some(path) => {
                if literal_start < open {
                    parts.push(TemplatePart::Literal(&source[literal_start..open]));
                }
                parts.push(TemplatePart::Binding(path));
                literal_start = close + 1;
                cursor = close + 1;
            }
            None => cursor = open + 1,
        }
    }

    if literal_start < source.len() {
        parts.push(TemplatePart::Literal(&source[literal_start..]));
    }
    parts
}

/// Iterate only the bindings of a value.
pub fn bindings_in(source: &str) -> impl Iterator<Item = BindingPath> + '_ {
    split_bindings(source)
        .into_iter()
        .filter_map(|part| match part {
            TemplatePart::Binding(path) => Some(path),
            TemplatePart::Literal(_) => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted_path_with_index() {
        let path = BindingPath::parse("posts.0.contentHtml").unwrap();
        assert_eq!(path.root(), "posts");
        assert_eq!(
            path.rest(),
            &[
                PathSegment::Index(0),
                PathSegment::Key("contentHtml".to_string())
            ]
        );
        assert_eq!(path.to_string(), "posts.0.contentHtml");
    }

    #[test]
    fn test_parse_accepts_braces() {
        assert_eq!(
            BindingPath::parse("{ items }").unwrap().to_string(),
            "items"
        );
    }

    #[test]
    fn test_parse_rejects_expressions() {
        assert!(BindingPath::parse("a + b").is_none());
        assert!(BindingPath::parse("0.name").is_none());
        assert!(BindingPath::parse("owner..id").is_none());
        assert!(BindingPath::parse("").is_none());
        assert!(BindingPath::parse("a.b.c.d.e.f.g.h.i").is_none());
    }

    #[test]
    fn test_split_bindings_keeps_non_paths_literal() {
        let parts = split_bindings("Hi {owner.displayName}! {not a path} {it}");
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], TemplatePart::Literal("Hi "));
        assert_eq!(
            parts[1],
            TemplatePart::Binding(BindingPath::parse("owner.displayName").unwrap())
        );
        assert_eq!(parts[2], TemplatePart::Literal("! {not a path} "));
        assert_eq!(
            parts[3],
            TemplatePart::Binding(BindingPath::parse("it").unwrap())
        );
    }

    #[test]
    fn test_split_bindings_unclosed_brace_is_literal() {
        assert_eq!(
            split_bindings("a { b"),
            vec![TemplatePart::Literal("a { b")]
        );
    }
}
