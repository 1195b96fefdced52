//! Lightweight tag scanner run before HTML tree construction.
//!
//! The HTML parser is lenient and would silently repair broken component
//! markup, so structural errors in component tags are caught here, with
//! positions, while the source text is still available. The scanner also
//! expands self-closing custom tags (`<Break />`) into explicit pairs, since
//! HTML ignores the self-closing flag on non-void elements.

use rustc_hash::FxHashMap;

use super::ParseError;
use crate::budget::Deadline;
use crate::registry::{ComponentRegistry, is_void_element};

/// Elements whose content is raw text and must not be scanned for tags.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedMarkup {
    pub message: String,
    pub start: usize,
    pub end: usize,
}

impl MalformedMarkup {
    fn new(message: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            message: message.into(),
            start,
            end,
        }
    }
}

#[derive(Debug, Default)]
pub struct Preprocessed {
    /// Markup with self-closing custom tags expanded.
    pub markup: String,
    /// Lower-cased custom tag name to the casing first seen in the source.
    pub custom_names: FxHashMap<String, String>,
}

struct OpenComponent<'a> {
    name: &'a str,
    start: usize,
    end: usize,
}

struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    registry: &'a ComponentRegistry,
    deadline: &'a Deadline,
    iteration: usize,
    output: Preprocessed,
    open: Vec<OpenComponent<'a>>,
}

pub fn preprocess(
    source: &str,
    registry: &ComponentRegistry,
    deadline: &Deadline,
) -> Result<Preprocessed, ParseError> {
    let mut scanner = Scanner {
        source,
        bytes: source.as_bytes(),
        pos: 0,
        registry,
        deadline,
        iteration: 0,
        output: Preprocessed {
            markup: String::with_capacity(source.len() + 16),
            custom_names: FxHashMap::default(),
        },
        open: Vec::new(),
    };
    scanner.run()?;
    Ok(scanner.output)
}

impl<'a> Scanner<'a> {
    fn run(&mut self) -> Result<(), ParseError> {
        while let Some(offset) = self.source[self.pos..].find('<') {
            self.tick()?;
            let start = self.pos + offset;
            self.copy_to(start);
            let rest = &self.source[start..];
            if rest.starts_with("<!--") {
                self.comment(start)?;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                self.declaration(start)?;
            } else if rest.starts_with("</") {
                self.end_tag(start)?;
            } else if self.bytes.get(start + 1).is_some_and(u8::is_ascii_alphabetic) {
                self.start_tag(start)?;
            } else {
                self.copy_to(start + 1);
            }
        }
        self.copy_to(self.source.len());

        if let Some(unclosed) = self.open.last() {
            return Err(MalformedMarkup::new(
                format!("<{}> is never closed", unclosed.name),
                unclosed.start,
                unclosed.end,
            )
            .into());
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<(), ParseError> {
        self.iteration += 1;
        self.deadline.tick(self.iteration)?;
        Ok(())
    }

    fn copy_to(&mut self, end: usize) {
        self.output.markup.push_str(&self.source[self.pos..end]);
        self.pos = end;
    }

    fn comment(&mut self, start: usize) -> Result<(), MalformedMarkup> {
        match self.source[start + 4..].find("-->") {
            Some(offset) => {
                self.copy_to(start + 4 + offset + 3);
                Ok(())
            }
            None => Err(MalformedMarkup::new(
                "comment is never closed",
                start,
                start + 4,
            )),
        }
    }

    fn declaration(&mut self, start: usize) -> Result<(), MalformedMarkup> {
        match self.source[start..].find('>') {
            Some(offset) => {
                self.copy_to(start + offset + 1);
                Ok(())
            }
            None => Err(MalformedMarkup::new(
                "unterminated markup declaration",
                start,
                start + 2,
            )),
        }
    }

    fn tag_name(&self, from: usize) -> &'a str {
        let end = self.bytes[from..]
            .iter()
            .position(|&b| !(b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')))
            .map_or(self.bytes.len(), |len| from + len);
        &self.source[from..end]
    }

    fn is_custom(&self, name: &str) -> bool {
        !is_void_element(name)
            && (self.registry.lookup(name).is_some()
                || name.bytes().any(|b| b.is_ascii_uppercase() || b == b'-'))
    }

    fn record_custom(&mut self, name: &str) {
        self.output
            .custom_names
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| name.to_string());
    }

    fn end_tag(&mut self, start: usize) -> Result<(), MalformedMarkup> {
        let name = self.tag_name(start + 2);
        let Some(offset) = self.source[start..].find('>') else {
            return Err(MalformedMarkup::new(
                format!("closing tag </{name}> is never terminated"),
                start,
                self.source.len(),
            ));
        };
        let end = start + offset + 1;

        if !name.is_empty() && self.registry.lookup(name).is_some() {
            match self.open.last() {
                Some(open) if open.name.eq_ignore_ascii_case(name) => {
                    self.open.pop();
                }
                Some(open) => {
                    return Err(MalformedMarkup::new(
                        format!("expected </{}> but found </{name}>", open.name),
                        start,
                        end,
                    ));
                }
                None => {
                    return Err(MalformedMarkup::new(
                        format!("closing tag </{name}> has no matching opening tag"),
                        start,
                        end,
                    ));
                }
            }
        }
        self.copy_to(end);
        Ok(())
    }

    fn start_tag(&mut self, start: usize) -> Result<(), ParseError> {
        let name = self.tag_name(start + 1);
        let attrs_start = start + 1 + name.len();

        // Find the closing `>` outside of quoted attribute values. A quote
        // only opens a value right after `=` (whitespace allowed between);
        // anywhere else it is part of an unquoted value or name.
        let mut quote: Option<(u8, usize)> = None;
        let mut after_equals = false;
        let mut close = None;
        for (i, &b) in self.bytes[attrs_start..].iter().enumerate() {
            let at = attrs_start + i;
            match quote {
                Some((q, _)) if b == q => quote = None,
                Some(_) => {}
                None if after_equals && (b == b'"' || b == b'\'') => {
                    quote = Some((b, at));
                    after_equals = false;
                }
                None if b == b'>' => {
                    close = Some(at);
                    break;
                }
                None if b == b'=' => after_equals = true,
                None if b.is_ascii_whitespace() => {}
                None => after_equals = false,
            }
        }
        if let Some((_, at)) = quote {
            return Err(MalformedMarkup::new(
                format!("quoted attribute value in <{name}> is never closed"),
                at,
                self.source.len(),
            )
            .into());
        }
        let Some(close) = close else {
            return Err(MalformedMarkup::new(
                format!("tag <{name}> is never terminated"),
                start,
                self.source.len(),
            )
            .into());
        };

        let attrs = self.source[attrs_start..close].trim_end();
        let self_closing = attrs.ends_with('/');
        let custom = self.is_custom(name);
        if custom {
            self.record_custom(name);
        }

        if custom && self_closing {
            self.output.markup.push_str(&self.source[start..attrs_start]);
            self.output
                .markup
                .push_str(attrs[..attrs.len() - 1].trim_end());
            self.output.markup.push_str("></");
            self.output.markup.push_str(name);
            self.output.markup.push('>');
            self.pos = close + 1;
            return Ok(());
        }

        if !self_closing && self.registry.lookup(name).is_some() {
            self.open.push(OpenComponent {
                name,
                start,
                end: close + 1,
            });
        }
        self.copy_to(close + 1);

        if !self_closing
            && RAW_TEXT_ELEMENTS
                .iter()
                .any(|raw| raw.eq_ignore_ascii_case(name))
        {
            self.skip_raw_text(name)?;
        }
        Ok(())
    }

    /// Copy raw text content up to the matching end tag, which is then
    /// scanned normally.
    fn skip_raw_text(&mut self, name: &str) -> Result<(), ParseError> {
        let mut cursor = self.pos;
        let end = loop {
            let Some(offset) = self.source[cursor..].find("</") else {
                break self.source.len();
            };
            self.tick()?;
            let at = cursor + offset;
            let candidate = &self.bytes[at + 2..];
            if candidate.len() >= name.len()
                && candidate[..name.len()].eq_ignore_ascii_case(name.as_bytes())
            {
                break at;
            }
            cursor = at + 2;
        };
        self.copy_to(end);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(source: &str) -> Result<Preprocessed, MalformedMarkup> {
        preprocess(source, &ComponentRegistry::standard(), &Deadline::unbounded()).map_err(
            |error| match error {
                ParseError::Malformed(malformed) => malformed,
                other => panic!("unexpected error: {other}"),
            },
        )
    }

    #[test]
    fn test_expands_self_closing_custom_tags() {
        let out = run(r#"<ForEach var="items" item="it"><Break /><my-widget/><br/></ForEach>"#)
            .unwrap();
        assert_eq!(
            out.markup,
            r#"<ForEach var="items" item="it"><Break></Break><my-widget></my-widget><br/></ForEach>"#
        );
        assert_eq!(out.custom_names.get("foreach").map(String::as_str), Some("ForEach"));
        assert_eq!(
            out.custom_names.get("my-widget").map(String::as_str),
            Some("my-widget")
        );
    }

    #[test]
    fn test_keeps_slash_inside_quotes() {
        let out = run(r#"<Validate pattern="a/b"></Validate>"#).unwrap();
        assert_eq!(out.markup, r#"<Validate pattern="a/b"></Validate>"#);
    }

    #[test]
    fn test_reports_unclosed_component() {
        let err = run("<div>\n  <OnClick><span>x</span>\n</div>").unwrap_err();
        assert_eq!(err.message, "<OnClick> is never closed");
        assert_eq!(err.start, 8);
    }

    #[test]
    fn test_reports_mismatched_component_close() {
        let err = run("<OnClick><Show when=\"owner\"></OnClick></Show>").unwrap_err();
        assert_eq!(err.message, "expected </Show> but found </OnClick>");
    }

    #[test]
    fn test_reports_stray_component_close() {
        let err = run("<div></ForEach></div>").unwrap_err();
        assert!(err.message.contains("no matching opening tag"));
    }

    #[test]
    fn test_reports_unterminated_quote_and_tag() {
        let err = run(r#"<div title="oops></div>"#).unwrap_err();
        assert!(err.message.contains("never closed"));
        assert_eq!(err.start, 11);

        let err = run("<div><span").unwrap_err();
        assert_eq!(err.message, "tag <span> is never terminated");
        assert_eq!(err.start, 5);

        let err = run("<div><!-- note </div>").unwrap_err();
        assert_eq!(err.message, "comment is never closed");
    }

    #[test]
    fn test_raw_text_is_not_scanned() {
        let out = run("<script>if (a < b) { x = '</OnClick>' }</script><p>ok</p>");
        // The fake closing tag inside the script is not treated as markup.
        assert!(out.is_ok());
    }

    #[test]
    fn test_plain_html_nesting_is_left_to_the_parser() {
        assert!(run("<div><p>unclosed</div>").is_ok());
        assert!(run("a < b and c > d").is_ok());
    }

    #[test]
    fn test_apostrophe_in_unquoted_value_is_text() {
        let source = r#"<img alt=don't src="/a.png"><p>after</p>"#;
        assert_eq!(run(source).unwrap().markup, source);
        assert!(run("<p title=it's>hello</p>").is_ok());
        assert!(run(r#"<p title = "spaced">x</p>"#).is_ok());
    }

    #[test]
    fn test_raw_text_end_tag_is_case_insensitive() {
        let out = run("<STYLE>p { color: red }</Style><OnClick><p>x</p></OnClick>").unwrap();
        assert!(out.markup.ends_with("</OnClick>"));
        assert!(run("<textarea>a </b> </texTAREA><p>ok</p>").is_ok());
    }

    #[test]
    fn test_expired_deadline_stops_the_scan() {
        let source = "<style>a</style>".repeat(200);
        let deadline = Deadline::starting_at(
            std::time::Instant::now() - std::time::Duration::from_millis(5),
            Some(std::time::Duration::ZERO),
        );
        let err = preprocess(&source, &ComponentRegistry::standard(), &deadline).unwrap_err();
        assert!(matches!(err, ParseError::Budget(_)));
    }
}
