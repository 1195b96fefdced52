//! Allow-list sanitization of the parsed DOM into an [`Ast`].
//!
//! Nothing here is fatal except the hard size ceilings and the time budget:
//! disallowed tags and attributes are removed and reported as warnings.

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use super::preprocess::Preprocessed;
use super::sink::{Handle, SinkData};
use super::ParseError;
use crate::ast::{Ast, AstBuilder, Attribute, Attributes, Element, TagName};
use crate::budget::Deadline;
use crate::css;
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::options::{CompileOptions, Dialect};
use crate::registry::{
    ComponentRegistry, GLOBAL_ATTRIBUTES, TagPolicy, is_data_hint, is_raw_content_tag,
    is_safe_url, is_url_attribute,
};

/// Output of the sanitizer.
#[derive(Debug)]
pub struct Sanitized {
    pub ast: Ast,
    pub warnings: Vec<Diagnostic>,
    /// Names of removed elements, in first-seen order.
    pub stripped_components: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RemovalKind {
    UnknownComponent,
    Element,
    Attribute,
    UnsafeUrl,
}

#[derive(Debug)]
struct Removal {
    kind: RemovalKind,
    tag: String,
    attribute: Option<String>,
    count: usize,
}

impl Removal {
    fn into_diagnostic(self) -> Diagnostic {
        let mut text = match self.kind {
            RemovalKind::UnknownComponent => {
                format!("unknown component <{}> was removed", self.tag)
            }
            RemovalKind::Element => format!("<{}> is not allowed and was removed", self.tag),
            RemovalKind::Attribute => format!(
                "attribute `{}` is not allowed on <{}> and was removed",
                self.attribute.as_deref().unwrap_or_default(),
                self.tag
            ),
            RemovalKind::UnsafeUrl => format!(
                "unsafe URL in `{}` on <{}> was removed",
                self.attribute.as_deref().unwrap_or_default(),
                self.tag
            ),
        };
        if self.count > 1 {
            text.push_str(&format!(" ({} occurrences)", self.count));
        }
        match self.kind {
            RemovalKind::UnknownComponent => Diagnostic::warning(DiagnosticCode::UnknownComponent, text)
                .with_hint("only registered components may be used; its children were kept"),
            _ => Diagnostic::warning(DiagnosticCode::SanitizationStripped, text),
        }
    }
}

/// Removals aggregated per tag and per (tag, attribute).
#[derive(Debug, Default)]
struct Removals {
    entries: Vec<Removal>,
    index: FxHashMap<(RemovalKind, String, Option<String>), usize>,
}

impl Removals {
    fn record(&mut self, kind: RemovalKind, tag: &str, attribute: Option<&str>) {
        let key = (kind, tag.to_string(), attribute.map(str::to_string));
        if let Some(&at) = self.index.get(&key) {
            self.entries[at].count += 1;
            return;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push(Removal {
            kind,
            tag: tag.to_string(),
            attribute: attribute.map(str::to_string),
            count: 1,
        });
    }
}

enum Decision {
    Keep(Element),
    Unwrap,
    Drop,
}

enum Frame {
    Visit(Handle),
    Close,
}

struct Sanitizer<'a> {
    registry: &'a ComponentRegistry,
    dialect: Dialect,
    custom_names: &'a FxHashMap<String, String>,
    removals: Removals,
    style_warnings: Vec<Diagnostic>,
    stripped: Vec<String>,
}

pub fn sanitize(
    document: &Handle,
    preprocessed: &Preprocessed,
    registry: &ComponentRegistry,
    options: &CompileOptions,
    deadline: &Deadline,
) -> Result<Sanitized, ParseError> {
    let mut sanitizer = Sanitizer {
        registry,
        dialect: options.dialect,
        custom_names: &preprocessed.custom_names,
        removals: Removals::default(),
        style_warnings: Vec::new(),
        stripped: Vec::new(),
    };
    let mut builder = AstBuilder::with_ceilings(
        options.limits.node_ceiling(),
        options.limits.depth_ceiling(),
    );

    let mut stack: Vec<Frame> = top_level(document).into_iter().rev().map(Frame::Visit).collect();
    let mut text = String::new();
    let mut iteration = 0usize;

    while let Some(frame) = stack.pop() {
        iteration += 1;
        deadline.tick(iteration)?;
        match frame {
            Frame::Close => {
                flush_text(&mut text, &mut builder)?;
                builder.close();
            }
            Frame::Visit(node) => match &node.data {
                SinkData::Text(value) => text.push_str(&value.borrow()),
                SinkData::Element { name, attrs } => {
                    let attrs = attrs.borrow().clone();
                    match sanitizer.decide(&name.local, attrs) {
                        Decision::Keep(element) => {
                            flush_text(&mut text, &mut builder)?;
                            builder.open(element)?;
                            stack.push(Frame::Close);
                            push_children(&mut stack, &node);
                        }
                        Decision::Unwrap => push_children(&mut stack, &node),
                        Decision::Drop => {}
                    }
                }
                SinkData::Document | SinkData::Doctype | SinkData::Comment => {}
            },
        }
    }
    flush_text(&mut text, &mut builder)?;

    let mut warnings: Vec<Diagnostic> = sanitizer
        .removals
        .entries
        .into_iter()
        .map(Removal::into_diagnostic)
        .collect();
    warnings.extend(sanitizer.style_warnings);

    Ok(Sanitized {
        ast: builder.finish(),
        warnings,
        stripped_components: sanitizer.stripped,
    })
}

/// Children of `<head>` and `<body>`, in order. Tree construction always
/// produces both, so user content lives directly below them.
fn top_level(document: &Handle) -> Vec<Handle> {
    let html = document
        .children
        .borrow()
        .iter()
        .find(|node| node.local_name() == Some("html"))
        .cloned();
    let Some(html) = html else {
        return document.children.borrow().clone();
    };
    let sections = html.children.borrow();
    sections
        .iter()
        .flat_map(|section| match section.local_name() {
            Some("head" | "body") => section.children.borrow().clone(),
            _ => vec![section.clone()],
        })
        .collect()
}

fn push_children(stack: &mut Vec<Frame>, node: &Handle) {
    stack.extend(node.children.borrow().iter().rev().cloned().map(Frame::Visit));
}

/// Emit pending text with whitespace runs collapsed. Whitespace-only runs
/// are insignificant and dropped.
fn flush_text(text: &mut String, builder: &mut AstBuilder) -> Result<(), ParseError> {
    if text.is_empty() {
        return Ok(());
    }
    if !text.trim().is_empty() {
        let mut collapsed = String::with_capacity(text.len());
        let mut in_space = false;
        for c in text.chars() {
            if c.is_whitespace() {
                if !in_space {
                    collapsed.push(' ');
                }
                in_space = true;
            } else {
                collapsed.push(c);
                in_space = false;
            }
        }
        builder.text(collapsed)?;
    }
    text.clear();
    Ok(())
}

impl Sanitizer<'_> {
    fn strip(&mut self, kind: RemovalKind, display: &str) {
        self.removals.record(kind, display, None);
        if !self.stripped.iter().any(|name| name == display) {
            self.stripped.push(display.to_string());
        }
    }

    fn decide(&mut self, local: &str, mut attrs: Vec<(String, String)>) -> Decision {
        let mut name: Cow<'_, str> = Cow::Borrowed(local);
        let mut from_dialect = false;

        if self.dialect == Dialect::DataAttributes
            && let Some(at) = attrs.iter().position(|(n, _)| n == "data-component")
        {
            let (_, component) = attrs.remove(at);
            name = Cow::Owned(component.trim().to_string());
            from_dialect = true;
            for (attr, _) in &mut attrs {
                if let Some(rest) = attr.strip_prefix("data-")
                    && !attr.starts_with("data-island")
                {
                    *attr = rest.to_string();
                }
            }
        }

        let registry = self.registry;
        match registry.resolve_tag(&name) {
            Some(TagPolicy::Component(definition)) => {
                let tag = TagName::Component(definition.kind);
                let attributes = self.filter_attributes(definition.name(), attrs, |attr| {
                    definition.prop_name(attr)
                });
                Decision::Keep(Element::new(tag, attributes))
            }
            Some(TagPolicy::Html { name, attributes }) if !from_dialect => {
                let filtered = self.filter_attributes(name, attrs, |attr| {
                    attributes.iter().find(|allowed| ***allowed == *attr).copied()
                });
                Decision::Keep(Element::new(TagName::Html(name.to_string()), filtered))
            }
            _ if is_raw_content_tag(&name) => {
                self.strip(RemovalKind::Element, &name.to_ascii_lowercase());
                Decision::Drop
            }
            _ => {
                let original = self.custom_names.get(&name.to_ascii_lowercase()).cloned();
                match original {
                    Some(original) => self.strip(RemovalKind::UnknownComponent, &original),
                    None if from_dialect => self.strip(RemovalKind::UnknownComponent, &name),
                    None => self.strip(RemovalKind::Element, &name),
                }
                Decision::Unwrap
            }
        }
    }

    /// Keep allowed attributes, renaming props to their canonical names.
    fn filter_attributes(
        &mut self,
        tag: &str,
        attrs: Vec<(String, String)>,
        own: impl Fn(&str) -> Option<&'static str>,
    ) -> Attributes {
        let mut kept = Attributes::new();
        for (name, value) in attrs {
            let canonical = own(&name).or_else(|| {
                GLOBAL_ATTRIBUTES
                    .iter()
                    .find(|global| **global == name)
                    .copied()
            });
            let name = match canonical {
                Some(canonical) => canonical.to_string(),
                None if is_data_hint(&name) => name,
                None => {
                    self.removals
                        .record(RemovalKind::Attribute, tag, Some(&name));
                    continue;
                }
            };

            if is_url_attribute(&name) && !is_safe_url(&value) {
                self.removals.record(RemovalKind::UnsafeUrl, tag, Some(&name));
                continue;
            }
            if name == "style" {
                let style = css::sanitize_inline_style(&value);
                self.style_warnings.extend(style.diagnostics);
                if let Some(style) = style.value {
                    kept.push(Attribute::new(name, style));
                }
                continue;
            }
            kept.push(Attribute::new(name, value));
        }

        if kept.get("target") == Some("_blank") && !kept.contains("rel") {
            kept.push(Attribute::new("rel", "noopener noreferrer"));
        }
        kept
    }
}
