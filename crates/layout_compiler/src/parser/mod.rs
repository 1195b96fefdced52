//! Template parsing: pre-scan, HTML tree construction and sanitization.
//!
//! ```text
//! markup ──preprocess──▶ normalized markup ──html5ever──▶ DOM ──sanitize──▶ Ast
//! ```
//!
//! Component structure errors are reported by the pre-scan with source
//! positions. Everything after that is lenient: HTML nesting is repaired by
//! the tree builder and disallowed content is stripped with warnings.

mod preprocess;
mod sanitize;
mod sink;

use thiserror::Error;

use crate::ast::{Ast, LimitExceeded};
use crate::budget::{BudgetExceeded, Deadline};
use crate::diagnostic::Diagnostic;
use crate::options::CompileOptions;
use crate::registry::ComponentRegistry;

pub use preprocess::{MalformedMarkup, Preprocessed, preprocess};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{}", .0.message)]
    Malformed(MalformedMarkup),
    #[error(transparent)]
    Limit(#[from] LimitExceeded),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
}

impl From<MalformedMarkup> for ParseError {
    fn from(error: MalformedMarkup) -> Self {
        Self::Malformed(error)
    }
}

/// A sanitized template tree.
#[derive(Debug)]
pub struct ParseOutput {
    pub ast: Ast,
    /// Sanitizer removals and inline style corrections.
    pub warnings: Vec<Diagnostic>,
    /// Names of removed elements, in first-seen order.
    pub stripped_components: Vec<String>,
}

/// Build and sanitize the tree for already pre-scanned markup.
pub fn parse_preprocessed(
    preprocessed: &Preprocessed,
    registry: &ComponentRegistry,
    options: &CompileOptions,
    deadline: &Deadline,
) -> Result<ParseOutput, ParseError> {
    let document = sink::parse_html(&preprocessed.markup);
    deadline.check()?;
    let sanitized = sanitize::sanitize(&document, preprocessed, registry, options, deadline)?;
    tracing::debug!(
        nodes = sanitized.ast.node_count(),
        warnings = sanitized.warnings.len(),
        "sanitized template"
    );
    Ok(ParseOutput {
        ast: sanitized.ast,
        warnings: sanitized.warnings,
        stripped_components: sanitized.stripped_components,
    })
}

/// Parse and sanitize `source` in one step.
pub fn parse(
    source: &str,
    registry: &ComponentRegistry,
    options: &CompileOptions,
) -> Result<ParseOutput, ParseError> {
    let deadline = Deadline::new(options.time_budget);
    let preprocessed = preprocess(source, registry, &deadline)?;
    parse_preprocessed(&preprocessed, registry, options, &deadline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{NodeId, NodeKind, TagName};
    use crate::diagnostic::DiagnosticCode;
    use crate::options::Dialect;
    use crate::registry::ComponentKind;

    fn parse_default(source: &str) -> ParseOutput {
        parse(source, &ComponentRegistry::standard(), &CompileOptions::new()).unwrap()
    }

    fn tags(ast: &Ast) -> Vec<String> {
        ast.iter()
            .filter_map(|(_, node)| node.element())
            .map(|element| element.tag.to_string())
            .collect()
    }

    #[test]
    fn test_components_are_canonicalized() {
        let out = parse_default(r#"<flexcontainer DIRECTION="column"><bio/></flexcontainer>"#);
        assert_eq!(tags(&out.ast), vec!["FlexContainer", "Bio"]);
        let flex = out.ast.node(NodeId::new(1)).element().unwrap();
        assert_eq!(flex.tag, TagName::Component(ComponentKind::FlexContainer));
        assert_eq!(flex.attributes.get("direction"), Some("column"));
        assert_eq!(flex.attributes.iter().next().unwrap().name, "direction");
    }

    #[test]
    fn test_script_is_dropped_with_content() {
        let out = parse_default("<div><script>alert(1)</script><p>hi</p></div>");
        assert_eq!(tags(&out.ast), vec!["div", "p"]);
        assert_eq!(out.stripped_components, vec!["script"]);
        assert_eq!(out.warnings[0].code, DiagnosticCode::SanitizationStripped);
    }

    #[test]
    fn test_unknown_component_is_unwrapped() {
        let out = parse_default("<div><MyWidget><span>kept</span></MyWidget></div>");
        assert_eq!(tags(&out.ast), vec!["div", "span"]);
        assert_eq!(out.stripped_components, vec!["MyWidget"]);
        assert_eq!(out.warnings[0].code, DiagnosticCode::UnknownComponent);
        assert!(out.warnings[0].text.contains("<MyWidget>"));
    }

    #[test]
    fn test_attribute_removals_are_aggregated() {
        let out = parse_default(
            r#"<div onclick="a()"><div onclick="b()"></div><a href="javascript:x()">x</a></div>"#,
        );
        assert_eq!(out.warnings.len(), 2);
        assert!(out.warnings[0].text.contains("`onclick`"));
        assert!(out.warnings[0].text.contains("(2 occurrences)"));
        assert!(out.warnings[1].text.contains("unsafe URL"));
        let anchor = out.ast.iter().find_map(|(_, n)| {
            n.element().filter(|e| e.tag.as_str() == "a")
        });
        assert!(anchor.unwrap().attributes.get("href").is_none());
    }

    #[test]
    fn test_whitespace_and_comments() {
        let out = parse_default("<div>\n  <!-- note -->\n  <p>a   b\n c</p>\n</div>");
        let texts: Vec<_> = out.ast.iter().filter_map(|(_, n)| n.text()).collect();
        assert_eq!(texts, vec!["a b c"]);
    }

    #[test]
    fn test_multiple_roots_share_the_root() {
        let out = parse_default("<p>one</p><p>two</p>");
        assert_eq!(out.ast.children(NodeId::ROOT).len(), 2);
    }

    #[test]
    fn test_data_attribute_dialect() {
        let options = CompileOptions::new().with_dialect(Dialect::DataAttributes);
        let out = parse(
            r#"<div data-component="ForEach" data-var="items" data-item="it" data-theme="x"><span>{it}</span></div>"#,
            &ComponentRegistry::standard(),
            &options,
        )
        .unwrap();
        let node = out.ast.node(NodeId::new(1));
        let element = node.element().unwrap();
        assert_eq!(element.tag, TagName::Component(ComponentKind::ForEach));
        assert_eq!(element.attributes.get("var"), Some("items"));
        assert_eq!(element.attributes.get("item"), Some("it"));
        assert!(element.attributes.get("data-component").is_none());
        // `theme` is not a ForEach prop once hoisted.
        assert!(element.attributes.get("theme").is_none());
    }

    #[test]
    fn test_inline_style_is_validated() {
        let out = parse_default(r#"<div style="color: #abc; position: fixed">x</div>"#);
        let div = out.ast.node(NodeId::new(1)).element().unwrap();
        assert_eq!(div.attributes.get("style"), Some("color: #aabbcc"));
        assert!(
            out.warnings
                .iter()
                .any(|w| w.code == DiagnosticCode::CssPropertyInvalid)
        );
    }

    #[test]
    fn test_malformed_component_markup() {
        let err = parse(
            "<OnClick><span>x</span>",
            &ComponentRegistry::standard(),
            &CompileOptions::new(),
        )
        .unwrap_err();
        assert!(matches!(err, ParseError::Malformed(_)));
    }

    #[test]
    fn test_hard_ceiling_stops_construction() {
        let markup = "<div>".repeat(300);
        let err = parse(&markup, &ComponentRegistry::standard(), &CompileOptions::new())
            .unwrap_err();
        let ParseError::Limit(limit) = err else {
            panic!("expected limit error, got {err:?}");
        };
        assert_eq!(limit.kind, crate::ast::LimitKind::Depth);
    }

    #[test]
    fn test_text_only_template() {
        let out = parse_default("Hello {owner.displayName}");
        assert!(matches!(
            &out.ast.node(NodeId::new(1)).kind,
            NodeKind::Text { value } if value == "Hello {owner.displayName}"
        ));
    }
}
