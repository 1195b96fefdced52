//! HTML printing.
//!
//! - [`HtmlWriter`] is the output buffer shared with the renderer.
//! - [`print_static`] serializes a skeleton to the compile-time HTML, with a
//!   marker element in place of each island.
//! - [`print_markup`] prints a tree back to template markup.
//!
//! Island markers and rendered islands both open with
//! [`write_island_open`], which is the whole contract with the hydration
//! runtime.

mod components;
mod escape;

use crate::ast::{Ast, NodeId, NodeKind};
use crate::budget::{BudgetExceeded, Deadline};
use crate::islands::Island;
use crate::registry::is_void_element;

pub(crate) use components::{ShellContent, shell};
pub use escape::{escape_attribute, escape_text};

/// An HTML output buffer.
#[derive(Debug, Default)]
pub struct HtmlWriter {
    out: String,
}

impl HtmlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
        }
    }

    pub fn start_tag<'a>(
        &mut self,
        tag: &str,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) {
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attributes {
            self.attribute(name, value);
        }
        self.out.push('>');
    }

    fn attribute(&mut self, name: &str, value: &str) {
        self.out.push(' ');
        self.out.push_str(name);
        self.out.push_str("=\"");
        self.out.push_str(&escape_attribute(value));
        self.out.push('"');
    }

    pub fn end_tag(&mut self, tag: &str) {
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    /// Write escaped text.
    pub fn text(&mut self, value: &str) {
        self.out.push_str(&escape_text(value));
    }

    /// Write markup verbatim.
    pub fn raw(&mut self, markup: &str) {
        self.out.push_str(markup);
    }

    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.out
    }

    pub fn into_string(self) -> String {
        self.out
    }
}

/// Open the element that hosts an island.
pub fn write_island_open(writer: &mut HtmlWriter, island: &Island) {
    writer.start_tag(
        "div",
        [
            ("data-island", island.id.as_str()),
            ("data-island-component", island.component.name()),
        ],
    );
}

pub fn write_island_close(writer: &mut HtmlWriter) {
    writer.end_tag("div");
}

/// The empty marker left for an island in static HTML.
pub fn island_marker(island: &Island) -> String {
    let mut writer = HtmlWriter::new();
    write_island_open(&mut writer, island);
    write_island_close(&mut writer);
    writer.into_string()
}

enum Frame<'a> {
    Enter(NodeId),
    Exit(&'a str),
}

fn push_children<'a>(stack: &mut Vec<Frame<'a>>, ast: &Ast, id: NodeId) {
    stack.extend(ast.children(id).iter().rev().map(|&child| Frame::Enter(child)));
}

/// Serialize a skeleton to static HTML.
///
/// Bindings are printed literally; `Show` prints its children unconditionally
/// since its condition depends on render-time data.
pub fn print_static(
    skeleton: &Ast,
    islands: &[Island],
    deadline: &Deadline,
) -> Result<String, BudgetExceeded> {
    let mut writer = HtmlWriter::with_capacity(skeleton.len() * 32);
    let mut stack = vec![Frame::Enter(NodeId::ROOT)];
    let mut iteration = 0;

    while let Some(frame) = stack.pop() {
        iteration += 1;
        deadline.tick(iteration)?;
        let id = match frame {
            Frame::Exit(tag) => {
                writer.end_tag(tag);
                continue;
            }
            Frame::Enter(id) => id,
        };
        let node = skeleton.node(id);
        match &node.kind {
            NodeKind::Root => push_children(&mut stack, skeleton, id),
            NodeKind::Text { value } => writer.text(value),
            NodeKind::IslandSlot { ordinal } => {
                match islands.iter().find(|island| island.ordinal == *ordinal) {
                    Some(island) => writer.raw(&island_marker(island)),
                    None => tracing::warn!(ordinal, "skeleton slot without island"),
                }
            }
            NodeKind::Element(element) => {
                let Some(kind) = element.component() else {
                    let tag = element.tag.as_str();
                    writer.start_tag(
                        tag,
                        element
                            .attributes
                            .iter()
                            .map(|a| (a.name.as_str(), a.value.as_str())),
                    );
                    if !is_void_element(tag) {
                        stack.push(Frame::Exit(tag));
                        push_children(&mut stack, skeleton, id);
                    }
                    continue;
                };
                let Some(shell) = shell(kind, element) else {
                    push_children(&mut stack, skeleton, id);
                    continue;
                };
                writer.start_tag(
                    shell.tag,
                    shell.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str())),
                );
                if shell.void {
                    continue;
                }
                match shell.content {
                    ShellContent::Children => {
                        stack.push(Frame::Exit(shell.tag));
                        push_children(&mut stack, skeleton, id);
                    }
                    ShellContent::Text(value) => {
                        writer.text(value);
                        writer.end_tag(shell.tag);
                    }
                    ShellContent::Collection(_) => writer.end_tag(shell.tag),
                }
            }
        }
    }
    Ok(writer.into_string())
}

/// Print a tree as custom-tag template markup.
///
/// Parsing the result yields the same tree; island slots print nothing.
pub fn print_markup(ast: &Ast) -> String {
    let mut writer = HtmlWriter::with_capacity(ast.len() * 24);
    let mut stack = vec![Frame::Enter(NodeId::ROOT)];

    while let Some(frame) = stack.pop() {
        let id = match frame {
            Frame::Exit(tag) => {
                writer.end_tag(tag);
                continue;
            }
            Frame::Enter(id) => id,
        };
        match &ast.node(id).kind {
            NodeKind::Root => push_children(&mut stack, ast, id),
            NodeKind::Text { value } => writer.text(value),
            NodeKind::IslandSlot { .. } => {}
            NodeKind::Element(element) => {
                let tag = element.tag.as_str();
                writer.start_tag(
                    tag,
                    element
                        .attributes
                        .iter()
                        .map(|a| (a.name.as_str(), a.value.as_str())),
                );
                if element.component().is_some() || !is_void_element(tag) {
                    stack.push(Frame::Exit(tag));
                    push_children(&mut stack, ast, id);
                }
            }
        }
    }
    writer.into_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::islands::detect_islands;
    use crate::options::CompileOptions;
    use crate::parser::parse;
    use crate::registry::ComponentRegistry;
    use crate::validator::validate;

    fn compile_static(source: &str) -> String {
        let registry = ComponentRegistry::standard();
        let options = CompileOptions::new().without_time_budget();
        let mut ast = parse(source, &registry, &options).unwrap().ast;
        validate(&mut ast, &registry, &options.limits, &Deadline::unbounded()).unwrap();
        let partition = detect_islands(&ast, "hash", "island", &Deadline::unbounded()).unwrap();
        print_static(&partition.skeleton, &partition.islands, &Deadline::unbounded()).unwrap()
    }

    #[test]
    fn test_plain_html() {
        assert_eq!(
            compile_static(r#"<p id="x">a &amp; b<br>c</p>"#),
            r#"<p id="x">a &amp; b<br>c</p>"#
        );
    }

    #[test]
    fn test_island_marker_replaces_subtree() {
        assert_eq!(
            compile_static(r#"<div><OnClick><span>hi</span></OnClick></div>"#),
            r#"<div><div data-island="island-hash-0" data-island-component="OnClick"></div></div>"#
        );
    }

    #[test]
    fn test_static_components_keep_bindings() {
        assert_eq!(
            compile_static(r#"<CenteredBox maxWidth="40rem"><DisplayName as="h2"/></CenteredBox>"#),
            concat!(
                r#"<div class="layout-centered" style="margin-left: auto; margin-right: auto; max-width: 40rem">"#,
                r#"<h2 class="display-name">{owner.displayName}</h2></div>"#
            )
        );
    }

    #[test]
    fn test_show_prints_children() {
        assert_eq!(
            compile_static(r#"<Show when="owner.bio"><p>bio</p></Show>"#),
            "<p>bio</p>"
        );
    }

    #[test]
    fn test_print_markup_is_idempotent() {
        let registry = ComponentRegistry::standard();
        let options = CompileOptions::new();
        let source = r#"<FlexContainer direction="column"><p>a &lt; b</p><Break/><img src="/a.png" alt="x"></FlexContainer><p>tail</p>"#;
        let first = parse(source, &registry, &options).unwrap().ast;
        let printed = print_markup(&first);
        assert_eq!(
            printed,
            r#"<FlexContainer direction="column"><p>a &lt; b</p><Break></Break><img src="/a.png" alt="x"></FlexContainer><p>tail</p>"#
        );
        let second = parse(&printed, &registry, &options).unwrap().ast;
        assert_eq!(first, second);
    }
}
