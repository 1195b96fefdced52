//! `html5ever` tree sink producing a reference-counted DOM.
//!
//! The DOM is short-lived: it exists only between tree construction and
//! sanitization, which converts it into an [`Ast`](crate::ast::Ast).

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, ExpandedName, LocalName, Namespace, ParseOpts, QualName};

pub type Handle = Rc<SinkNode>;

#[derive(Debug)]
pub enum SinkData {
    Document,
    Doctype,
    Element {
        name: QualName,
        attrs: RefCell<Vec<(String, String)>>,
    },
    Text(RefCell<String>),
    Comment,
}

pub struct SinkNode {
    pub data: SinkData,
    parent: Cell<Option<Weak<SinkNode>>>,
    pub children: RefCell<Vec<Handle>>,
}

impl std::fmt::Debug for SinkNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkNode")
            .field("data", &self.data)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

impl SinkNode {
    fn new(data: SinkData) -> Handle {
        Rc::new(Self {
            data,
            parent: Cell::new(None),
            children: RefCell::new(Vec::new()),
        })
    }

    /// Lower-cased local name for elements.
    pub fn local_name(&self) -> Option<&str> {
        match &self.data {
            SinkData::Element { name, .. } => Some(&*name.local),
            _ => None,
        }
    }

    fn parent(&self) -> Option<Handle> {
        let weak = self.parent.take();
        let parent = weak.as_ref().and_then(Weak::upgrade);
        self.parent.set(weak);
        parent
    }
}

impl Drop for SinkNode {
    // Unlink children iteratively so deeply nested input cannot overflow
    // the stack through recursive `Rc` drops.
    fn drop(&mut self) {
        let mut stack = std::mem::take(self.children.get_mut());
        while let Some(node) = stack.pop() {
            if let Ok(mut node) = Rc::try_unwrap(node) {
                stack.append(node.children.get_mut());
            }
        }
    }
}

pub struct Sink {
    document: Handle,
    fallback_name: QualName,
}

impl Default for Sink {
    fn default() -> Self {
        Self {
            document: SinkNode::new(SinkData::Document),
            fallback_name: QualName::new(None, Namespace::from(""), LocalName::from("")),
        }
    }
}

/// Run HTML5 tree construction over `markup`.
pub fn parse_html(markup: &str) -> Handle {
    html5ever::parse_document(Sink::default(), ParseOpts::default()).one(markup)
}

fn append_node(parent: &Handle, child: Handle) {
    if let Some(old) = child.parent() {
        detach(&old, &child);
    }
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

fn detach(parent: &Handle, child: &Handle) {
    parent
        .children
        .borrow_mut()
        .retain(|node| !Rc::ptr_eq(node, child));
    child.parent.set(None);
}

/// Append text to an existing text node if `node` is one.
fn try_merge_text(node: Option<&Handle>, text: &str) -> bool {
    match node.map(|node| &node.data) {
        Some(SinkData::Text(existing)) => {
            existing.borrow_mut().push_str(text);
            true
        }
        _ => false,
    }
}

impl TreeSink for Sink {
    type Handle = Handle;
    type Output = Handle;
    type ElemName<'a> = ExpandedName<'a>;

    fn finish(self) -> Self::Output {
        self.document
    }

    fn parse_error(&self, msg: Cow<'static, str>) {
        tracing::trace!(%msg, "html parse error");
    }

    fn get_document(&self) -> Self::Handle {
        self.document.clone()
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> ExpandedName<'a> {
        match &target.data {
            SinkData::Element { name, .. } => name.expanded(),
            _ => self.fallback_name.expanded(),
        }
    }

    fn create_element(&self, name: QualName, attrs: Vec<Attribute>, _flags: ElementFlags) -> Self::Handle {
        let attrs = attrs
            .into_iter()
            .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
            .collect();
        SinkNode::new(SinkData::Element {
            name,
            attrs: RefCell::new(attrs),
        })
    }

    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        SinkNode::new(SinkData::Comment)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        SinkNode::new(SinkData::Comment)
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => append_node(parent, node),
            NodeOrText::AppendText(text) => {
                if !try_merge_text(parent.children.borrow().last(), &text) {
                    append_node(parent, SinkNode::new(SinkData::Text(RefCell::new(text.to_string()))));
                }
            }
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if element.parent().is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(&self, _name: StrTendril, _public_id: StrTendril, _system_id: StrTendril) {
        append_node(&self.document, SinkNode::new(SinkData::Doctype));
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        target.clone()
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let Some(parent) = sibling.parent() else {
            return;
        };
        let position = parent
            .children
            .borrow()
            .iter()
            .position(|node| Rc::ptr_eq(node, sibling))
            .unwrap_or(0);

        let child = match new_node {
            NodeOrText::AppendText(text) => {
                let merged = position
                    .checked_sub(1)
                    .is_some_and(|prev| try_merge_text(parent.children.borrow().get(prev), &text));
                if merged {
                    return;
                }
                SinkNode::new(SinkData::Text(RefCell::new(text.to_string())))
            }
            NodeOrText::AppendNode(node) => {
                if let Some(old) = node.parent() {
                    detach(&old, &node);
                }
                node
            }
        };
        // Recompute: detaching may have shifted the sibling.
        let position = parent
            .children
            .borrow()
            .iter()
            .position(|node| Rc::ptr_eq(node, sibling))
            .unwrap_or(position);
        child.parent.set(Some(Rc::downgrade(&parent)));
        let mut children = parent.children.borrow_mut();
        let position = position.min(children.len());
        children.insert(position, child);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        if let SinkData::Element { attrs: existing, .. } = &target.data {
            let mut existing = existing.borrow_mut();
            for attr in attrs {
                let name = attr.name.local.to_string();
                if !existing.iter().any(|(n, _)| *n == name) {
                    existing.push((name, attr.value.to_string()));
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        if let Some(parent) = target.parent() {
            detach(&parent, target);
        }
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children = std::mem::take(&mut *node.children.borrow_mut());
        for child in &children {
            child.parent.set(Some(Rc::downgrade(new_parent)));
        }
        new_parent.children.borrow_mut().extend(children);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(document: &Handle) -> Handle {
        let html = document
            .children
            .borrow()
            .iter()
            .find(|n| n.local_name() == Some("html"))
            .cloned()
            .unwrap();
        html.children
            .borrow()
            .iter()
            .find(|n| n.local_name() == Some("body"))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_parses_into_body_and_lowercases_names() {
        let document = parse_html("<FlexContainer Direction=\"row\">hi</FlexContainer>");
        let body = body(&document);
        let children = body.children.borrow();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].local_name(), Some("flexcontainer"));
        let SinkData::Element { attrs, .. } = &children[0].data else {
            panic!("expected element");
        };
        assert_eq!(
            attrs.borrow().as_slice(),
            &[("direction".to_string(), "row".to_string())]
        );
    }

    #[test]
    fn test_repairs_html_nesting() {
        let document = parse_html("<p>one<p>two");
        let body = body(&document);
        assert_eq!(body.children.borrow().len(), 2);
    }

    #[test]
    fn test_deep_nesting_drops_without_overflow() {
        let markup = "<span>".repeat(20_000);
        let document = parse_html(&markup);
        drop(document);
    }
}
