//! Rendering of compiled templates against resident data.
//!
//! One renderer serves both the server pass over a whole document and the
//! per-island replay done at hydration time. Islands are always rendered by
//! the same routine, so the island region of a document is byte-identical
//! to [`Renderer::render_island`] for the same data.
//!
//! Traversal is an explicit stack machine. `ForEach` pushes a loop frame
//! that re-arms itself once per item; `Break` and `Continue` unwind the
//! stack to the innermost iteration, closing any tags opened on the way.

mod data;

use std::borrow::Cow;
use std::time::Duration;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::ast::{Ast, Element, NodeId, NodeKind};
use crate::binding::{BindingPath, TemplatePart, split_bindings};
use crate::budget::{BudgetExceeded, Deadline};
use crate::css::sanitize_inline_style;
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::islands::Island;
use crate::pipeline::{CompiledTemplate, IntegrityError};
use crate::printer::{HtmlWriter, ShellContent, shell, write_island_close, write_island_open};
use crate::registry::{ComponentKind, ComponentRegistry, PropValue, Props, is_safe_url, is_url_attribute};

pub use data::{Capabilities, GuestbookEntry, ImageRef, Owner, Post, ResidentData, Viewer};

/// Default wall-clock budget for a document render.
pub const DEFAULT_RENDER_BUDGET: Duration = Duration::from_millis(250);
/// Default cap on the items a single `ForEach` visits.
pub const DEFAULT_MAX_LOOP_ITEMS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderMode {
    /// Unresolved bindings render empty.
    #[default]
    Production,
    /// Unresolved bindings render a visible placeholder and a warning.
    Preview,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub mode: RenderMode,
    /// Budget for [`Renderer::render_document`] and
    /// [`Renderer::render_island`]. `None` disables the check.
    pub time_budget: Option<Duration>,
    pub max_loop_items: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            time_budget: Some(DEFAULT_RENDER_BUDGET),
            max_loop_items: DEFAULT_MAX_LOOP_ITEMS,
        }
    }
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    #[must_use]
    pub fn without_time_budget(mut self) -> Self {
        self.time_budget = None;
        self
    }

    #[must_use]
    pub fn with_max_loop_items(mut self, max: usize) -> Self {
        self.max_loop_items = max;
        self
    }
}

/// Output of a render call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
    pub success: bool,
    pub content: String,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl RenderResult {
    fn failure(error: &RenderError, warnings: Vec<Diagnostic>) -> Self {
        Self {
            success: false,
            content: String::new(),
            errors: vec![error.to_diagnostic()],
            warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydratedIsland {
    pub id: String,
    pub markup: String,
}

/// Result of a page-level hydration pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HydrationBatch {
    pub islands: Vec<HydratedIsland>,
    /// Islands not rendered within the budget; they keep their static marker.
    pub abandoned: Vec<String>,
    pub warnings: Vec<Diagnostic>,
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error("island `{0}` does not exist in this template")]
    IslandNotFound(String),
    #[error("resident data could not be read: {0}")]
    Data(#[from] serde_json::Error),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl RenderError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        let code = match self {
            Self::Budget(_) => DiagnosticCode::RenderBudgetExceeded,
            Self::IslandNotFound(_) => DiagnosticCode::IslandNotFound,
            Self::Data(_) | Self::Integrity(_) => DiagnosticCode::InvalidRenderInput,
        };
        Diagnostic::error(code, self.to_string())
    }
}

/// Renders compiled templates. Cheap to construct; holds no per-call state.
#[derive(Debug, Clone)]
pub struct Renderer<'r> {
    registry: &'r ComponentRegistry,
    options: RenderOptions,
}

impl<'r> Renderer<'r> {
    pub fn new(registry: &'r ComponentRegistry, mode: RenderMode) -> Self {
        Self::with_options(registry, RenderOptions::new().with_mode(mode))
    }

    pub fn with_options(registry: &'r ComponentRegistry, options: RenderOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render the whole template, islands included.
    #[tracing::instrument(skip_all, fields(mode = ?self.options.mode))]
    pub fn render_document(&self, compiled: &CompiledTemplate, data: &ResidentData) -> RenderResult {
        if let Err(error) = compiled.verify() {
            return RenderResult::failure(&error.into(), Vec::new());
        }
        let root = match data.to_value() {
            Ok(root) => root,
            Err(error) => return RenderResult::failure(&error.into(), Vec::new()),
        };
        let deadline = Deadline::new(self.options.time_budget);
        let islands: FxHashMap<NodeId, &Island> =
            compiled.islands.iter().map(|island| (island.root, island)).collect();

        let mut pass = Pass::new(self, &compiled.ast, data, &root, &deadline);
        let outcome = pass.run(NodeId::ROOT, Some(&islands));
        pass.finish(outcome)
    }

    /// Render one island, wrapper included, for hydration.
    #[tracing::instrument(skip_all, fields(island = island_id))]
    pub fn render_island(
        &self,
        compiled: &CompiledTemplate,
        island_id: &str,
        data: &ResidentData,
    ) -> RenderResult {
        if let Err(error) = compiled.verify() {
            return RenderResult::failure(&error.into(), Vec::new());
        }
        let Some(island) = compiled.island(island_id) else {
            return RenderResult::failure(
                &RenderError::IslandNotFound(island_id.to_string()),
                Vec::new(),
            );
        };
        let root = match data.to_value() {
            Ok(root) => root,
            Err(error) => return RenderResult::failure(&error.into(), Vec::new()),
        };
        let deadline = Deadline::new(self.options.time_budget);
        let mut pass = Pass::new(self, &compiled.ast, data, &root, &deadline);
        let outcome = pass.island(island);
        pass.finish(outcome)
    }

    /// Render every island in isolation within one shared `budget`.
    ///
    /// An island that fails or runs out of time is reported in `abandoned`
    /// and never affects its siblings.
    pub fn render_islands(
        &self,
        compiled: &CompiledTemplate,
        data: &ResidentData,
        budget: Duration,
    ) -> HydrationBatch {
        let mut batch = HydrationBatch::default();
        let all_abandoned = |error: RenderError| HydrationBatch {
            islands: Vec::new(),
            abandoned: compiled.islands.iter().map(|i| i.id.clone()).collect(),
            warnings: vec![error.to_diagnostic()],
        };
        if let Err(error) = compiled.verify() {
            return all_abandoned(error.into());
        }
        let root = match data.to_value() {
            Ok(root) => root,
            Err(error) => return all_abandoned(error.into()),
        };
        let deadline = Deadline::new(Some(budget));

        for island in &compiled.islands {
            if deadline.is_expired() {
                batch.abandoned.push(island.id.clone());
                continue;
            }
            let mut pass = Pass::new(self, &compiled.ast, data, &root, &deadline);
            match pass.island(island) {
                Ok(()) => {
                    batch.warnings.append(&mut pass.warnings);
                    batch.islands.push(HydratedIsland {
                        id: island.id.clone(),
                        markup: pass.writer.into_string(),
                    });
                }
                Err(error) => {
                    tracing::warn!(island = %island.id, %error, "island abandoned");
                    batch.abandoned.push(island.id.clone());
                }
            }
        }
        tracing::debug!(
            rendered = batch.islands.len(),
            abandoned = batch.abandoned.len(),
            "hydration batch finished"
        );
        batch
    }
}

struct Scope {
    item_name: String,
    item: Value,
    index_name: Option<String>,
    index: usize,
}

struct LoopFrame {
    node: NodeId,
    items: Vec<Value>,
    next: usize,
    item_name: String,
    index_name: Option<String>,
    when: Option<BindingPath>,
}

enum Frame<'a> {
    Enter(NodeId),
    Close(&'a str),
    Loop(LoopFrame),
    /// End of one loop iteration.
    PopScope,
}

struct Pass<'a> {
    registry: &'a ComponentRegistry,
    mode: RenderMode,
    max_loop_items: usize,
    ast: &'a Ast,
    data: &'a ResidentData,
    root: &'a Value,
    deadline: &'a Deadline,
    writer: HtmlWriter,
    scopes: Vec<Scope>,
    warnings: Vec<Diagnostic>,
    reported: FxHashSet<String>,
    iteration: usize,
}

fn push_children(stack: &mut Vec<Frame<'_>>, ast: &Ast, id: NodeId) {
    stack.extend(ast.children(id).iter().rev().map(|&child| Frame::Enter(child)));
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn count_prop(props: &Props, name: &str) -> Option<usize> {
    props.number(name).map(|n| n.max(0.0) as usize)
}

impl<'a> Pass<'a> {
    fn new(
        renderer: &Renderer<'a>,
        ast: &'a Ast,
        data: &'a ResidentData,
        root: &'a Value,
        deadline: &'a Deadline,
    ) -> Self {
        Self {
            registry: renderer.registry,
            mode: renderer.options.mode,
            max_loop_items: renderer.options.max_loop_items,
            ast,
            data,
            root,
            deadline,
            writer: HtmlWriter::with_capacity(ast.len() * 48),
            scopes: Vec::new(),
            warnings: Vec::new(),
            reported: FxHashSet::default(),
            iteration: 0,
        }
    }

    fn finish(self, outcome: Result<(), RenderError>) -> RenderResult {
        match outcome {
            Ok(()) => RenderResult {
                success: true,
                content: self.writer.into_string(),
                errors: Vec::new(),
                warnings: self.warnings,
            },
            Err(error) => RenderResult::failure(&error, self.warnings),
        }
    }

    fn tick(&mut self) -> Result<(), BudgetExceeded> {
        self.iteration += 1;
        self.deadline.tick(self.iteration)
    }

    fn island(&mut self, island: &Island) -> Result<(), RenderError> {
        write_island_open(&mut self.writer, island);
        self.run(island.root, None)?;
        write_island_close(&mut self.writer);
        Ok(())
    }

    /// Render the subtree at `start`. With `islands`, island roots are
    /// delegated to [`island`](Self::island).
    fn run(
        &mut self,
        start: NodeId,
        islands: Option<&FxHashMap<NodeId, &Island>>,
    ) -> Result<(), RenderError> {
        let ast = self.ast;
        let mut stack = vec![Frame::Enter(start)];

        while let Some(frame) = stack.pop() {
            self.tick()?;
            let id = match frame {
                Frame::Enter(id) => id,
                Frame::Close(tag) => {
                    self.writer.end_tag(tag);
                    continue;
                }
                Frame::PopScope => {
                    self.scopes.pop();
                    continue;
                }
                Frame::Loop(mut frame) => {
                    if self.next_iteration(&mut frame) {
                        let node = frame.node;
                        stack.push(Frame::Loop(frame));
                        stack.push(Frame::PopScope);
                        push_children(&mut stack, ast, node);
                    }
                    continue;
                }
            };

            match &ast.node(id).kind {
                NodeKind::Root => push_children(&mut stack, ast, id),
                NodeKind::Text { value } => self.text(value, None),
                NodeKind::IslandSlot { .. } => {}
                NodeKind::Element(element) => {
                    if let Some(island) = islands.and_then(|islands| islands.get(&id)) {
                        self.island(island)?;
                        continue;
                    }
                    match element.component() {
                        None => {
                            let tag = element.tag.as_str();
                            self.start_tag(
                                tag,
                                element
                                    .attributes
                                    .iter()
                                    .map(|a| (a.name.as_str(), a.value.as_str())),
                            );
                            if !crate::registry::is_void_element(tag) {
                                stack.push(Frame::Close(tag));
                                push_children(&mut stack, ast, id);
                            }
                        }
                        Some(kind) => self.component(kind, id, element, &mut stack)?,
                    }
                }
            }
        }
        Ok(())
    }

    /// Props of a component. Templates compiled before props were stored
    /// on elements are coerced on the fly.
    fn props(&self, kind: ComponentKind, element: &'a Element) -> Cow<'a, Props> {
        if element.props.is_empty()
            && let Ok(props) = self.registry.coerce(kind, &element.attributes)
        {
            return Cow::Owned(props);
        }
        Cow::Borrowed(&element.props)
    }

    fn component(
        &mut self,
        kind: ComponentKind,
        id: NodeId,
        element: &'a Element,
        stack: &mut Vec<Frame<'a>>,
    ) -> Result<(), RenderError> {
        let ast = self.ast;
        let props = self.props(kind, element);
        match kind {
            ComponentKind::Show => {
                let shown = props.binding("when").is_some_and(|when| self.truthy(&when));
                if shown != props.bool("not").unwrap_or(false) {
                    push_children(stack, ast, id);
                }
            }
            ComponentKind::ForEach => {
                let items = match props.binding("var") {
                    Some(var) => self.items(&var),
                    None => Vec::new(),
                };
                let item_name = match props.get("item") {
                    Some(PropValue::Binding(name)) => name.clone(),
                    _ => return Ok(()),
                };
                let index_name = match props.get("index") {
                    Some(PropValue::Binding(name)) => Some(name.clone()),
                    _ => None,
                };
                stack.push(Frame::Loop(LoopFrame {
                    node: id,
                    items,
                    next: 0,
                    item_name,
                    index_name,
                    when: props.binding("when"),
                }));
            }
            ComponentKind::Break | ComponentKind::Continue => {
                let guard = props.binding("when").is_none_or(|when| self.truthy(&when));
                if guard && !self.scopes.is_empty() {
                    self.unwind(stack, kind == ComponentKind::Break);
                }
            }
            _ => {
                let Some(shell) = shell(kind, element) else {
                    push_children(stack, ast, id);
                    return Ok(());
                };
                self.start_tag(
                    shell.tag,
                    shell.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str())),
                );
                if shell.void {
                    return Ok(());
                }
                match shell.content {
                    ShellContent::Children => {
                        stack.push(Frame::Close(shell.tag));
                        push_children(stack, ast, id);
                    }
                    ShellContent::Text(template) => {
                        self.text(template, count_prop(&props, "maxLength"));
                        self.writer.end_tag(shell.tag);
                    }
                    ShellContent::Collection(kind) => {
                        self.collection(kind, &props)?;
                        self.writer.end_tag(shell.tag);
                    }
                }
            }
        }
        Ok(())
    }

    /// Advance `frame` to the next item that passes its `when` filter and
    /// bind it. Returns `false` once the loop is exhausted.
    fn next_iteration(&mut self, frame: &mut LoopFrame) -> bool {
        while frame.next < frame.items.len() {
            let index = frame.next;
            frame.next += 1;
            self.scopes.push(Scope {
                item_name: frame.item_name.clone(),
                item: frame.items[index].clone(),
                index_name: frame.index_name.clone(),
                index,
            });
            if frame.when.as_ref().is_none_or(|when| self.truthy(when)) {
                return true;
            }
            self.scopes.pop();
        }
        false
    }

    /// Unwind to the end of the innermost loop iteration. `Break` also
    /// drops the loop frame so no further items are visited.
    fn unwind(&mut self, stack: &mut Vec<Frame<'a>>, is_break: bool) {
        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Close(tag) => self.writer.end_tag(tag),
                Frame::PopScope => {
                    self.scopes.pop();
                    if is_break && matches!(stack.last(), Some(Frame::Loop(_))) {
                        stack.pop();
                    }
                    return;
                }
                Frame::Enter(_) | Frame::Loop(_) => {}
            }
        }
    }

    fn lookup(&self, path: &BindingPath) -> Option<Cow<'_, Value>> {
        let root = path.root();
        for scope in self.scopes.iter().rev() {
            if scope.item_name == root {
                return data::walk(&scope.item, path.rest()).map(Cow::Borrowed);
            }
            if scope.index_name.as_deref() == Some(root) {
                return path
                    .rest()
                    .is_empty()
                    .then(|| Cow::Owned(Value::from(scope.index)));
            }
        }
        data::lookup_root(self.root, path).map(Cow::Borrowed)
    }

    fn truthy(&self, path: &BindingPath) -> bool {
        self.lookup(path).is_some_and(|value| data::is_truthy(&value))
    }

    fn resolve_text(&self, path: &BindingPath) -> Option<String> {
        let value = self.lookup(path)?;
        data::value_text(&value).map(Cow::into_owned)
    }

    fn items(&mut self, path: &BindingPath) -> Vec<Value> {
        let items = match self.lookup(path).as_deref() {
            Some(Value::Array(items)) => Some(items.iter().take(self.max_loop_items).cloned().collect()),
            Some(_) => Some(Vec::new()),
            None => None,
        };
        items.unwrap_or_else(|| {
            self.report_unresolved(path);
            Vec::new()
        })
    }

    fn report_unresolved(&mut self, path: &BindingPath) {
        if self.mode != RenderMode::Preview {
            return;
        }
        let rendered = path.to_string();
        if self.reported.insert(rendered.clone()) {
            self.warnings.push(
                Diagnostic::warning(
                    DiagnosticCode::RenderBindingUnresolved,
                    format!("binding `{{{rendered}}}` has no value"),
                )
                .with_hint("production renders unresolved bindings as empty"),
            );
        }
    }

    /// Write text with bindings resolved. `limit` caps the characters taken
    /// from resolved values.
    fn text(&mut self, value: &str, limit: Option<usize>) {
        for part in split_bindings(value) {
            match part {
                TemplatePart::Literal(literal) => self.writer.text(literal),
                TemplatePart::Binding(path) => match self.resolve_text(&path) {
                    Some(text) => match limit {
                        Some(limit) => {
                            let cut: String = text.chars().take(limit).collect();
                            self.writer.text(&cut);
                        }
                        None => self.writer.text(&text),
                    },
                    None => {
                        self.report_unresolved(&path);
                        if self.mode == RenderMode::Preview {
                            self.writer.start_tag("span", [("class", "binding-unresolved")]);
                            self.writer.text(&format!("{{{path}}}"));
                            self.writer.end_tag("span");
                        }
                    }
                },
            }
        }
    }

    fn attribute_value(&mut self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for part in split_bindings(value) {
            match part {
                TemplatePart::Literal(literal) => out.push_str(literal),
                TemplatePart::Binding(path) => match self.resolve_text(&path) {
                    Some(text) => out.push_str(&text),
                    None => {
                        self.report_unresolved(&path);
                        if self.mode == RenderMode::Preview {
                            out.push_str(&format!("{{{path}}}"));
                        }
                    }
                },
            }
        }
        out
    }

    /// Write a start tag with bindings resolved. URL attributes and styles
    /// that took resident data are checked again after resolution.
    fn start_tag<'t>(&mut self, tag: &str, attributes: impl Iterator<Item = (&'t str, &'t str)>) {
        let mut resolved = Vec::new();
        for (name, raw) in attributes {
            let value = self.attribute_value(raw);
            if is_url_attribute(name) && !is_safe_url(&value) {
                continue;
            }
            if name.eq_ignore_ascii_case("style") && value != raw {
                let style = sanitize_inline_style(&value);
                self.warnings.extend(style.diagnostics);
                if let Some(value) = style.value {
                    resolved.push((name, value));
                }
                continue;
            }
            resolved.push((name, value));
        }
        self.writer
            .start_tag(tag, resolved.iter().map(|(name, value)| (*name, value.as_str())));
    }

    fn collection(&mut self, kind: ComponentKind, props: &Props) -> Result<(), BudgetExceeded> {
        let data = self.data;
        match kind {
            ComponentKind::BlogPosts => {
                let show_dates = props.bool("showDates").unwrap_or(true);
                for post in data.posts.iter().take(count_prop(props, "limit").unwrap_or(5)) {
                    self.tick()?;
                    self.writer.start_tag(
                        "article",
                        [("class", "blog-post"), ("data-post-id", post.id.as_str())],
                    );
                    self.writer.raw(&post.content_html);
                    if show_dates && !post.created_at.is_empty() {
                        self.writer
                            .start_tag("time", [("datetime", post.created_at.as_str())]);
                        self.writer.text(&post.created_at);
                        self.writer.end_tag("time");
                    }
                    self.writer.end_tag("article");
                }
            }
            ComponentKind::Guestbook => {
                for entry in data.guestbook.iter().take(count_prop(props, "limit").unwrap_or(10)) {
                    self.tick()?;
                    self.writer.start_tag(
                        "div",
                        [("class", "guestbook-entry"), ("data-entry-id", entry.id.as_str())],
                    );
                    self.writer.start_tag("p", [("class", "guestbook-message")]);
                    self.writer.text(&entry.message);
                    self.writer.end_tag("p");
                    self.writer.start_tag("span", [("class", "guestbook-author")]);
                    self.writer
                        .text(entry.author_username.as_deref().unwrap_or("anonymous"));
                    self.writer.end_tag("span");
                    self.writer.end_tag("div");
                }
            }
            ComponentKind::ImageGallery => {
                let limit = count_prop(props, "limit").unwrap_or(12);
                for image in data.images.iter().filter(|i| is_safe_url(&i.url)).take(limit) {
                    self.tick()?;
                    self.writer.start_tag(
                        "img",
                        [
                            ("src", image.url.as_str()),
                            ("alt", image.alt.as_deref().unwrap_or_default()),
                            ("loading", "lazy"),
                        ],
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}
