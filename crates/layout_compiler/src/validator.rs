//! Structural validation of a sanitized tree.
//!
//! A single pass over the pre-order arena computes the size statistics,
//! coerces every component's props, checks containment rules and looks for
//! bindings that can never resolve. The loop-scope stack is explicit; a
//! scope is popped as soon as the pass leaves its id range.

use std::collections::BTreeMap;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::ast::{Ast, Attributes, LimitKind, NodeId, NodeKind};
use crate::binding::{BindingPath, DATA_ROOTS, bindings_in};
use crate::budget::{BudgetExceeded, Deadline};
use crate::diagnostic::{Diagnostic, DiagnosticCode};
use crate::options::Limits;
use crate::registry::{
    ComponentKind, ComponentRegistry, PropType, PropValue, Props, RelationshipKind,
};

/// Size statistics of a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AstStats {
    /// Elements and text nodes, excluding the root.
    pub node_count: usize,
    /// Deepest element nesting; top-level elements are at depth 1.
    pub max_depth: usize,
    /// Occurrences per component name.
    pub component_counts: BTreeMap<String, usize>,
}

impl AstStats {
    pub fn component_total(&self) -> usize {
        self.component_counts.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub stats: AstStats,
}

impl ValidationResult {
    /// The first error, used as the failure reason.
    pub fn reason(&self) -> Option<&str> {
        self.errors.first().map(|error| error.text.as_str())
    }
}

struct LoopScope {
    end: NodeId,
    names: Vec<String>,
}

struct Pass<'a> {
    ast: &'a Ast,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    reported_bindings: FxHashSet<String>,
    scopes: Vec<LoopScope>,
}

/// Validate `ast` against `limits` and the registry contracts.
///
/// Coerced props are stored on each component element so later stages read
/// typed values.
pub fn validate(
    ast: &mut Ast,
    registry: &ComponentRegistry,
    limits: &Limits,
    deadline: &Deadline,
) -> Result<ValidationResult, BudgetExceeded> {
    let mut stats = AstStats {
        node_count: ast.node_count(),
        ..AstStats::default()
    };
    let mut coerced = Vec::new();

    let shared: &Ast = ast;
    let mut pass = Pass {
        ast: shared,
        errors: Vec::new(),
        warnings: Vec::new(),
        reported_bindings: FxHashSet::default(),
        scopes: Vec::new(),
    };

    for (id, node) in shared.iter().skip(1) {
        deadline.tick(id.index())?;
        while pass.scopes.last().is_some_and(|scope| id >= scope.end) {
            pass.scopes.pop();
        }

        match &node.kind {
            NodeKind::Text { value } => pass.check_bindings(value),
            NodeKind::Element(element) => {
                stats.max_depth = stats.max_depth.max(node.depth as usize);
                for attribute in &element.attributes {
                    pass.check_bindings(&attribute.value);
                }
                let Some(kind) = element.component() else {
                    continue;
                };
                *stats
                    .component_counts
                    .entry(kind.name().to_string())
                    .or_default() += 1;

                match registry.coerce(kind, &element.attributes) {
                    Ok(props) => {
                        pass.report_css_corrections(kind, registry, &element.attributes, &props);
                        pass.check_component(id, kind, registry, &props);
                        coerced.push((id, props));
                    }
                    Err(prop_errors) => {
                        for error in prop_errors {
                            pass.errors.push(
                                Diagnostic::error(
                                    DiagnosticCode::InvalidProp,
                                    format!("<{kind}> prop `{}` {}", error.prop, error.message),
                                )
                                .with_hint(format!("check the `{}` attribute on <{kind}>", error.prop)),
                            );
                        }
                        pass.check_containment(id, kind, registry);
                        if kind == ComponentKind::ForEach {
                            // Keep the declared names in scope so the body
                            // does not also report unknown bindings.
                            let names = ["item", "index"]
                                .into_iter()
                                .filter_map(|prop| element.attributes.get(prop))
                                .map(|name| name.trim().to_string())
                                .collect();
                            pass.scopes.push(LoopScope { end: node.end, names });
                        }
                    }
                }
            }
            NodeKind::Root | NodeKind::IslandSlot { .. } => {}
        }
    }

    let mut errors = limit_errors(&stats, limits);
    errors.append(&mut pass.errors);
    let warnings = pass.warnings;

    for (id, props) in coerced {
        if let NodeKind::Element(element) = &mut ast.node_mut(id).kind {
            element.props = props;
        }
    }

    tracing::debug!(
        nodes = stats.node_count,
        depth = stats.max_depth,
        components = stats.component_total(),
        errors = errors.len(),
        "validated template"
    );
    Ok(ValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        stats,
    })
}

fn limit_errors(stats: &AstStats, limits: &Limits) -> Vec<Diagnostic> {
    [
        (LimitKind::NodeCount, stats.node_count, limits.max_nodes),
        (LimitKind::Depth, stats.max_depth, limits.max_depth),
        (
            LimitKind::ComponentCount,
            stats.component_total(),
            limits.max_components,
        ),
    ]
    .into_iter()
    .filter(|(_, actual, limit)| actual > limit)
    .map(|(kind, actual, limit)| limit_diagnostic(kind, actual, limit))
    .collect()
}

fn limit_diagnostic(kind: LimitKind, actual: usize, limit: usize) -> Diagnostic {
    let hint = match kind {
        LimitKind::NodeCount => "split the layout into fewer elements",
        LimitKind::Depth => "flatten nested containers",
        LimitKind::ComponentCount => "use fewer components",
    };
    Diagnostic::error(
        DiagnosticCode::ValidationLimitExceeded,
        format!("template {} is {actual}, the limit is {limit}", kind.as_str()),
    )
    .with_hint(hint)
}

impl Pass<'_> {
    fn in_scope(&self, name: &str) -> bool {
        DATA_ROOTS.contains(&name)
            || self
                .scopes
                .iter()
                .any(|scope| scope.names.iter().any(|n| n == name))
    }

    fn check_path(&mut self, path: &BindingPath) {
        let root = path.root();
        if self.in_scope(root) {
            return;
        }
        let rendered = path.to_string();
        if self.reported_bindings.insert(rendered.clone()) {
            self.warnings.push(
                Diagnostic::warning(
                    DiagnosticCode::UnknownBinding,
                    format!("binding `{{{rendered}}}` does not refer to resident data or a loop variable"),
                )
                .with_hint(format!("known roots: {}", DATA_ROOTS.join(", "))),
            );
        }
    }

    fn check_bindings(&mut self, value: &str) {
        for path in bindings_in(value) {
            self.check_path(&path);
        }
    }

    fn has_ancestor(&self, id: NodeId, kind: ComponentKind) -> bool {
        self.ast
            .ancestors(id)
            .any(|ancestor| self.ast.node(ancestor).component() == Some(kind))
    }

    fn containment_error(&mut self, text: String, hint: &str) {
        self.errors
            .push(Diagnostic::error(DiagnosticCode::ContainmentViolation, text).with_hint(hint));
    }

    fn check_containment(&mut self, id: NodeId, kind: ComponentKind, registry: &ComponentRegistry) {
        let node = self.ast.node(id);
        let is_leaf = registry
            .definition(kind)
            .is_some_and(|definition| definition.relationship.kind == RelationshipKind::Leaf);
        if is_leaf && !node.children.is_empty() {
            self.containment_error(
                format!("<{kind}> cannot have children"),
                "write it as a self-closing tag",
            );
        }
        match kind {
            ComponentKind::Break | ComponentKind::Continue
                if !self.has_ancestor(id, ComponentKind::ForEach) =>
            {
                self.containment_error(
                    format!("<{kind}> must be inside a <ForEach>"),
                    "loop control only applies to an enclosing loop",
                );
            }
            ComponentKind::OnTimeout if !self.has_ancestor(id, ComponentKind::Timeout) => {
                self.containment_error(
                    "<OnTimeout> must be inside a <Timeout>".to_string(),
                    "wrap it in <Timeout ms=\"...\">",
                );
            }
            ComponentKind::Validate => {
                let has_field = self.ast.subtree(id).skip(1).any(|index| {
                    self.ast
                        .node(NodeId::new(index))
                        .element()
                        .is_some_and(|e| matches!(e.tag.as_str(), "input" | "textarea" | "select"))
                });
                if !has_field {
                    self.warnings.push(
                        Diagnostic::warning(
                            DiagnosticCode::ContainmentViolation,
                            "<Validate> has no input, textarea or select to validate",
                        )
                        .with_hint("place the form field inside <Validate>"),
                    );
                }
            }
            _ => {}
        }
    }

    /// Warn for each CSS-valued prop the validator rewrote.
    fn report_css_corrections(
        &mut self,
        kind: ComponentKind,
        registry: &ComponentRegistry,
        attributes: &Attributes,
        props: &Props,
    ) {
        let Some(definition) = registry.definition(kind) else {
            return;
        };
        for entry in &definition.props {
            let PropType::Css(property) = entry.ty else {
                continue;
            };
            if let (Some(raw), Some(value)) = (attributes.get(entry.name), props.str(entry.name))
                && raw != value
            {
                self.warnings.push(Diagnostic::warning(
                    DiagnosticCode::CssCorrected,
                    format!(
                        "<{kind}> prop `{}` ({property}) corrected from \"{raw}\" to \"{value}\"",
                        entry.name
                    ),
                ));
            }
        }
    }

    fn check_component(
        &mut self,
        id: NodeId,
        kind: ComponentKind,
        registry: &ComponentRegistry,
        props: &Props,
    ) {
        self.check_containment(id, kind, registry);

        if kind == ComponentKind::ForEach {
            if let Some(var) = props.binding("var") {
                self.check_path(&var);
            }
            let mut names = Vec::new();
            for prop in ["item", "index"] {
                match props.get(prop) {
                    Some(PropValue::Binding(name)) if !name.contains('.') => names.push(name.clone()),
                    Some(PropValue::Binding(name)) => self.errors.push(Diagnostic::error(
                        DiagnosticCode::InvalidProp,
                        format!("<ForEach> prop `{prop}` must be a plain name, found \"{name}\""),
                    )),
                    _ => {}
                }
            }
            self.scopes.push(LoopScope {
                end: self.ast.node(id).end,
                names,
            });
            if let Some(when) = props.binding("when") {
                self.check_path(&when);
            }
            return;
        }

        for (_, value) in props.iter() {
            if let PropValue::Binding(path) = value
                && let Some(path) = BindingPath::parse(path)
            {
                self.check_path(&path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use crate::parser::parse;

    fn run(source: &str) -> (Ast, ValidationResult) {
        let registry = ComponentRegistry::standard();
        let options = CompileOptions::new().without_time_budget();
        let mut ast = parse(source, &registry, &options).unwrap().ast;
        let result = validate(&mut ast, &registry, &options.limits, &Deadline::unbounded()).unwrap();
        (ast, result)
    }

    #[test]
    fn test_valid_template_stats() {
        let (_, result) = run(
            r#"<FlexContainer><DisplayName/><OnClick><span>hi</span></OnClick></FlexContainer>"#,
        );
        assert!(result.is_valid, "{:?}", result.errors);
        assert_eq!(result.stats.node_count, 5);
        assert_eq!(result.stats.max_depth, 3);
        assert_eq!(result.stats.component_counts.get("OnClick"), Some(&1));
        assert_eq!(result.stats.component_total(), 3);
    }

    #[test]
    fn test_depth_error_names_actual_depth() {
        let source = format!("{}{}", "<div>".repeat(25), "</div>".repeat(25));
        let (_, result) = run(&source);
        assert!(!result.is_valid);
        assert_eq!(result.stats.max_depth, 25);
        assert_eq!(result.errors[0].code, DiagnosticCode::ValidationLimitExceeded);
        assert!(result.errors[0].text.contains("depth is 25"));
    }

    #[test]
    fn test_node_and_component_limits() {
        let source = "<Bio></Bio>".repeat(51);
        let (_, result) = run(&source);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].text.contains("component count is 51"));

        let source = "<br>".repeat(201);
        let (_, result) = run(&source);
        assert!(result.errors[0].text.contains("node count is 201"));
    }

    #[test]
    fn test_props_are_coerced_and_stored() {
        let (ast, result) = run(r#"<ForEach var="posts" item="post"><p>{post.id}</p></ForEach>"#);
        assert!(result.is_valid);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        let element = ast.node(NodeId::new(1)).element().unwrap();
        assert_eq!(
            element.props.get("item"),
            Some(&PropValue::Binding("post".to_string()))
        );
    }

    #[test]
    fn test_invalid_prop() {
        let (_, result) = run(r#"<OnInterval ms="5"><span>x</span></OnInterval>"#);
        assert_eq!(result.errors[0].code, DiagnosticCode::InvalidProp);
        assert!(result.errors[0].text.contains("`ms`"));
    }

    #[test]
    fn test_loop_control_needs_loop() {
        let (_, result) = run("<div><Break/></div>");
        assert_eq!(result.errors[0].code, DiagnosticCode::ContainmentViolation);
        assert!(result.errors[0].text.contains("<ForEach>"));

        let (_, result) = run(r#"<ForEach var="posts" item="p"><Continue when="p.hidden"/></ForEach>"#);
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn test_leaf_with_children() {
        let (_, result) = run("<Bio><span>x</span></Bio>");
        assert!(result.errors[0].text.contains("cannot have children"));
    }

    #[test]
    fn test_on_timeout_needs_timeout() {
        let (_, result) = run("<OnTimeout><p>late</p></OnTimeout>");
        assert!(!result.is_valid);
        let (_, result) = run(r#"<Timeout ms="500"><OnTimeout><p>late</p></OnTimeout></Timeout>"#);
        assert!(result.is_valid);
    }

    #[test]
    fn test_warnings() {
        let (_, result) = run(r#"<Validate required><p>{mystery.value}</p></Validate>"#);
        assert!(result.is_valid);
        let codes: Vec<_> = result.warnings.iter().map(|w| w.code).collect();
        assert_eq!(
            codes,
            vec![DiagnosticCode::ContainmentViolation, DiagnosticCode::UnknownBinding]
        );
    }

    #[test]
    fn test_loop_variable_out_of_scope() {
        let (_, result) = run(
            r#"<ForEach var="posts" item="post"><p>{post.id}</p></ForEach><p>{post.id}</p>"#,
        );
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, DiagnosticCode::UnknownBinding);
    }

    #[test]
    fn test_layout_css_props_are_validated() {
        let (_, result) = run(
            r#"<CenteredBox padding="0; position: fixed; inset: 0; background: url(https://evil.example/x)"><p>x</p></CenteredBox>"#,
        );
        assert!(!result.is_valid);
        assert_eq!(result.errors[0].code, DiagnosticCode::InvalidProp);
        assert!(result.errors[0].text.contains("`padding`"));

        let (_, result) = run(r#"<FlexContainer gap="{owner.displayName}"><p>x</p></FlexContainer>"#);
        assert_eq!(result.errors[0].code, DiagnosticCode::InvalidProp);
        assert!(result.errors[0].text.contains("binding"));
    }

    #[test]
    fn test_corrected_css_prop_warns() {
        let (ast, result) = run(r#"<GridLayout gap="16" minColumnWidth="200px"><p>x</p></GridLayout>"#);
        assert!(result.is_valid, "{:?}", result.errors);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].code, DiagnosticCode::CssCorrected);
        assert!(result.warnings[0].text.contains("\"16px\""));
        let NodeKind::Element(grid) = &ast.node(NodeId::new(1)).kind else {
            panic!("expected the grid element");
        };
        let props = &grid.props;
        assert_eq!(props.str("gap"), Some("16px"));
        assert_eq!(props.str("minColumnWidth"), Some("200px"));
    }
}
