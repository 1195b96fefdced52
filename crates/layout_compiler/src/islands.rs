//! Partitioning of a validated tree into a static skeleton and islands.
//!
//! An island is the smallest subtree that needs client-side behavior: it is
//! rooted at an interactive component that has no interactive ancestor.
//! Everything else is static and printed once at compile time.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::{Ast, AstBuilder, LimitExceeded, NodeId, NodeKind};
use crate::budget::{BudgetExceeded, Deadline};
use crate::registry::{ComponentKind, Props};

/// How a node relates to client-side behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeClass {
    Static,
    /// Static itself, with an interactive descendant.
    HostsIslands,
    Interactive,
}

/// A dynamic subtree of the validated tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Island {
    pub id: String,
    pub component: ComponentKind,
    pub props: Props,
    /// Position among the template's islands, in document order.
    pub ordinal: u32,
    /// The island root in the validated tree.
    pub root: NodeId,
    /// One past the last node of the island subtree.
    pub end: NodeId,
}

impl Island {
    pub fn contains(&self, id: NodeId) -> bool {
        self.root <= id && id < self.end
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IslandPartition {
    /// The validated tree with every island root replaced by a slot.
    pub skeleton: Ast,
    pub islands: Vec<Island>,
    /// Classification of every node of the validated tree, by index.
    pub classes: Vec<NodeClass>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IslandError {
    #[error(transparent)]
    Limit(#[from] LimitExceeded),
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error("skeleton references island slot {0} but no such island exists")]
    MissingIsland(u32),
}

/// Short stable hash of the template source, used in island ids.
pub fn template_hash(source: &str) -> String {
    let mut hasher = FxHasher::default();
    source.hash(&mut hasher);
    to_base32_like(hasher.finish())
}

fn to_base32_like(hash: u64) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";
    let mut result = String::with_capacity(8);
    let mut h = hash;
    for _ in 0..8 {
        result.push(char::from(ALPHABET[(h & 0x1f) as usize]));
        h >>= 5;
    }
    result
}

/// Classify every node of `ast`.
///
/// Children always follow their parent in the arena, so one backwards sweep
/// propagates "has an interactive descendant" up to every ancestor.
pub fn classify(ast: &Ast) -> Vec<NodeClass> {
    let mut classes = vec![NodeClass::Static; ast.len()];
    for (id, node) in ast.iter() {
        if node.component().is_some_and(ComponentKind::is_interactive) {
            classes[id.index()] = NodeClass::Interactive;
        }
    }
    for index in (1..ast.len()).rev() {
        if classes[index] == NodeClass::Static {
            continue;
        }
        if let Some(parent) = ast.node(NodeId::new(index)).parent
            && classes[parent.index()] == NodeClass::Static
        {
            classes[parent.index()] = NodeClass::HostsIslands;
        }
    }
    classes
}

/// Find the island roots of `ast` and build its skeleton.
pub fn detect_islands(
    ast: &Ast,
    template_hash: &str,
    prefix: &str,
    deadline: &Deadline,
) -> Result<IslandPartition, IslandError> {
    let classes = classify(ast);
    let mut islands = Vec::new();
    let mut ordinal = 0u32;

    let mut index = 1;
    while index < ast.len() {
        deadline.tick(index)?;
        let id = NodeId::new(index);
        let node = ast.node(id);
        if classes[index] != NodeClass::Interactive {
            index += 1;
            continue;
        }
        let (component, props) = match node.element() {
            Some(element) => (element.component(), element.props.clone()),
            None => (None, Props::default()),
        };
        if let Some(component) = component {
            islands.push(Island {
                id: format!("{prefix}-{template_hash}-{ordinal}"),
                component,
                props,
                ordinal,
                root: id,
                end: node.end,
            });
            ordinal += 1;
        }
        // Nested interactive nodes belong to this island.
        index = node.end.index();
    }

    let mut builder = AstBuilder::new();
    let mut next = islands.iter();
    builder.copy_subtree(ast, NodeId::ROOT, |id, _| {
        match next.as_slice().first() {
            Some(island) if island.root == id => {
                next.next();
                Some(NodeKind::IslandSlot {
                    ordinal: island.ordinal,
                })
            }
            _ => None,
        }
    })?;

    tracing::debug!(islands = islands.len(), "detected islands");
    Ok(IslandPartition {
        skeleton: builder.finish(),
        islands,
        classes,
    })
}

/// Splice the island subtrees of `source` back into `skeleton`.
///
/// For a partition produced by [`detect_islands`] the result equals the
/// validated tree node for node.
pub fn reconstruct(skeleton: &Ast, islands: &[Island], source: &Ast) -> Result<Ast, IslandError> {
    let mut builder = AstBuilder::new();
    let mut ends: Vec<usize> = Vec::new();

    for (id, node) in skeleton.iter().skip(1) {
        while ends.last().is_some_and(|&end| id.index() >= end) {
            ends.pop();
            builder.close();
        }
        match &node.kind {
            NodeKind::Element(element) => {
                builder.open(element.clone())?;
                ends.push(node.end.index());
            }
            NodeKind::Text { value } => {
                builder.text(value.clone())?;
            }
            NodeKind::IslandSlot { ordinal } => {
                let island = islands
                    .iter()
                    .find(|island| island.ordinal == *ordinal)
                    .ok_or(IslandError::MissingIsland(*ordinal))?;
                builder.copy_subtree(source, island.root, |_, _| None)?;
            }
            NodeKind::Root => {}
        }
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::CompileOptions;
    use crate::parser::parse;
    use crate::registry::ComponentRegistry;
    use crate::validator::validate;

    fn validated(source: &str) -> Ast {
        let registry = ComponentRegistry::standard();
        let options = CompileOptions::new().without_time_budget();
        let mut ast = parse(source, &registry, &options).unwrap().ast;
        let result = validate(&mut ast, &registry, &options.limits, &Deadline::unbounded()).unwrap();
        assert!(result.is_valid, "{:?}", result.errors);
        ast
    }

    fn partition(ast: &Ast) -> IslandPartition {
        detect_islands(ast, "abcdefgh", "island", &Deadline::unbounded()).unwrap()
    }

    #[test]
    fn test_loop_inside_click_is_one_island() {
        let ast = validated(
            r#"<div><OnClick><ForEach var="items" item="it"><span>{it}</span></ForEach></OnClick></div>"#,
        );
        let out = partition(&ast);
        assert_eq!(out.islands.len(), 1);
        let island = &out.islands[0];
        assert_eq!(island.component, ComponentKind::OnClick);
        assert_eq!(island.id, "island-abcdefgh-0");
        assert_eq!(island.root, NodeId::new(2));
        assert_eq!(island.end, NodeId::new(6));
        assert_eq!(out.classes[1], NodeClass::HostsIslands);

        assert!(
            out.skeleton
                .iter()
                .all(|(_, node)| !node.component().is_some_and(ComponentKind::is_interactive))
        );
        assert!(matches!(
            out.skeleton.node(NodeId::new(2)).kind,
            NodeKind::IslandSlot { ordinal: 0 }
        ));
    }

    #[test]
    fn test_sibling_islands_do_not_overlap() {
        let ast = validated(
            r#"<FlexContainer><OnHover><p>a</p></OnHover><Bio/><Delay ms="200"><p>b</p></Delay></FlexContainer>"#,
        );
        let out = partition(&ast);
        assert_eq!(out.islands.len(), 2);
        let (a, b) = (&out.islands[0], &out.islands[1]);
        assert!(a.end <= b.root);
        assert_eq!(b.props.number("ms"), Some(200.0));
        assert_eq!(b.id, "island-abcdefgh-1");
    }

    #[test]
    fn test_static_template_has_no_islands() {
        let ast = validated("<CenteredBox><DisplayName/><Show when=\"owner.bio\"><Bio/></Show></CenteredBox>");
        let out = partition(&ast);
        assert!(out.islands.is_empty());
        assert_eq!(out.skeleton, ast);
        assert!(out.classes.iter().all(|class| *class == NodeClass::Static));
    }

    #[test]
    fn test_reconstruct_is_exact() {
        let ast = validated(
            r#"<div id="top"><OnClick><p>x</p></OnClick><p>mid</p><Sequence><Delay ms="10"><b>y</b></Delay></Sequence></div><p>end</p>"#,
        );
        let out = partition(&ast);
        assert_eq!(out.islands.len(), 2);
        let rebuilt = reconstruct(&out.skeleton, &out.islands, &ast).unwrap();
        assert_eq!(rebuilt, ast);
    }

    #[test]
    fn test_reconstruct_reports_missing_island() {
        let ast = validated("<OnMount><p>x</p></OnMount>");
        let out = partition(&ast);
        let err = reconstruct(&out.skeleton, &[], &ast).unwrap_err();
        assert_eq!(err, IslandError::MissingIsland(0));
    }

    #[test]
    fn test_template_hash_is_stable() {
        assert_eq!(template_hash("<p>a</p>"), template_hash("<p>a</p>"));
        assert_ne!(template_hash("<p>a</p>"), template_hash("<p>b</p>"));
        assert_eq!(template_hash("").len(), 8);
    }
}
