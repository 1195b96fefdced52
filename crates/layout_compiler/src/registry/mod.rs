//! Component registry.
//!
//! The registry is the immutable catalog of components a template may use.
//! It is built once at process start through [`RegistryBuilder`] and shared
//! read-only afterwards; every stage of the pipeline consults it:
//!
//! - the sanitizer asks which tags and attributes are allowed,
//! - the validator coerces props and checks containment,
//! - the island detector asks which components are interactive,
//! - the renderer reads coerced props.

mod catalog;
mod html;
mod schema;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Attributes;

pub use html::{GLOBAL_ATTRIBUTES, is_void_element};
pub(crate) use html::{is_data_hint, is_raw_content_tag, is_safe_url, is_url_attribute};
pub(crate) use schema::format_number;
pub use schema::{PropError, PropSchema, PropType, PropValue, Props, coerce_props};

/// Every component the dialect knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    // Layout
    FlexContainer,
    GridLayout,
    CenteredBox,
    SplitLayout,
    // Resident data
    ProfilePhoto,
    DisplayName,
    Bio,
    BlogPosts,
    Guestbook,
    ImageGallery,
    ProfileImage,
    // Conditional
    Show,
    // Events
    OnClick,
    OnChange,
    OnMount,
    OnInterval,
    OnHover,
    OnMouseEnter,
    OnMouseLeave,
    OnKeyPress,
    OnVisible,
    // Loop control
    ForEach,
    Break,
    Continue,
    // Validation
    Validate,
    // Temporal
    Delay,
    Sequence,
    SteppedSequence,
    Timeout,
    OnTimeout,
}

impl ComponentKind {
    pub const ALL: [Self; 30] = [
        Self::FlexContainer,
        Self::GridLayout,
        Self::CenteredBox,
        Self::SplitLayout,
        Self::ProfilePhoto,
        Self::DisplayName,
        Self::Bio,
        Self::BlogPosts,
        Self::Guestbook,
        Self::ImageGallery,
        Self::ProfileImage,
        Self::Show,
        Self::OnClick,
        Self::OnChange,
        Self::OnMount,
        Self::OnInterval,
        Self::OnHover,
        Self::OnMouseEnter,
        Self::OnMouseLeave,
        Self::OnKeyPress,
        Self::OnVisible,
        Self::ForEach,
        Self::Break,
        Self::Continue,
        Self::Validate,
        Self::Delay,
        Self::Sequence,
        Self::SteppedSequence,
        Self::Timeout,
        Self::OnTimeout,
    ];

    /// The canonical tag name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::FlexContainer => "FlexContainer",
            Self::GridLayout => "GridLayout",
            Self::CenteredBox => "CenteredBox",
            Self::SplitLayout => "SplitLayout",
            Self::ProfilePhoto => "ProfilePhoto",
            Self::DisplayName => "DisplayName",
            Self::Bio => "Bio",
            Self::BlogPosts => "BlogPosts",
            Self::Guestbook => "Guestbook",
            Self::ImageGallery => "ImageGallery",
            Self::ProfileImage => "ProfileImage",
            Self::Show => "Show",
            Self::OnClick => "OnClick",
            Self::OnChange => "OnChange",
            Self::OnMount => "OnMount",
            Self::OnInterval => "OnInterval",
            Self::OnHover => "OnHover",
            Self::OnMouseEnter => "OnMouseEnter",
            Self::OnMouseLeave => "OnMouseLeave",
            Self::OnKeyPress => "OnKeyPress",
            Self::OnVisible => "OnVisible",
            Self::ForEach => "ForEach",
            Self::Break => "Break",
            Self::Continue => "Continue",
            Self::Validate => "Validate",
            Self::Delay => "Delay",
            Self::Sequence => "Sequence",
            Self::SteppedSequence => "SteppedSequence",
            Self::Timeout => "Timeout",
            Self::OnTimeout => "OnTimeout",
        }
    }

    pub const fn category(self) -> Category {
        match self {
            Self::FlexContainer | Self::GridLayout | Self::CenteredBox | Self::SplitLayout => {
                Category::Layout
            }
            Self::ProfilePhoto
            | Self::DisplayName
            | Self::Bio
            | Self::BlogPosts
            | Self::Guestbook
            | Self::ImageGallery
            | Self::ProfileImage => Category::Data,
            Self::Show => Category::Conditional,
            Self::OnClick
            | Self::OnChange
            | Self::OnMount
            | Self::OnInterval
            | Self::OnHover
            | Self::OnMouseEnter
            | Self::OnMouseLeave
            | Self::OnKeyPress
            | Self::OnVisible => Category::Event,
            Self::ForEach | Self::Break | Self::Continue => Category::Loop,
            Self::Validate => Category::Validation,
            Self::Delay | Self::Sequence | Self::SteppedSequence | Self::Timeout | Self::OnTimeout => {
                Category::Temporal
            }
        }
    }

    /// Whether occurrences of this component need client-side hydration.
    pub const fn is_interactive(self) -> bool {
        self.category().is_interactive()
    }

    /// Look up a kind by its canonical name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Category {
    Layout,
    Data,
    Conditional,
    Event,
    Loop,
    Validation,
    Temporal,
}

impl Category {
    pub const fn is_interactive(self) -> bool {
        matches!(
            self,
            Self::Event | Self::Loop | Self::Validation | Self::Temporal
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Layout => "layout",
            Self::Data => "data",
            Self::Conditional => "conditional",
            Self::Event => "event",
            Self::Loop => "loop",
            Self::Validation => "validation",
            Self::Temporal => "temporal",
        }
    }
}

/// How a component relates to its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipKind {
    Container,
    Action,
    Leaf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub accepts_children: bool,
    /// Label shown by editors for the children slot (e.g. "Loop body").
    pub children_label: Option<&'static str>,
}

impl Relationship {
    pub const fn container(label: &'static str) -> Self {
        Self {
            kind: RelationshipKind::Container,
            accepts_children: true,
            children_label: Some(label),
        }
    }

    pub const fn action(label: &'static str) -> Self {
        Self {
            kind: RelationshipKind::Action,
            accepts_children: true,
            children_label: Some(label),
        }
    }

    pub const fn leaf() -> Self {
        Self {
            kind: RelationshipKind::Leaf,
            accepts_children: false,
            children_label: None,
        }
    }
}

/// The contract of one registered component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentDefinition {
    pub kind: ComponentKind,
    pub props: Vec<PropSchema>,
    pub relationship: Relationship,
}

impl ComponentDefinition {
    pub fn new(kind: ComponentKind, props: &[PropSchema], relationship: Relationship) -> Self {
        Self {
            kind,
            props: props.to_vec(),
            relationship,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Canonical prop name for an attribute name (case-insensitive).
    pub fn prop_name(&self, attribute: &str) -> Option<&'static str> {
        self.props
            .iter()
            .find(|prop| prop.name.eq_ignore_ascii_case(attribute))
            .map(|prop| prop.name)
    }

    /// Validate and default the element's attributes against the schema.
    pub fn coerce(&self, attributes: &Attributes) -> Result<Props, Vec<PropError>> {
        coerce_props(&self.props, attributes)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("component `{0}` is already registered")]
    Duplicate(&'static str),
    #[error("component `{0}` is a leaf but declares that it accepts children")]
    InconsistentRelationship(&'static str),
    #[error("component `{component}` declares prop `{prop}` twice")]
    DuplicateProp {
        component: &'static str,
        prop: &'static str,
    },
}

/// Collects component definitions before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    definitions: Vec<ComponentDefinition>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one component.
    pub fn register(&mut self, definition: ComponentDefinition) -> Result<&mut Self, RegistryError> {
        let name = definition.name();
        if self.definitions.iter().any(|d| d.kind == definition.kind) {
            return Err(RegistryError::Duplicate(name));
        }
        let relationship = definition.relationship;
        if relationship.kind == RelationshipKind::Leaf && relationship.accepts_children {
            return Err(RegistryError::InconsistentRelationship(name));
        }
        for (i, prop) in definition.props.iter().enumerate() {
            if definition.props[..i]
                .iter()
                .any(|other| other.name.eq_ignore_ascii_case(prop.name))
            {
                return Err(RegistryError::DuplicateProp {
                    component: name,
                    prop: prop.name,
                });
            }
        }
        self.definitions.push(definition);
        Ok(self)
    }

    /// Freeze the registry.
    pub fn build(self) -> ComponentRegistry {
        let mut by_name = FxHashMap::default();
        let mut definitions = FxHashMap::default();
        for definition in self.definitions {
            by_name.insert(definition.name().to_ascii_lowercase(), definition.kind);
            definitions.insert(definition.kind, definition);
        }
        ComponentRegistry {
            definitions,
            by_name,
        }
    }
}

/// What a tag name resolves to.
#[derive(Debug, Clone, Copy)]
pub enum TagPolicy<'r> {
    Component(&'r ComponentDefinition),
    /// An allowed HTML tag and its per-tag attributes.
    Html {
        name: &'static str,
        attributes: &'static [&'static str],
    },
}

/// The immutable catalog of allowed components.
#[derive(Debug)]
pub struct ComponentRegistry {
    definitions: FxHashMap<ComponentKind, ComponentDefinition>,
    /// Lower-cased name to kind.
    by_name: FxHashMap<String, ComponentKind>,
}

impl ComponentRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry with the full built-in catalog.
    pub fn standard() -> Self {
        catalog::standard_registry()
    }

    /// Look up a component by tag name (case-insensitive).
    pub fn lookup(&self, name: &str) -> Option<&ComponentDefinition> {
        let kind = self.by_name.get(&name.to_ascii_lowercase())?;
        self.definitions.get(kind)
    }

    pub fn definition(&self, kind: ComponentKind) -> Option<&ComponentDefinition> {
        self.definitions.get(&kind)
    }

    /// Resolve a tag name against the allow-list.
    pub fn resolve_tag(&self, name: &str) -> Option<TagPolicy<'_>> {
        if let Some(definition) = self.lookup(name) {
            return Some(TagPolicy::Component(definition));
        }
        html::lookup(name).map(|(name, attributes)| TagPolicy::Html { name, attributes })
    }

    /// All allowed tag names: canonical component names followed by HTML tags.
    pub fn allowed_tags(&self) -> Vec<&'static str> {
        let mut components: Vec<_> = self.definitions.keys().map(|kind| kind.name()).collect();
        components.sort_unstable();
        components.extend(html::ALLOWED_TAGS.iter().map(|(name, _)| *name));
        components
    }

    /// Attribute names allowed on `tag`, excluding the global allow-set.
    pub fn allowed_attributes(&self, tag: &str) -> Option<Vec<&'static str>> {
        match self.resolve_tag(tag)? {
            TagPolicy::Component(definition) => {
                Some(definition.props.iter().map(|prop| prop.name).collect())
            }
            TagPolicy::Html { attributes, .. } => Some(attributes.to_vec()),
        }
    }

    /// Coerce props for a component occurrence.
    pub fn coerce(&self, kind: ComponentKind, attributes: &Attributes) -> Result<Props, Vec<PropError>> {
        match self.definitions.get(&kind) {
            Some(definition) => definition.coerce(attributes),
            None => Err(vec![PropError {
                prop: String::new(),
                message: format!("component `{kind}` is not registered"),
            }]),
        }
    }

    /// Registered definitions in canonical name order.
    pub fn definitions(&self) -> Vec<&ComponentDefinition> {
        let mut definitions: Vec<_> = self.definitions.values().collect();
        definitions.sort_unstable_by_key(|definition| definition.kind);
        definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_kind() {
        let registry = ComponentRegistry::standard();
        assert_eq!(registry.len(), ComponentKind::ALL.len());
        for kind in ComponentKind::ALL {
            assert!(registry.definition(kind).is_some(), "missing {kind}");
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = ComponentRegistry::standard();
        assert_eq!(
            registry.lookup("onclick").map(ComponentDefinition::name),
            Some("OnClick")
        );
        assert_eq!(
            registry.lookup("FOREACH").map(ComponentDefinition::name),
            Some("ForEach")
        );
        assert!(registry.lookup("Marquee").is_none());
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut builder = ComponentRegistry::builder();
        builder
            .register(ComponentDefinition::new(
                ComponentKind::Bio,
                &[],
                Relationship::leaf(),
            ))
            .unwrap();
        let err = builder
            .register(ComponentDefinition::new(
                ComponentKind::Bio,
                &[],
                Relationship::leaf(),
            ))
            .unwrap_err();
        assert_eq!(err, RegistryError::Duplicate("Bio"));
    }

    #[test]
    fn test_register_rejects_leaf_with_children() {
        let relationship = Relationship {
            kind: RelationshipKind::Leaf,
            accepts_children: true,
            children_label: None,
        };
        let err = ComponentRegistry::builder()
            .register(ComponentDefinition::new(
                ComponentKind::Break,
                &[],
                relationship,
            ))
            .unwrap_err();
        assert_eq!(err, RegistryError::InconsistentRelationship("Break"));
    }

    #[test]
    fn test_loop_contracts() {
        let registry = ComponentRegistry::standard();
        let for_each = registry.definition(ComponentKind::ForEach).unwrap();
        assert!(for_each.relationship.accepts_children);
        assert!(
            for_each
                .props
                .iter()
                .filter(|p| p.required)
                .map(|p| p.name)
                .eq(["var", "item"])
        );
        let cont = registry.definition(ComponentKind::Continue).unwrap();
        assert_eq!(cont.relationship.kind, RelationshipKind::Leaf);
        assert!(!cont.relationship.accepts_children);
    }

    #[test]
    fn test_interactive_categories() {
        assert!(ComponentKind::OnClick.is_interactive());
        assert!(ComponentKind::ForEach.is_interactive());
        assert!(ComponentKind::Validate.is_interactive());
        assert!(ComponentKind::Delay.is_interactive());
        assert!(!ComponentKind::FlexContainer.is_interactive());
        assert!(!ComponentKind::Show.is_interactive());
        assert!(!ComponentKind::BlogPosts.is_interactive());
    }

    #[test]
    fn test_allowed_tags_include_components_and_html() {
        let registry = ComponentRegistry::standard();
        let tags = registry.allowed_tags();
        assert!(tags.contains(&"OnClick"));
        assert!(tags.contains(&"div"));
        assert!(!tags.contains(&"script"));
        assert_eq!(
            registry.allowed_attributes("a"),
            Some(vec!["title"])
        );
        assert!(
            registry
                .allowed_attributes("OnInterval")
                .unwrap()
                .contains(&"ms")
        );
    }
}
