//! Structural markup of components.
//!
//! Every component renders as one wrapper element. The static printer and
//! the renderer both go through [`shell`], so a component looks the same
//! whether it was printed at compile time or rendered against data. Shell
//! attribute values and content may contain `{binding}` placeholders; the
//! printer keeps them literally and the renderer resolves them.

use crate::ast::Element;
use crate::registry::{Category, ComponentKind, PropValue, Props, format_number};

/// What a component's own data content is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShellContent {
    /// Children of the element in the template.
    Children,
    /// A single text value, possibly a binding.
    Text(&'static str),
    /// Generated from a resident data collection at render time.
    Collection(ComponentKind),
}

#[derive(Debug, Clone)]
pub(crate) struct Shell {
    pub tag: &'static str,
    pub attributes: Vec<(String, String)>,
    pub void: bool,
    pub content: ShellContent,
}

impl Shell {
    fn new(tag: &'static str, class: &str) -> Self {
        Self {
            tag,
            attributes: vec![("class".to_string(), class.to_string())],
            void: false,
            content: ShellContent::Children,
        }
    }

    fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }

    fn style(self, declarations: &[(&str, Option<String>)]) -> Self {
        let style = declarations
            .iter()
            .filter_map(|(property, value)| value.as_ref().map(|v| format!("{property}: {v}")))
            .collect::<Vec<_>>()
            .join("; ");
        if style.is_empty() { self } else { self.attr("style", style) }
    }

    fn void(mut self) -> Self {
        self.void = true;
        self
    }

    fn content(mut self, content: ShellContent) -> Self {
        self.content = content;
        self
    }

    /// Merge the author's global attributes (`id`, `style`, data hints) into
    /// the shell. Author styles come after the component's own.
    fn with_author_attributes(mut self, element: &Element) -> Self {
        for attribute in &element.attributes {
            let is_prop = element
                .props
                .iter()
                .any(|(name, _)| name == attribute.name);
            let kept = matches!(attribute.name.as_str(), "id" | "style")
                || attribute.name.starts_with("data-");
            if is_prop || !kept {
                continue;
            }
            match self.attributes.iter_mut().find(|(name, _)| *name == attribute.name) {
                Some((_, value)) if attribute.name == "style" => {
                    value.push_str("; ");
                    value.push_str(&attribute.value);
                }
                Some((_, value)) => value.clone_from(&attribute.value),
                None => self
                    .attributes
                    .push((attribute.name.clone(), attribute.value.clone())),
            }
        }
        self
    }
}

fn prop_string(props: &Props, name: &str) -> Option<String> {
    props.get(name).map(PropValue::to_attribute_value)
}

/// Kebab-case name of a component, e.g. `on-mouse-enter`.
pub(crate) fn kebab_name(kind: ComponentKind) -> String {
    let mut out = String::new();
    for (i, c) in kind.name().char_indices() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn flex_value(keyword: &str) -> String {
    match keyword {
        "start" => "flex-start".to_string(),
        "end" => "flex-end".to_string(),
        "between" | "around" | "evenly" => format!("space-{keyword}"),
        other => other.to_string(),
    }
}

/// The wrapper element of a component occurrence.
///
/// `ForEach`, `Break` and `Continue` have no markup of their own and return
/// `None`, as does `Show`, which only decides whether its children render.
pub(crate) fn shell(kind: ComponentKind, element: &Element) -> Option<Shell> {
    let props = &element.props;
    let shell = match kind {
        ComponentKind::FlexContainer => Shell::new("div", "layout-flex").style(&[
            ("display", Some("flex".to_string())),
            ("flex-direction", prop_string(props, "direction")),
            ("align-items", props.str("align").map(flex_value)),
            ("justify-content", props.str("justify").map(flex_value)),
            ("gap", prop_string(props, "gap")),
            (
                "flex-wrap",
                props.bool("wrap").filter(|wrap| *wrap).map(|_| "wrap".to_string()),
            ),
        ]),
        ComponentKind::GridLayout => {
            let columns = props.number("columns").map_or_else(|| "2".to_string(), format_number);
            let min = props.str("minColumnWidth").unwrap_or("0");
            Shell::new("div", "layout-grid").style(&[
                ("display", Some("grid".to_string())),
                (
                    "grid-template-columns",
                    Some(format!("repeat({columns}, minmax({min}, 1fr))")),
                ),
                ("gap", prop_string(props, "gap")),
            ])
        }
        ComponentKind::CenteredBox => Shell::new("div", "layout-centered").style(&[
            ("margin-left", Some("auto".to_string())),
            ("margin-right", Some("auto".to_string())),
            ("max-width", prop_string(props, "maxWidth")),
            ("padding", prop_string(props, "padding")),
        ]),
        ComponentKind::SplitLayout => {
            let ratio = props.str("ratio").unwrap_or("1:1");
            let (left, right) = ratio.split_once(':').unwrap_or(("1", "1"));
            Shell::new("div", "layout-split").style(&[
                ("display", Some("grid".to_string())),
                ("grid-template-columns", Some(format!("{left}fr {right}fr"))),
                ("gap", prop_string(props, "gap")),
            ])
        }
        ComponentKind::ProfilePhoto => {
            let size = props.str("size").unwrap_or("medium");
            let shape = props.str("shape").unwrap_or("circle");
            Shell::new("img", &format!("profile-photo profile-photo-{size} profile-photo-{shape}"))
                .attr("src", "{owner.avatarUrl}")
                .attr("alt", "{owner.displayName}")
                .void()
        }
        ComponentKind::DisplayName => {
            let tag = match props.str("as") {
                Some("h2") => "h2",
                Some("h3") => "h3",
                Some("p") => "p",
                Some("span") => "span",
                _ => "h1",
            };
            Shell::new(tag, "display-name").content(ShellContent::Text("{owner.displayName}"))
        }
        ComponentKind::Bio => {
            Shell::new("p", "bio").content(ShellContent::Text("{capabilities.bio}"))
        }
        ComponentKind::BlogPosts => Shell::new("section", "blog-posts")
            .content(ShellContent::Collection(kind)),
        ComponentKind::Guestbook => Shell::new("section", "guestbook")
            .content(ShellContent::Collection(kind)),
        ComponentKind::ImageGallery => {
            let columns = props.number("columns").map_or_else(|| "3".to_string(), format_number);
            Shell::new("div", "image-gallery")
                .style(&[
                    ("display", Some("grid".to_string())),
                    ("grid-template-columns", Some(format!("repeat({columns}, 1fr)"))),
                ])
                .content(ShellContent::Collection(kind))
        }
        ComponentKind::ProfileImage => {
            let index = props.number("index").map_or_else(|| "0".to_string(), format_number);
            let alt = props.str("alt").unwrap_or_default().to_string();
            Shell::new("img", "profile-image")
                .attr("src", format!("{{profileImages.{index}.url}}"))
                .attr("alt", alt)
                .void()
        }
        ComponentKind::Show
        | ComponentKind::ForEach
        | ComponentKind::Break
        | ComponentKind::Continue => return None,
        _ => behavior_shell(kind, props),
    };
    Some(shell.with_author_attributes(element))
}

/// Interactive components render their content inside an element that
/// carries the behavior and its props for the hydration runtime.
fn behavior_shell(kind: ComponentKind, props: &Props) -> Shell {
    let class = match kind.category() {
        Category::Event => "event",
        Category::Validation => "validation",
        _ => "temporal",
    };
    let mut shell = Shell::new("div", class).attr("data-behavior", kebab_name(kind));
    for (name, value) in props.iter() {
        let name = kebab_name_str(name);
        shell = shell.attr(&format!("data-{name}"), value.to_attribute_value());
    }
    if matches!(kind, ComponentKind::Delay | ComponentKind::OnTimeout) {
        shell = shell.attr("hidden", "");
    }
    shell
}

fn kebab_name_str(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('-');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Attribute, Attributes, TagName};
    use crate::registry::ComponentRegistry;

    fn element(kind: ComponentKind, attrs: &[(&str, &str)]) -> Element {
        let attributes: Attributes = attrs
            .iter()
            .map(|(name, value)| Attribute::new(*name, *value))
            .collect();
        let mut element = Element::new(TagName::Component(kind), attributes);
        element.props = ComponentRegistry::standard()
            .coerce(kind, &element.attributes)
            .unwrap();
        element
    }

    #[test]
    fn test_kebab_name() {
        assert_eq!(kebab_name(ComponentKind::OnMouseEnter), "on-mouse-enter");
        assert_eq!(kebab_name(ComponentKind::Bio), "bio");
        assert_eq!(kebab_name_str("minLength"), "min-length");
    }

    #[test]
    fn test_flex_shell_merges_author_style() {
        let el = element(
            ComponentKind::FlexContainer,
            &[("justify", "between"), ("style", "color: red"), ("id", "main")],
        );
        let shell = shell(ComponentKind::FlexContainer, &el).unwrap();
        assert_eq!(shell.tag, "div");
        assert_eq!(
            shell.attributes,
            vec![
                ("class".to_string(), "layout-flex".to_string()),
                (
                    "style".to_string(),
                    "display: flex; flex-direction: row; justify-content: space-between; color: red"
                        .to_string()
                ),
                ("id".to_string(), "main".to_string()),
            ]
        );
    }

    #[test]
    fn test_behavior_shell_carries_props() {
        let el = element(ComponentKind::OnInterval, &[("ms", "1000")]);
        let shell = shell(ComponentKind::OnInterval, &el).unwrap();
        assert!(shell.attributes.contains(&("data-behavior".to_string(), "on-interval".to_string())));
        assert!(shell.attributes.contains(&("data-ms".to_string(), "1000".to_string())));
    }

    #[test]
    fn test_control_components_have_no_shell() {
        let el = element(ComponentKind::Show, &[("when", "owner.bio")]);
        assert!(shell(ComponentKind::Show, &el).is_none());
    }
}
