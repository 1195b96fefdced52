//! The built-in component catalog.

use super::{ComponentDefinition, ComponentKind, ComponentRegistry, PropSchema, Relationship};

const DIRECTIONS: &[&str] = &["row", "column", "row-reverse", "column-reverse"];
const ALIGNMENTS: &[&str] = &["start", "center", "end", "stretch", "baseline"];
const JUSTIFICATIONS: &[&str] = &["start", "center", "end", "between", "around", "evenly"];
const RATIOS: &[&str] = &["1:1", "1:2", "2:1", "1:3", "3:1"];
const SIZES: &[&str] = &["small", "medium", "large"];
const SHAPES: &[&str] = &["circle", "square", "rounded"];
const HEADINGS: &[&str] = &["h1", "h2", "h3", "p", "span"];

const MAX_MS: f64 = 60_000.0;

const FLEX_CONTAINER: &[PropSchema] = &[
    PropSchema::one_of("direction", DIRECTIONS).default_value("row"),
    PropSchema::one_of("align", ALIGNMENTS),
    PropSchema::one_of("justify", JUSTIFICATIONS),
    PropSchema::css("gap", "gap"),
    PropSchema::boolean("wrap").default_value("false"),
];

const GRID_LAYOUT: &[PropSchema] = &[
    PropSchema::integer("columns", 1.0, 12.0).default_value("2"),
    PropSchema::css("gap", "gap"),
    PropSchema::css("minColumnWidth", "min-width"),
];

const CENTERED_BOX: &[PropSchema] = &[
    PropSchema::css("maxWidth", "max-width"),
    PropSchema::css("padding", "padding"),
];

const SPLIT_LAYOUT: &[PropSchema] = &[
    PropSchema::one_of("ratio", RATIOS).default_value("1:1"),
    PropSchema::css("gap", "gap"),
];

const PROFILE_PHOTO: &[PropSchema] = &[
    PropSchema::one_of("size", SIZES).default_value("medium"),
    PropSchema::one_of("shape", SHAPES).default_value("circle"),
];

const DISPLAY_NAME: &[PropSchema] = &[PropSchema::one_of("as", HEADINGS).default_value("h1")];

const BIO: &[PropSchema] = &[PropSchema::integer("maxLength", 1.0, 5_000.0)];

const BLOG_POSTS: &[PropSchema] = &[
    PropSchema::integer("limit", 1.0, 50.0).default_value("5"),
    PropSchema::boolean("showDates").default_value("true"),
];

const GUESTBOOK: &[PropSchema] = &[PropSchema::integer("limit", 1.0, 50.0).default_value("10")];

const IMAGE_GALLERY: &[PropSchema] = &[
    PropSchema::integer("columns", 1.0, 6.0).default_value("3"),
    PropSchema::integer("limit", 1.0, 50.0).default_value("12"),
];

const PROFILE_IMAGE: &[PropSchema] = &[
    PropSchema::integer("index", 0.0, 49.0).default_value("0"),
    PropSchema::string("alt"),
];

const SHOW: &[PropSchema] = &[
    PropSchema::binding("when").required(),
    PropSchema::boolean("not").default_value("false"),
];

const ON_INTERVAL: &[PropSchema] = &[PropSchema::integer("ms", 100.0, MAX_MS).required()];
const ON_KEY_PRESS: &[PropSchema] = &[PropSchema::string("key").required()];
const ON_VISIBLE: &[PropSchema] = &[PropSchema::number("threshold", 0.0, 1.0).default_value("0.5")];

const FOR_EACH: &[PropSchema] = &[
    PropSchema::binding("var").required(),
    PropSchema::binding("item").required(),
    PropSchema::binding("index"),
    PropSchema::binding("when"),
];

const LOOP_GUARD: &[PropSchema] = &[PropSchema::binding("when")];

const VALIDATE: &[PropSchema] = &[
    PropSchema::pattern("pattern"),
    PropSchema::boolean("required").default_value("false"),
    PropSchema::number("min", -1e9, 1e9),
    PropSchema::number("max", -1e9, 1e9),
    PropSchema::integer("minLength", 0.0, 10_000.0),
    PropSchema::integer("maxLength", 0.0, 10_000.0),
    PropSchema::string("message"),
];

const DELAY: &[PropSchema] = &[PropSchema::integer("ms", 0.0, MAX_MS).required()];

const SEQUENCE: &[PropSchema] = &[
    PropSchema::integer("interval", 100.0, MAX_MS).default_value("1000"),
    PropSchema::boolean("repeat").default_value("false"),
];

const STEPPED_SEQUENCE: &[PropSchema] = &[
    PropSchema::integer("interval", 100.0, MAX_MS).default_value("1000"),
    PropSchema::integer("steps", 1.0, 20.0).required(),
];

const TIMEOUT: &[PropSchema] = &[PropSchema::integer("ms", 0.0, MAX_MS).required()];

/// Props schema and relationship for every built-in kind.
fn contract(kind: ComponentKind) -> (&'static [PropSchema], Relationship) {
    use ComponentKind as K;
    match kind {
        K::FlexContainer => (FLEX_CONTAINER, Relationship::container("Content")),
        K::GridLayout => (GRID_LAYOUT, Relationship::container("Grid cells")),
        K::CenteredBox => (CENTERED_BOX, Relationship::container("Content")),
        K::SplitLayout => (SPLIT_LAYOUT, Relationship::container("Panes")),
        K::ProfilePhoto => (PROFILE_PHOTO, Relationship::leaf()),
        K::DisplayName => (DISPLAY_NAME, Relationship::leaf()),
        K::Bio => (BIO, Relationship::leaf()),
        K::BlogPosts => (BLOG_POSTS, Relationship::leaf()),
        K::Guestbook => (GUESTBOOK, Relationship::leaf()),
        K::ImageGallery => (IMAGE_GALLERY, Relationship::leaf()),
        K::ProfileImage => (PROFILE_IMAGE, Relationship::leaf()),
        K::Show => (SHOW, Relationship::container("Shown when true")),
        K::OnClick
        | K::OnChange
        | K::OnMount
        | K::OnHover
        | K::OnMouseEnter
        | K::OnMouseLeave => (&[], Relationship::action("Triggered content")),
        K::OnInterval => (ON_INTERVAL, Relationship::action("Triggered content")),
        K::OnKeyPress => (ON_KEY_PRESS, Relationship::action("Triggered content")),
        K::OnVisible => (ON_VISIBLE, Relationship::action("Triggered content")),
        K::ForEach => (FOR_EACH, Relationship::container("Loop body")),
        K::Break | K::Continue => (LOOP_GUARD, Relationship::leaf()),
        K::Validate => (VALIDATE, Relationship::container("Form field")),
        K::Delay => (DELAY, Relationship::action("Delayed content")),
        K::Sequence => (SEQUENCE, Relationship::action("Steps")),
        K::SteppedSequence => (STEPPED_SEQUENCE, Relationship::action("Steps")),
        K::Timeout => (TIMEOUT, Relationship::action("Content until timeout")),
        K::OnTimeout => (&[], Relationship::action("Shown after timeout")),
    }
}

pub(super) fn standard_registry() -> ComponentRegistry {
    let mut builder = ComponentRegistry::builder();
    for kind in ComponentKind::ALL {
        let (props, relationship) = contract(kind);
        if let Err(error) = builder.register(ComponentDefinition::new(kind, props, relationship)) {
            tracing::error!(%error, "skipping built-in component");
        }
    }
    builder.build()
}
