//! Property allow-list, denylist and value grammars.

use std::borrow::Cow;

use regex::Regex;

/// Substrings that make a value dangerous regardless of property.
const DENYLIST: &[&str] = &[
    "javascript:",
    "vbscript:",
    "expression(",
    "@import",
    "<script",
    "</script",
    "behavior:",
    "-moz-binding",
];

/// `data:` URIs allowed inside CSS values.
const SAFE_DATA_PREFIXES: &[&str] = &[
    "data:image/png",
    "data:image/jpeg",
    "data:image/jpg",
    "data:image/gif",
    "data:image/webp",
];

pub const NAMED_COLORS: &[&str] = &[
    "black",
    "white",
    "red",
    "green",
    "blue",
    "yellow",
    "orange",
    "purple",
    "pink",
    "gray",
    "grey",
    "brown",
    "cyan",
    "magenta",
    "lime",
    "navy",
    "teal",
    "olive",
    "maroon",
    "silver",
    "gold",
    "indigo",
    "violet",
    "coral",
    "salmon",
    "crimson",
    "turquoise",
    "beige",
    "ivory",
    "lavender",
    "khaki",
    "tan",
    "transparent",
    "currentcolor",
];

const GLOBAL_KEYWORDS: &[&str] = &["inherit", "initial", "unset"];

/// How a property's value is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Color,
    /// One length, or one of the extra keywords.
    Length(&'static [&'static str]),
    /// One to four lengths (`padding`, `margin`).
    LengthList,
    /// A number within `[0, 1]`.
    Opacity,
    LineHeight,
    FontWeight,
    FontFamily,
    Keyword(&'static [&'static str]),
    Border,
    BoxShadow,
    GridTemplate,
}

impl ValueKind {
    pub const fn is_color(self) -> bool {
        matches!(self, Self::Color)
    }

    /// Kinds where a bare number means pixels.
    pub const fn takes_px(self) -> bool {
        matches!(self, Self::Length(_) | Self::LengthList)
    }

    pub const fn hint(self) -> &'static str {
        match self {
            Self::Color => "expected a color such as #aabbcc, rgb(0, 0, 0) or a color name",
            Self::Length(_) => "expected a length such as 16px, 1.5rem or 50%",
            Self::LengthList => "expected one to four lengths such as 8px 16px",
            Self::Opacity => "expected a number between 0 and 1",
            Self::LineHeight => "expected a number, a length or normal",
            Self::FontWeight => "expected normal, bold or a weight from 100 to 900",
            Self::FontFamily => "expected a comma-separated list of font names",
            Self::Keyword(_) => "expected one of the supported keywords",
            Self::Border => "expected a border such as 1px solid #000000",
            Self::BoxShadow => "expected a shadow such as 0 2px 4px #00000033",
            Self::GridTemplate => "expected track sizes such as 1fr 2fr or repeat(3, 1fr)",
        }
    }
}

const SIZE: &[&str] = &["auto"];
const MAX_SIZE: &[&str] = &["none"];
const SPACING: &[&str] = &["normal"];
const NONE: &[&str] = &[];

const TEXT_ALIGN: &[&str] = &["left", "right", "center", "justify", "start", "end"];
const TEXT_DECORATION: &[&str] = &["none", "underline", "overline", "line-through"];
const TEXT_TRANSFORM: &[&str] = &["none", "uppercase", "lowercase", "capitalize"];
const FONT_STYLE: &[&str] = &["normal", "italic", "oblique"];
const DISPLAY: &[&str] = &[
    "block",
    "inline",
    "inline-block",
    "flex",
    "inline-flex",
    "grid",
    "inline-grid",
    "none",
];
const FLEX_DIRECTION: &[&str] = &["row", "row-reverse", "column", "column-reverse"];
const FLEX_WRAP: &[&str] = &["nowrap", "wrap", "wrap-reverse"];
const JUSTIFY: &[&str] = &[
    "flex-start",
    "flex-end",
    "start",
    "end",
    "center",
    "space-between",
    "space-around",
    "space-evenly",
];
const ALIGN: &[&str] = &[
    "flex-start",
    "flex-end",
    "start",
    "end",
    "center",
    "stretch",
    "baseline",
];
const BORDER_STYLE: &[&str] = &[
    "none", "solid", "dashed", "dotted", "double", "groove", "ridge", "inset", "outset",
];
const OVERFLOW: &[&str] = &["visible", "hidden", "scroll", "auto", "clip"];
const CURSOR: &[&str] = &["auto", "default", "pointer", "text", "move", "not-allowed", "grab"];
const WHITE_SPACE: &[&str] = &["normal", "nowrap", "pre", "pre-wrap", "pre-line"];
const OBJECT_FIT: &[&str] = &["fill", "contain", "cover", "none", "scale-down"];
const VISIBILITY: &[&str] = &["visible", "hidden"];

/// The property allow-list.
pub const PROPERTIES: &[(&str, ValueKind)] = &[
    ("color", ValueKind::Color),
    ("background-color", ValueKind::Color),
    ("background", ValueKind::Color),
    ("border-color", ValueKind::Color),
    ("font-size", ValueKind::Length(NONE)),
    ("font-weight", ValueKind::FontWeight),
    ("font-family", ValueKind::FontFamily),
    ("font-style", ValueKind::Keyword(FONT_STYLE)),
    ("line-height", ValueKind::LineHeight),
    ("letter-spacing", ValueKind::Length(SPACING)),
    ("text-align", ValueKind::Keyword(TEXT_ALIGN)),
    ("text-decoration", ValueKind::Keyword(TEXT_DECORATION)),
    ("text-transform", ValueKind::Keyword(TEXT_TRANSFORM)),
    ("padding", ValueKind::LengthList),
    ("padding-top", ValueKind::Length(NONE)),
    ("padding-right", ValueKind::Length(NONE)),
    ("padding-bottom", ValueKind::Length(NONE)),
    ("padding-left", ValueKind::Length(NONE)),
    ("margin", ValueKind::LengthList),
    ("margin-top", ValueKind::Length(SIZE)),
    ("margin-right", ValueKind::Length(SIZE)),
    ("margin-bottom", ValueKind::Length(SIZE)),
    ("margin-left", ValueKind::Length(SIZE)),
    ("width", ValueKind::Length(SIZE)),
    ("height", ValueKind::Length(SIZE)),
    ("min-width", ValueKind::Length(SIZE)),
    ("min-height", ValueKind::Length(SIZE)),
    ("max-width", ValueKind::Length(MAX_SIZE)),
    ("max-height", ValueKind::Length(MAX_SIZE)),
    ("border", ValueKind::Border),
    ("border-width", ValueKind::Length(NONE)),
    ("border-style", ValueKind::Keyword(BORDER_STYLE)),
    ("border-radius", ValueKind::LengthList),
    ("display", ValueKind::Keyword(DISPLAY)),
    ("flex-direction", ValueKind::Keyword(FLEX_DIRECTION)),
    ("flex-wrap", ValueKind::Keyword(FLEX_WRAP)),
    ("justify-content", ValueKind::Keyword(JUSTIFY)),
    ("align-items", ValueKind::Keyword(ALIGN)),
    ("gap", ValueKind::LengthList),
    ("opacity", ValueKind::Opacity),
    ("box-shadow", ValueKind::BoxShadow),
    ("overflow", ValueKind::Keyword(OVERFLOW)),
    ("cursor", ValueKind::Keyword(CURSOR)),
    ("white-space", ValueKind::Keyword(WHITE_SPACE)),
    ("object-fit", ValueKind::Keyword(OBJECT_FIT)),
    ("visibility", ValueKind::Keyword(VISIBILITY)),
    ("grid-template-columns", ValueKind::GridTemplate),
];

pub fn property_kind(name: &str) -> Option<ValueKind> {
    PROPERTIES
        .iter()
        .find(|(property, _)| *property == name)
        .map(|(_, kind)| *kind)
}

/// Normalize a property name: trim, lower-case, and convert camelCase
/// (`fontSize`) to kebab-case.
pub fn normalize_property_name(name: &str) -> Cow<'_, str> {
    let trimmed = name.trim();
    if trimmed
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b == b'-' || b.is_ascii_digit())
    {
        return Cow::Borrowed(trimmed);
    }
    let mut out = String::with_capacity(trimmed.len() + 4);
    for (i, c) in trimmed.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Decode CSS escapes (`\6a` and `\j` both read as `j`) and drop comments,
/// so the denylist sees what the browser would.
pub fn decode_css(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let mut hex = String::new();
                while hex.len() < 6 {
                    match chars.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(*h);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                if hex.is_empty() {
                    match chars.next() {
                        Some('\n') | None => {}
                        Some(other) => out.push(other),
                    }
                } else {
                    let decoded = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .unwrap_or('\u{FFFD}');
                    out.push(decoded);
                    if chars.peek().is_some_and(|c| c.is_whitespace()) {
                        chars.next();
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// The denylist entry matched by `value`, if any. `value` must already be
/// decoded.
pub fn dangerous_pattern(value: &str) -> Option<&'static str> {
    let lowered = value.to_ascii_lowercase();
    let compact: String = lowered.chars().filter(|c| !c.is_whitespace()).collect();
    for haystack in [&lowered, &compact] {
        if let Some(pattern) = DENYLIST.iter().find(|pattern| haystack.contains(*pattern)) {
            return Some(pattern);
        }
        let mut rest = haystack.as_str();
        while let Some(at) = rest.find("data:") {
            let uri = &rest[at..];
            if uri.starts_with("data:image/svg+xml")
                || !SAFE_DATA_PREFIXES.iter().any(|safe| uri.starts_with(safe))
            {
                return Some("data:");
            }
            rest = &rest[at + 5..];
        }
    }
    None
}

/// Compiled value grammars.
pub struct Grammars {
    hex: Regex,
    color_function: Regex,
    length: Regex,
    number: Regex,
    font_family: Regex,
    track: Regex,
    repeat: Regex,
}

impl Grammars {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            hex: Regex::new(r"(?i)^#([0-9a-f]{3}|[0-9a-f]{4}|[0-9a-f]{6}|[0-9a-f]{8})$")?,
            color_function: Regex::new(
                r"(?i)^(rgb|rgba|hsl|hsla)\(\s*-?[\d.]+(%|deg)?(\s*[,/ ]\s*-?[\d.]+%?){2,3}\s*\)$",
            )?,
            length: Regex::new(r"^(-?(\d+(\.\d+)?|\.\d+)(px|em|rem|%|vh|vw|vmin|vmax|ch|ex|pt)|0)$")?,
            number: Regex::new(r"^(\d+(\.\d+)?|\.\d+)$")?,
            font_family: Regex::new(r#"^[A-Za-z0-9 ,'"-]+$"#)?,
            track: Regex::new(r"^((\d+(\.\d+)?|\.\d+)(fr|px|em|rem|%)|auto|min-content|max-content)$")?,
            repeat: Regex::new(
                r"^repeat\(\s*\d{1,2}\s*,\s*((\d+(\.\d+)?|\.\d+)(fr|px|em|rem|%)|auto)\s*\)$",
            )?,
        })
    }

    pub fn is_number(&self, value: &str) -> bool {
        self.number.is_match(value)
    }

    pub fn is_color(&self, value: &str) -> bool {
        self.hex.is_match(value)
            || self.color_function.is_match(value)
            || NAMED_COLORS.contains(&value)
    }

    pub fn is_length(&self, value: &str) -> bool {
        self.length.is_match(value)
    }

    /// Check a corrected value against the grammar of `kind`.
    pub fn matches(&self, kind: ValueKind, value: &str) -> bool {
        if GLOBAL_KEYWORDS.contains(&value) {
            return true;
        }
        let tokens = || split_top_level(value).into_iter();
        match kind {
            ValueKind::Color => self.is_color(value),
            ValueKind::Length(keywords) => keywords.contains(&value) || self.is_length(value),
            ValueKind::LengthList => {
                let count = tokens().count();
                (1..=4).contains(&count) && tokens().all(|t| t == "auto" || self.is_length(t))
            }
            ValueKind::Opacity => value
                .parse::<f64>()
                .is_ok_and(|n| self.is_number(value) && (0.0..=1.0).contains(&n)),
            ValueKind::LineHeight => {
                value == "normal" || self.is_number(value) || self.is_length(value)
            }
            ValueKind::FontWeight => {
                matches!(value, "normal" | "bold" | "bolder" | "lighter")
                    || value
                        .parse::<u16>()
                        .is_ok_and(|w| (100..=900).contains(&w) && w % 100 == 0)
            }
            ValueKind::FontFamily => self.font_family.is_match(value),
            ValueKind::Keyword(keywords) => keywords.contains(&value),
            ValueKind::Border => {
                let count = tokens().count();
                value == "none"
                    || ((1..=3).contains(&count)
                        && tokens().all(|t| {
                            self.is_length(t) || BORDER_STYLE.contains(&t) || self.is_color(t)
                        }))
            }
            ValueKind::BoxShadow => {
                if value == "none" {
                    return true;
                }
                let mut lengths = 0;
                let mut colors = 0;
                for token in tokens() {
                    if self.is_length(token) {
                        lengths += 1;
                    } else if self.is_color(token) {
                        colors += 1;
                    } else if token != "inset" {
                        return false;
                    }
                }
                (2..=4).contains(&lengths) && colors <= 1
            }
            ValueKind::GridTemplate => {
                self.repeat.is_match(value) || tokens().all(|t| self.track.is_match(t))
            }
        }
    }
}

/// Split on spaces outside parentheses, so `rgb(0, 0, 0)` stays one token.
pub fn split_top_level(value: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in value.bytes().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b' ' if depth == 0 => {
                if start < i {
                    tokens.push(&value[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < value.len() {
        tokens.push(&value[start..]);
    }
    tokens
}

/// Collapse whitespace runs to one space and trim.
pub fn collapse_whitespace(value: &str) -> Cow<'_, str> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed == value {
        Cow::Borrowed(value)
    } else {
        Cow::Owned(collapsed)
    }
}

/// Expand `#abc` to `#aabbcc` in every token.
pub fn expand_short_hex(value: &str) -> Cow<'_, str> {
    let mut changed = false;
    let tokens: Vec<Cow<'_, str>> = split_top_level(value)
        .into_iter()
        .map(|token| match token.strip_prefix('#') {
            Some(hex) if hex.len() == 3 && hex.bytes().all(|b| b.is_ascii_hexdigit()) => {
                changed = true;
                let mut expanded = String::with_capacity(7);
                expanded.push('#');
                for c in hex.chars() {
                    expanded.push(c);
                    expanded.push(c);
                }
                Cow::Owned(expanded)
            }
            _ => Cow::Borrowed(token),
        })
        .collect();
    if changed {
        Cow::Owned(tokens.join(" "))
    } else {
        Cow::Borrowed(value)
    }
}

/// Lower-case named colors written with capitals (`Red` becomes `red`).
pub fn lowercase_named_colors(value: &str) -> Cow<'_, str> {
    let mut changed = false;
    let tokens: Vec<Cow<'_, str>> = split_top_level(value)
        .into_iter()
        .map(|token| {
            let lower = token.to_ascii_lowercase();
            if lower != token && NAMED_COLORS.contains(&lower.as_str()) {
                changed = true;
                Cow::Owned(lower)
            } else {
                Cow::Borrowed(token)
            }
        })
        .collect();
    if changed {
        Cow::Owned(tokens.join(" "))
    } else {
        Cow::Borrowed(value)
    }
}

/// Append `px` to bare non-zero numbers (`16` becomes `16px`).
pub fn append_px<'a>(grammars: &Grammars, value: &'a str) -> Cow<'a, str> {
    let mut changed = false;
    let tokens: Vec<Cow<'_, str>> = split_top_level(value)
        .into_iter()
        .map(|token| {
            if token != "0" && grammars.is_number(token) {
                changed = true;
                Cow::Owned(format!("{token}px"))
            } else {
                Cow::Borrowed(token)
            }
        })
        .collect();
    if changed {
        Cow::Owned(tokens.join(" "))
    } else {
        Cow::Borrowed(value)
    }
}
