//! Plain HTML allow-list.

/// Attributes allowed on every element, in addition to `data-*` hints.
pub const GLOBAL_ATTRIBUTES: &[&str] = &["style", "id", "href", "target", "rel"];

const NONE: &[&str] = &[];
const CELL: &[&str] = &["colspan", "rowspan"];

/// Allowed HTML tags and their per-tag attributes.
pub(super) const ALLOWED_TAGS: &[(&str, &[&str])] = &[
    ("div", NONE),
    ("span", NONE),
    ("p", NONE),
    ("h1", NONE),
    ("h2", NONE),
    ("h3", NONE),
    ("h4", NONE),
    ("h5", NONE),
    ("h6", NONE),
    ("ul", NONE),
    ("ol", &["start", "reversed"]),
    ("li", NONE),
    ("a", &["title"]),
    ("img", &["src", "alt", "width", "height", "loading"]),
    ("strong", NONE),
    ("em", NONE),
    ("b", NONE),
    ("i", NONE),
    ("u", NONE),
    ("s", NONE),
    ("small", NONE),
    ("mark", NONE),
    ("sub", NONE),
    ("sup", NONE),
    ("br", NONE),
    ("hr", NONE),
    ("blockquote", &["cite"]),
    ("code", NONE),
    ("pre", NONE),
    ("section", NONE),
    ("article", NONE),
    ("header", NONE),
    ("footer", NONE),
    ("nav", NONE),
    ("main", NONE),
    ("aside", NONE),
    ("figure", NONE),
    ("figcaption", NONE),
    ("details", &["open"]),
    ("summary", NONE),
    ("table", NONE),
    ("thead", NONE),
    ("tbody", NONE),
    ("tfoot", NONE),
    ("tr", NONE),
    ("th", CELL),
    ("td", CELL),
    ("button", &["type", "disabled", "name", "value"]),
    (
        "input",
        &[
            "type",
            "name",
            "value",
            "placeholder",
            "required",
            "disabled",
            "checked",
            "min",
            "max",
            "minlength",
            "maxlength",
            "pattern",
        ],
    ),
    (
        "textarea",
        &["name", "placeholder", "rows", "cols", "required", "maxlength"],
    ),
    ("select", &["name", "required", "multiple"]),
    ("option", &["value", "selected"]),
    ("label", &["for"]),
];

/// Elements that never have children or a closing tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Disallowed tags whose content is dropped with them rather than unwrapped.
const RAW_CONTENT_TAGS: &[&str] = &[
    "script", "style", "iframe", "object", "embed", "template", "noscript", "svg", "math", "frame",
    "frameset",
];

pub(super) fn lookup(name: &str) -> Option<(&'static str, &'static [&'static str])> {
    ALLOWED_TAGS
        .iter()
        .find(|(tag, _)| tag.eq_ignore_ascii_case(name))
        .copied()
}

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|tag| tag.eq_ignore_ascii_case(name))
}

pub(crate) fn is_raw_content_tag(name: &str) -> bool {
    RAW_CONTENT_TAGS.iter().any(|tag| tag.eq_ignore_ascii_case(name))
}

/// `data-*` hint attributes: lower-case alphanumerics and hyphens only.
pub(crate) fn is_data_hint(name: &str) -> bool {
    name.strip_prefix("data-").is_some_and(|rest| {
        !rest.is_empty()
            && rest
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    }) && !name.starts_with("data-island")
        && name != "data-component"
}

/// Attributes whose values are URLs.
pub(crate) fn is_url_attribute(name: &str) -> bool {
    matches!(name, "href" | "src" | "cite")
}

const SAFE_IMAGE_DATA: &[&str] = &[
    "data:image/png",
    "data:image/jpeg",
    "data:image/jpg",
    "data:image/gif",
    "data:image/webp",
    "data:image/avif",
];

/// Whether a URL value is safe to emit in `href`/`src`.
///
/// Relative URLs and `http`, `https`, `mailto` and `tel` schemes pass, as do
/// raster image `data:` URIs. Control characters and whitespace are ignored
/// when detecting the scheme, matching how browsers read it.
pub(crate) fn is_safe_url(value: &str) -> bool {
    let normalized: String = value
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_control())
        .flat_map(char::to_lowercase)
        .collect();

    let Some(colon) = normalized.find(':') else {
        return true;
    };
    let scheme = &normalized[..colon];
    if scheme.contains(['/', '?', '#']) {
        return true;
    }
    match scheme {
        "http" | "https" | "mailto" | "tel" => true,
        "data" => SAFE_IMAGE_DATA
            .iter()
            .any(|prefix| normalized.starts_with(prefix)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_urls() {
        assert!(is_safe_url("https://example.com/a"));
        assert!(is_safe_url("/posts/1"));
        assert!(is_safe_url("#top"));
        assert!(is_safe_url("mailto:me@example.com"));
        assert!(is_safe_url("data:image/png;base64,AAAA"));
    }

    #[test]
    fn test_unsafe_urls() {
        assert!(!is_safe_url("javascript:alert(1)"));
        assert!(!is_safe_url(" JaVaScRiPt:alert(1)"));
        assert!(!is_safe_url("java\tscript:alert(1)"));
        assert!(!is_safe_url("vbscript:msgbox"));
        assert!(!is_safe_url("data:text/html,<script>"));
        assert!(!is_safe_url("data:image/svg+xml,<svg>"));
    }

    #[test]
    fn test_data_hints() {
        assert!(is_data_hint("data-theme"));
        assert!(is_data_hint("data-col-2"));
        assert!(!is_data_hint("data-"));
        assert!(!is_data_hint("data-Theme"));
        assert!(!is_data_hint("data-island"));
        assert!(!is_data_hint("data-island-component"));
        assert!(!is_data_hint("data-component"));
    }

    #[test]
    fn test_void_and_raw_content() {
        assert!(is_void_element("br"));
        assert!(is_void_element("IMG"));
        assert!(!is_void_element("div"));
        assert!(is_raw_content_tag("script"));
        assert!(is_raw_content_tag("svg"));
        assert!(!is_raw_content_tag("span"));
    }
}
