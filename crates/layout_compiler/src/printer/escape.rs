//! HTML escaping.
//!
//! Tree values are stored decoded (the HTML parser resolves entities), so
//! every `&` is escaped on output. Both functions borrow when nothing needs
//! escaping.

use std::borrow::Cow;

use cow_utils::CowUtils;

/// Escape text content.
pub fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '<', '>']) {
        return Cow::Borrowed(s);
    }
    let s = s.cow_replace('&', "&amp;");
    let s = s.cow_replace('<', "&lt;");
    Cow::Owned(s.cow_replace('>', "&gt;").into_owned())
}

/// Escape a value for a double-quoted attribute.
pub fn escape_attribute(s: &str) -> Cow<'_, str> {
    if !s.contains(['&', '"', '<', '>']) {
        return Cow::Borrowed(s);
    }
    let s = s.cow_replace('&', "&amp;");
    let s = s.cow_replace('"', "&quot;");
    let s = s.cow_replace('<', "&lt;");
    Cow::Owned(s.cow_replace('>', "&gt;").into_owned())
}
