//! Unified diagnostic types for the layout compiler.
//!
//! These types are the source of truth for everything the compiler reports
//! back to template authors. Stage failures, sanitizer removals, CSS
//! rejections and render-time binding misses are all mapped into this shape
//! before reaching the caller, so nothing is ever thrown across the API.

use serde::{Deserialize, Serialize};

/// Severity level for a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
    Information,
    Hint,
}

/// Machine-readable classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DiagnosticCode {
    SizeLimitExceeded,
    MalformedMarkup,
    SanitizationStripped,
    UnknownComponent,
    ValidationLimitExceeded,
    InvalidProp,
    ContainmentViolation,
    UnknownBinding,
    CompileBudgetExceeded,
    CssPropertyDangerous,
    CssPropertyInvalid,
    CssCorrected,
    RenderBindingUnresolved,
    RenderBudgetExceeded,
    IslandNotFound,
    /// A stored template or resident data document could not be read.
    InvalidRenderInput,
}

impl DiagnosticCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SizeLimitExceeded => "SizeLimitExceeded",
            Self::MalformedMarkup => "MalformedMarkup",
            Self::SanitizationStripped => "SanitizationStripped",
            Self::UnknownComponent => "UnknownComponent",
            Self::ValidationLimitExceeded => "ValidationLimitExceeded",
            Self::InvalidProp => "InvalidProp",
            Self::ContainmentViolation => "ContainmentViolation",
            Self::UnknownBinding => "UnknownBinding",
            Self::CompileBudgetExceeded => "CompileBudgetExceeded",
            Self::CssPropertyDangerous => "CSSPropertyDangerous",
            Self::CssPropertyInvalid => "CSSPropertyInvalid",
            Self::CssCorrected => "CSSCorrected",
            Self::RenderBindingUnresolved => "RenderBindingUnresolved",
            Self::RenderBudgetExceeded => "RenderBudgetExceeded",
            Self::IslandNotFound => "IslandNotFound",
            Self::InvalidRenderInput => "InvalidRenderInput",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labeled source span within a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticLabel {
    /// Optional label text (e.g. "expected closing tag here").
    pub text: Option<String>,
    /// Byte offset of the span start.
    pub start: u32,
    /// Byte offset of the span end (exclusive).
    pub end: u32,
    /// 1-based line number.
    pub line: u32,
    /// 0-based column number.
    pub column: u32,
}

impl DiagnosticLabel {
    /// Create a label from byte offsets, computing line/column from source text.
    #[expect(clippy::cast_possible_truncation)]
    pub fn new(text: Option<String>, start: usize, end: usize, source_text: &str) -> Self {
        let (line, column) = byte_offset_to_line_column(source_text, start);
        Self {
            text,
            start: start as u32,
            end: end as u32,
            line,
            column,
        }
    }
}

/// A single diagnostic message produced by the compiler, the CSS validator
/// or the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub code: DiagnosticCode,
    /// Human-readable message text.
    pub text: String,
    /// Optional hint/suggestion for fixing the issue.
    pub hint: String,
    /// Labeled source spans.
    pub labels: Vec<DiagnosticLabel>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, text: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Error, code, text)
    }

    pub fn warning(code: DiagnosticCode, text: impl Into<String>) -> Self {
        Self::new(DiagnosticSeverity::Warning, code, text)
    }

    fn new(severity: DiagnosticSeverity, code: DiagnosticCode, text: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            text: text.into(),
            hint: String::new(),
            labels: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = hint.into();
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: DiagnosticLabel) -> Self {
        self.labels.push(label);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.text)?;
        if let Some(label) = self.labels.first() {
            write!(f, " ({}:{})", label.line, label.column)?;
        }
        Ok(())
    }
}

/// Convert a UTF-8 byte offset to a 1-based line and 0-based column.
pub(crate) fn byte_offset_to_line_column(source: &str, offset: usize) -> (u32, u32) {
    let mut line = 1u32;
    let mut col = 0u32;
    for (i, ch) in source.char_indices() {
        if i >= offset {
            break;
        }
        if ch == '\n' {
            line += 1;
            col = 0;
        } else {
            col += 1;
        }
    }
    (line, col)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column_for_multiline_source() {
        let source = "<div>\n  <OnClick>\n</div>";
        assert_eq!(byte_offset_to_line_column(source, 0), (1, 0));
        assert_eq!(byte_offset_to_line_column(source, 8), (2, 2));
        assert_eq!(byte_offset_to_line_column(source, source.len()), (3, 6));
    }

    #[test]
    fn test_display_includes_code_and_position() {
        let source = "<p>\n<Break";
        let diagnostic = Diagnostic::error(DiagnosticCode::MalformedMarkup, "unterminated tag")
            .with_label(DiagnosticLabel::new(None, 4, 10, source));
        assert_eq!(
            diagnostic.to_string(),
            "[MalformedMarkup] unterminated tag (2:0)"
        );
    }
}
