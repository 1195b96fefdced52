//! CSS value validation for user-authored styles.
//!
//! Every value goes through the same steps, in order:
//!
//! 1. CSS escapes are decoded and the denylist is checked. A match marks the
//!    value dangerous no matter which property it belongs to.
//! 2. The property must be on the allow-list.
//! 3. Deterministic corrections are applied, each reported as a warning:
//!    whitespace collapse, lower-casing of named colors, 3-digit hex
//!    expansion, then `px` for bare numbers on length properties.
//! 4. The corrected value must match the property's grammar.
//!
//! The same validator gates the standalone style-map API and the inline
//! `style` attributes the sanitizer keeps.

mod rules;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use lightningcss::declaration::DeclarationBlock;
use lightningcss::stylesheet::ParserOptions;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::diagnostic::{Diagnostic, DiagnosticCode};

use rules::{Grammars, ValueKind};

pub use rules::PROPERTIES as ALLOWED_PROPERTIES;

/// Longest accepted value.
const MAX_VALUE_LEN: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CssErrorType {
    None,
    Invalid,
    Dangerous,
    Warning,
}

/// Outcome for one property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssValidationResult {
    pub is_valid: bool,
    pub is_dangerous: bool,
    /// Corrected value to emit when valid.
    pub sanitized_value: Option<String>,
    pub error_type: CssErrorType,
    /// Why the value was rejected.
    pub error: Option<String>,
    /// Corrections applied to a valid value.
    pub warnings: Vec<String>,
}

impl CssValidationResult {
    fn rejected(error_type: CssErrorType, error: String) -> Self {
        Self {
            is_valid: false,
            is_dangerous: error_type == CssErrorType::Dangerous,
            sanitized_value: None,
            error_type,
            error: Some(error),
            warnings: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssError {
    pub property: String,
    pub error: String,
    #[serde(rename = "type")]
    pub error_type: CssErrorType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssWarning {
    pub property: String,
    pub message: String,
}

/// Result of validating a property map.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleValidation {
    /// Accepted properties (normalized names) and their corrected values.
    pub validated_styles: BTreeMap<String, String>,
    pub errors: Vec<CssError>,
    pub warnings: Vec<CssWarning>,
}

impl StyleValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Convert errors and warnings into diagnostics.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let errors = self.errors.iter().map(|error| {
            let code = match error.error_type {
                CssErrorType::Dangerous => DiagnosticCode::CssPropertyDangerous,
                _ => DiagnosticCode::CssPropertyInvalid,
            };
            Diagnostic::error(code, format!("`{}`: {}", error.property, error.error))
        });
        let warnings = self.warnings.iter().map(|warning| {
            Diagnostic::warning(
                DiagnosticCode::CssCorrected,
                format!("`{}`: {}", warning.property, warning.message),
            )
        });
        errors.chain(warnings).collect()
    }

    /// Serialize accepted styles as a `style` attribute value.
    pub fn to_inline_style(&self) -> String {
        self.validated_styles
            .iter()
            .map(|(property, value)| format!("{property}: {value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub struct CssValidator {
    grammars: Option<Grammars>,
}

static VALIDATOR: LazyLock<CssValidator> = LazyLock::new(CssValidator::new);

/// The shared validator.
pub fn validator() -> &'static CssValidator {
    &VALIDATOR
}

/// Validate a property map with the shared validator.
pub fn validate_styles<K, V>(styles: impl IntoIterator<Item = (K, V)>) -> StyleValidation
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    validator().validate_styles(styles)
}

impl Default for CssValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl CssValidator {
    pub fn new() -> Self {
        let grammars = match Grammars::new() {
            Ok(grammars) => Some(grammars),
            Err(error) => {
                tracing::error!(%error, "css grammars failed to compile; rejecting all values");
                None
            }
        };
        Self { grammars }
    }

    /// Validate one declaration. `property` must already be normalized.
    pub fn validate_property(&self, property: &str, value: &str) -> CssValidationResult {
        let decoded = rules::decode_css(value);
        if let Some(pattern) = rules::dangerous_pattern(&decoded)
            .or_else(|| rules::dangerous_pattern(&format!("{property}:")))
        {
            return CssValidationResult::rejected(
                CssErrorType::Dangerous,
                format!("contains blocked pattern `{pattern}`"),
            );
        }

        let Some(kind) = rules::property_kind(property) else {
            return CssValidationResult::rejected(
                CssErrorType::Invalid,
                format!("property `{property}` is not allowed"),
            );
        };
        if decoded.len() > MAX_VALUE_LEN {
            return CssValidationResult::rejected(
                CssErrorType::Invalid,
                format!("value must be at most {MAX_VALUE_LEN} characters"),
            );
        }
        let Some(grammars) = &self.grammars else {
            return CssValidationResult::rejected(
                CssErrorType::Invalid,
                "value could not be checked".to_string(),
            );
        };

        let (corrected, warnings) = correct(grammars, kind, &decoded);
        if corrected.is_empty() || !grammars.matches(kind, &corrected) {
            return CssValidationResult::rejected(
                CssErrorType::Invalid,
                format!("invalid value \"{}\": {}", value.trim(), kind.hint()),
            );
        }

        CssValidationResult {
            is_valid: true,
            is_dangerous: false,
            sanitized_value: Some(corrected),
            error_type: if warnings.is_empty() {
                CssErrorType::None
            } else {
                CssErrorType::Warning
            },
            error: None,
            warnings,
        }
    }

    /// Validate a map of property names to values.
    #[instrument(level = "debug", skip_all)]
    pub fn validate_styles<K, V>(&self, styles: impl IntoIterator<Item = (K, V)>) -> StyleValidation
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut report = StyleValidation::default();
        for (property, value) in styles {
            let raw_name = property.as_ref();
            let name = rules::normalize_property_name(raw_name);
            if name != raw_name.trim() {
                report.warnings.push(CssWarning {
                    property: name.to_string(),
                    message: format!("property name \"{raw_name}\" normalized to \"{name}\""),
                });
            }
            let result = self.validate_property(&name, value.as_ref());
            match result.sanitized_value {
                Some(sanitized) if result.is_valid => {
                    report
                        .warnings
                        .extend(result.warnings.into_iter().map(|message| CssWarning {
                            property: name.to_string(),
                            message,
                        }));
                    report.validated_styles.insert(name.into_owned(), sanitized);
                }
                _ => report.errors.push(CssError {
                    property: name.into_owned(),
                    error: result.error.unwrap_or_default(),
                    error_type: result.error_type,
                }),
            }
        }
        tracing::debug!(
            accepted = report.validated_styles.len(),
            rejected = report.errors.len(),
            "validated styles"
        );
        report
    }
}

/// Apply the ordered corrections, returning the value and one warning per
/// correction that changed it.
fn correct(grammars: &Grammars, kind: ValueKind, value: &str) -> (String, Vec<String>) {
    let mut warnings = Vec::new();
    let mut current = value.to_string();

    let collapsed = rules::collapse_whitespace(&current);
    if collapsed != current {
        warnings.push("collapsed whitespace".to_string());
        current = collapsed.into_owned();
    }
    if kind.is_color() || kind == ValueKind::Border || kind == ValueKind::BoxShadow {
        let lowered = rules::lowercase_named_colors(&current);
        if lowered != current {
            warnings.push(format!("color name lower-cased to \"{lowered}\""));
            current = lowered.into_owned();
        }
        let expanded = rules::expand_short_hex(&current);
        if expanded != current {
            warnings.push(format!("short hex color expanded to \"{expanded}\""));
            current = expanded.into_owned();
        }
    }
    if kind.takes_px() {
        let with_units = rules::append_px(grammars, &current);
        if with_units != current {
            warnings.push(format!("bare number given px unit: \"{with_units}\""));
            current = with_units.into_owned();
        }
    }
    (current, warnings)
}

/// An inline `style` attribute after validation.
#[derive(Debug, Default)]
pub struct InlineStyle {
    /// The rewritten attribute value, `None` when nothing survived.
    pub value: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Validate an inline `style` attribute.
///
/// Declarations are split at top-level semicolons and each one is validated
/// like a standalone property from its source text, so corrections are
/// reported against what the author wrote. Survivors must also parse as a
/// lightningcss declaration. Rejected declarations are dropped and reported
/// as warnings, since a bad style never fails a template.
pub fn sanitize_inline_style(style: &str) -> InlineStyle {
    let decoded = rules::decode_css(style);
    if let Some(pattern) = rules::dangerous_pattern(&decoded) {
        return InlineStyle {
            value: None,
            diagnostics: vec![Diagnostic::warning(
                DiagnosticCode::CssPropertyDangerous,
                format!("removed style attribute containing blocked pattern `{pattern}`"),
            )],
        };
    }

    let mut malformed = Vec::new();
    let mut declarations = Vec::new();
    for declaration in split_declarations(style) {
        match declaration.split_once(':') {
            Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
                declarations.push((name.trim().to_ascii_lowercase(), value.trim()));
            }
            _ => malformed.push(Diagnostic::warning(
                DiagnosticCode::CssPropertyInvalid,
                format!("removed malformed declaration \"{declaration}\""),
            )),
        }
    }

    let mut report = validator().validate_styles(declarations);
    let StyleValidation {
        validated_styles,
        errors,
        ..
    } = &mut report;
    validated_styles.retain(|property, value| {
        let css = format!("{property}: {value}");
        let parsed = DeclarationBlock::parse_string(&css, ParserOptions::default()).is_ok();
        if !parsed {
            errors.push(CssError {
                property: property.clone(),
                error: format!("\"{value}\" is not a valid declaration"),
                error_type: CssErrorType::Invalid,
            });
        }
        parsed
    });

    let diagnostics = malformed
        .into_iter()
        .chain(report.diagnostics().into_iter().map(|mut diagnostic| {
            diagnostic.severity = crate::diagnostic::DiagnosticSeverity::Warning;
            diagnostic
        }))
        .collect();
    let value = report.to_inline_style();
    InlineStyle {
        value: (!value.is_empty()).then_some(value),
        diagnostics,
    }
}

/// Split a declaration block at semicolons outside parentheses and quotes.
/// Empty declarations are skipped.
fn split_declarations(style: &str) -> Vec<&str> {
    let mut declarations = Vec::new();
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;
    for (i, c) in style.char_indices() {
        match (quote, c) {
            (Some(open), c) if c == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ';') if depth == 0 => {
                declarations.push(&style[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    declarations.push(&style[start..]);
    declarations
        .into_iter()
        .map(str::trim)
        .filter(|declaration| !declaration.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(property: &str, value: &str) -> CssValidationResult {
        validator().validate_property(property, value)
    }

    #[test]
    fn test_short_hex_is_expanded() {
        let result = check("color", "#abc");
        assert!(result.is_valid);
        assert_eq!(result.sanitized_value.as_deref(), Some("#aabbcc"));
        assert_eq!(result.error_type, CssErrorType::Warning);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_bare_font_size_gets_px() {
        let result = check("font-size", "16");
        assert_eq!(result.sanitized_value.as_deref(), Some("16px"));
        let result = check("line-height", "1.5");
        assert_eq!(result.sanitized_value.as_deref(), Some("1.5"));
        assert_eq!(result.error_type, CssErrorType::None);
    }

    #[test]
    fn test_javascript_is_rejected_for_every_property() {
        for (property, _) in ALLOWED_PROPERTIES {
            let result = check(property, "javascript:alert(1)");
            assert!(result.is_dangerous, "{property}");
            assert!(!result.is_valid);
        }
        assert!(check("not-a-property", "javascript:alert(1)").is_dangerous);
        assert!(check("background", "url(\\6a avascript:alert(1))").is_dangerous);
    }

    #[test]
    fn test_unknown_property_is_invalid() {
        let result = check("position", "fixed");
        assert_eq!(result.error_type, CssErrorType::Invalid);
        assert!(result.error.unwrap().contains("not allowed"));
    }

    #[test]
    fn test_corrections_run_in_order() {
        let result = check("border", "  1px   solid   #FFF ");
        assert_eq!(result.sanitized_value.as_deref(), Some("1px solid #FFFFFF"));
        assert_eq!(result.warnings.len(), 2);
        assert!(result.warnings[0].contains("whitespace"));
        assert!(result.warnings[1].contains("hex"));

        let result = check("color", "Red");
        assert_eq!(result.sanitized_value.as_deref(), Some("red"));
    }

    #[test]
    fn test_validate_styles_map() {
        let report = validate_styles([
            ("fontSize", "16"),
            ("color", "#abc"),
            ("position", "fixed"),
            ("background", "expression(alert(1))"),
        ]);
        assert_eq!(report.validated_styles.get("font-size").map(String::as_str), Some("16px"));
        assert_eq!(report.validated_styles.get("color").map(String::as_str), Some("#aabbcc"));
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[1].error_type, CssErrorType::Dangerous);
        assert!(report.warnings.iter().any(|w| w.message.contains("normalized")));
    }

    #[test]
    fn test_inline_style_drops_bad_declarations() {
        let style = sanitize_inline_style("color: red; position: fixed; padding: 8px");
        let value = style.value.unwrap();
        assert!(value.contains("color: red"));
        assert!(value.contains("padding: 8px"));
        assert!(!value.contains("position"));
        assert_eq!(style.diagnostics.len(), 1);
        assert!(!style.diagnostics[0].is_error());
    }

    #[test]
    fn test_inline_style_with_blocked_pattern_is_removed() {
        let style = sanitize_inline_style("background: url(javascript:alert(1))");
        assert!(style.value.is_none());
        assert_eq!(
            style.diagnostics[0].code,
            DiagnosticCode::CssPropertyDangerous
        );
    }

    #[test]
    fn test_inline_style_reports_every_change() {
        let style =
            sanitize_inline_style("font-size: 16; colr: red; color: #abc; width: {owner.handle}");
        assert_eq!(style.value.as_deref(), Some("color: #aabbcc; font-size: 16px"));
        let mut codes: Vec<_> = style
            .diagnostics
            .iter()
            .map(|diagnostic| (diagnostic.code, diagnostic.text.split('`').nth(1).unwrap_or_default()))
            .collect();
        codes.sort_unstable_by_key(|(_, property)| *property);
        assert_eq!(
            codes,
            vec![
                (DiagnosticCode::CssCorrected, "color"),
                (DiagnosticCode::CssPropertyInvalid, "colr"),
                (DiagnosticCode::CssCorrected, "font-size"),
                (DiagnosticCode::CssPropertyInvalid, "width"),
            ]
        );
        assert!(style.diagnostics.iter().all(|diagnostic| !diagnostic.is_error()));
    }

    #[test]
    fn test_inline_style_reports_malformed_declarations() {
        let style = sanitize_inline_style("color: red; oops; : 4px;;");
        assert_eq!(style.value.as_deref(), Some("color: red"));
        assert_eq!(style.diagnostics.len(), 2);
        assert!(
            style
                .diagnostics
                .iter()
                .all(|diagnostic| diagnostic.code == DiagnosticCode::CssPropertyInvalid)
        );
    }

    #[test]
    fn test_split_declarations_respects_parentheses_and_quotes() {
        assert_eq!(
            split_declarations("color: rgb(0, 0, 0); font-family: 'a;b'; ;"),
            vec!["color: rgb(0, 0, 0)", "font-family: 'a;b'"]
        );
    }
}
