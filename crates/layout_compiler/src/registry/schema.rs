//! Typed props schemas and coercion.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::ast::Attributes;
use crate::binding::{BindingPath, TemplatePart, split_bindings};
use crate::css;

/// Longest accepted string prop value.
const MAX_STRING_LEN: usize = 500;
/// Longest accepted validation pattern.
const MAX_PATTERN_LEN: usize = 200;

/// The declared type of a prop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropType {
    String,
    Number { min: f64, max: f64, integer: bool },
    Boolean,
    Enum(&'static [&'static str]),
    /// A dotted binding path, e.g. `posts` or `owner.handle`.
    Binding,
    /// A regular expression (checked to compile).
    Pattern,
    /// A value for the named CSS property, checked by the CSS validator.
    Css(&'static str),
}

impl PropType {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number { .. } => "number",
            Self::Boolean => "boolean",
            Self::Enum(_) => "enum",
            Self::Binding => "binding",
            Self::Pattern => "pattern",
            Self::Css(_) => "css",
        }
    }
}

/// One entry of a component's props schema.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropSchema {
    pub name: &'static str,
    pub ty: PropType,
    pub required: bool,
    pub default: Option<&'static str>,
}

impl PropSchema {
    const fn new(name: &'static str, ty: PropType) -> Self {
        Self {
            name,
            ty,
            required: false,
            default: None,
        }
    }

    pub const fn string(name: &'static str) -> Self {
        Self::new(name, PropType::String)
    }

    pub const fn number(name: &'static str, min: f64, max: f64) -> Self {
        Self::new(
            name,
            PropType::Number {
                min,
                max,
                integer: false,
            },
        )
    }

    pub const fn integer(name: &'static str, min: f64, max: f64) -> Self {
        Self::new(
            name,
            PropType::Number {
                min,
                max,
                integer: true,
            },
        )
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, PropType::Boolean)
    }

    pub const fn one_of(name: &'static str, variants: &'static [&'static str]) -> Self {
        Self::new(name, PropType::Enum(variants))
    }

    pub const fn binding(name: &'static str) -> Self {
        Self::new(name, PropType::Binding)
    }

    pub const fn pattern(name: &'static str) -> Self {
        Self::new(name, PropType::Pattern)
    }

    /// A prop written into the wrapper's `style` as `property`.
    pub const fn css(name: &'static str, property: &'static str) -> Self {
        Self::new(name, PropType::Css(property))
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub const fn default_value(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    /// Coerce a raw attribute value into a typed prop value.
    pub fn coerce_value(&self, raw: &str) -> Result<PropValue, String> {
        match self.ty {
            PropType::String => {
                if raw.len() > MAX_STRING_LEN {
                    Err(format!("must be at most {MAX_STRING_LEN} characters"))
                } else {
                    Ok(PropValue::String(raw.to_string()))
                }
            }
            PropType::Number { min, max, integer } => {
                let value: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| format!("expected a number, found \"{raw}\""))?;
                if !value.is_finite() {
                    return Err(format!("expected a number, found \"{raw}\""));
                }
                if integer && value.fract() != 0.0 {
                    return Err(format!("expected a whole number, found \"{raw}\""));
                }
                if value < min || value > max {
                    return Err(format!("must be between {min} and {max}, found {value}"));
                }
                Ok(PropValue::Number(value))
            }
            PropType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                // `<Validate required>` arrives as an empty attribute value.
                "" | "true" => Ok(PropValue::Bool(true)),
                "false" => Ok(PropValue::Bool(false)),
                value if value == self.name.to_ascii_lowercase() => Ok(PropValue::Bool(true)),
                _ => Err(format!("expected true or false, found \"{raw}\"")),
            },
            PropType::Enum(variants) => {
                let trimmed = raw.trim();
                variants
                    .iter()
                    .find(|variant| variant.eq_ignore_ascii_case(trimmed))
                    .map(|variant| PropValue::String((*variant).to_string()))
                    .ok_or_else(|| {
                        format!("expected one of {}, found \"{raw}\"", variants.join(", "))
                    })
            }
            PropType::Binding => BindingPath::parse(raw)
                .map(|path| PropValue::Binding(path.to_string()))
                .ok_or_else(|| format!("expected a binding name like \"posts\", found \"{raw}\"")),
            PropType::Pattern => {
                if raw.len() > MAX_PATTERN_LEN {
                    return Err(format!("must be at most {MAX_PATTERN_LEN} characters"));
                }
                Regex::new(raw)
                    .map(|_| PropValue::String(raw.to_string()))
                    .map_err(|_| format!("\"{raw}\" is not a valid pattern"))
            }
            PropType::Css(property) => {
                // Resident data never reaches a style value.
                if split_bindings(raw)
                    .iter()
                    .any(|part| matches!(part, TemplatePart::Binding(_)))
                {
                    return Err(format!("cannot contain a binding, found \"{raw}\""));
                }
                let result = css::validator().validate_property(property, raw);
                match result.sanitized_value {
                    Some(value) if result.is_valid => Ok(PropValue::String(value)),
                    _ => Err(result
                        .error
                        .unwrap_or_else(|| format!("is not a valid `{property}` value"))),
                }
            }
        }
    }
}

/// A coerced prop value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum PropValue {
    String(String),
    Number(f64),
    Bool(bool),
    Binding(String),
}

impl PropValue {
    /// Render the value as an attribute string.
    pub fn to_attribute_value(&self) -> String {
        match self {
            Self::String(s) | Self::Binding(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Bool(b) => b.to_string(),
        }
    }
}

/// Format a number without a trailing `.0` for whole values.
pub(crate) fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

/// Coerced props in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Props(Vec<(String, PropValue)>);

impl Props {
    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            PropValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn binding(&self, name: &str) -> Option<BindingPath> {
        match self.get(name)? {
            PropValue::Binding(path) => BindingPath::parse(path),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A prop that failed coercion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropError {
    pub prop: String,
    pub message: String,
}

/// Validate and default `attributes` against `schema`.
///
/// Attributes that are not props (e.g. `style`) are ignored here; the
/// sanitizer has already removed anything not allowed on the element.
pub fn coerce_props(schema: &[PropSchema], attributes: &Attributes) -> Result<Props, Vec<PropError>> {
    let mut props = Vec::with_capacity(schema.len());
    let mut errors = Vec::new();

    for entry in schema {
        let raw = attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(entry.name))
            .map(|attr| attr.value.as_str());

        match (raw, entry.default) {
            (Some(raw), _) => match entry.coerce_value(raw) {
                Ok(value) => props.push((entry.name.to_string(), value)),
                Err(message) => errors.push(PropError {
                    prop: entry.name.to_string(),
                    message,
                }),
            },
            (None, Some(default)) => {
                if let Ok(value) = entry.coerce_value(default) {
                    props.push((entry.name.to_string(), value));
                }
            }
            (None, None) if entry.required => errors.push(PropError {
                prop: entry.name.to_string(),
                message: "is required".to_string(),
            }),
            (None, None) => {}
        }
    }

    if errors.is_empty() {
        Ok(Props(props))
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Attribute;

    fn attrs(pairs: &[(&str, &str)]) -> Attributes {
        pairs
            .iter()
            .map(|(name, value)| Attribute::new(*name, *value))
            .collect()
    }

    const LOOP: &[PropSchema] = &[
        PropSchema::binding("var").required(),
        PropSchema::string("item").required(),
        PropSchema::integer("limit", 1.0, 100.0).default_value("10"),
    ];

    #[test]
    fn test_coerce_fills_defaults() {
        let props = coerce_props(LOOP, &attrs(&[("var", "posts"), ("item", "post")])).unwrap();
        assert_eq!(props.binding("var").unwrap().to_string(), "posts");
        assert_eq!(props.str("item"), Some("post"));
        assert_eq!(props.number("limit"), Some(10.0));
    }

    #[test]
    fn test_coerce_reports_missing_and_invalid() {
        let errors = coerce_props(LOOP, &attrs(&[("limit", "2.5")])).unwrap_err();
        let props: Vec<_> = errors.iter().map(|e| e.prop.as_str()).collect();
        assert_eq!(props, vec!["var", "item", "limit"]);
        assert!(errors[2].message.contains("whole number"));
    }

    #[test]
    fn test_coerce_is_case_insensitive_on_names() {
        let schema = &[PropSchema::integer("minLength", 0.0, 10.0)];
        let props = coerce_props(schema, &attrs(&[("minlength", "3")])).unwrap();
        assert_eq!(props.number("minLength"), Some(3.0));
    }

    #[test]
    fn test_boolean_accepts_bare_attribute() {
        let schema = PropSchema::boolean("required");
        assert_eq!(schema.coerce_value(""), Ok(PropValue::Bool(true)));
        assert_eq!(schema.coerce_value("required"), Ok(PropValue::Bool(true)));
        assert_eq!(schema.coerce_value("false"), Ok(PropValue::Bool(false)));
        assert!(schema.coerce_value("maybe").is_err());
    }

    #[test]
    fn test_enum_normalizes_case() {
        let schema = PropSchema::one_of("direction", &["row", "column"]);
        assert_eq!(
            schema.coerce_value("Column"),
            Ok(PropValue::String("column".to_string()))
        );
        assert!(schema.coerce_value("diagonal").is_err());
    }

    #[test]
    fn test_pattern_must_compile() {
        let schema = PropSchema::pattern("pattern");
        assert!(schema.coerce_value("^[a-z]+$").is_ok());
        assert!(schema.coerce_value("([a-z]").is_err());
    }

    #[test]
    fn test_format_number_drops_trailing_zero() {
        assert_eq!(format_number(16.0), "16");
        assert_eq!(format_number(0.5), "0.5");
    }

    #[test]
    fn test_css_prop_is_validated_for_its_property() {
        let schema = PropSchema::css("maxWidth", "max-width");
        assert_eq!(
            schema.coerce_value("40rem"),
            Ok(PropValue::String("40rem".to_string()))
        );
        assert_eq!(
            schema.coerce_value("600"),
            Ok(PropValue::String("600px".to_string()))
        );
        assert!(schema.coerce_value("1px; position: fixed").is_err());
        assert!(schema.coerce_value("expression(alert(1))").is_err());
        let error = schema.coerce_value("{owner.handle}").unwrap_err();
        assert!(error.contains("binding"));
    }
}
