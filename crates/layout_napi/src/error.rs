use napi_derive::napi;

use layout_compiler::{Diagnostic, DiagnosticLabel, DiagnosticSeverity};

#[napi(object, use_nullable = true)]
#[derive(Clone)]
pub struct CompilerError {
    pub severity: Severity,
    /// Stable machine-readable code, e.g. `"MalformedMarkup"`.
    pub code: String,
    pub message: String,
    pub labels: Vec<ErrorLabel>,
    pub help_message: Option<String>,
}

impl CompilerError {
    pub fn from_diagnostics(diagnostics: &[Diagnostic]) -> Vec<Self> {
        diagnostics.iter().map(Self::from).collect()
    }
}

impl From<&Diagnostic> for CompilerError {
    fn from(diagnostic: &Diagnostic) -> Self {
        Self {
            severity: Severity::from(diagnostic.severity),
            code: diagnostic.code.as_str().to_string(),
            message: diagnostic.text.clone(),
            labels: diagnostic.labels.iter().map(ErrorLabel::from).collect(),
            help_message: (!diagnostic.hint.is_empty()).then(|| diagnostic.hint.clone()),
        }
    }
}

#[napi(object, use_nullable = true)]
#[derive(Clone)]
pub struct ErrorLabel {
    pub message: Option<String>,
    pub start: u32,
    pub end: u32,
    /// 1-based line number in the source.
    pub line: u32,
    /// 0-based column number in the source.
    pub column: u32,
}

impl From<&DiagnosticLabel> for ErrorLabel {
    fn from(label: &DiagnosticLabel) -> Self {
        Self {
            message: label.text.clone(),
            start: label.start,
            end: label.end,
            line: label.line,
            column: label.column,
        }
    }
}

#[napi(string_enum)]
#[derive(Clone)]
pub enum Severity {
    Error,
    Warning,
    Advice,
}

impl From<DiagnosticSeverity> for Severity {
    fn from(value: DiagnosticSeverity) -> Self {
        match value {
            DiagnosticSeverity::Error => Self::Error,
            DiagnosticSeverity::Warning => Self::Warning,
            DiagnosticSeverity::Information | DiagnosticSeverity::Hint => Self::Advice,
        }
    }
}
