//! The compile pipeline.
//!
//! ```text
//! Raw ─▶ Sanitized ─▶ Parsed ─▶ Validated ─▶ IslandsDetected ─▶ Compiled
//!  │         │          │           │               │
//!  ▼         ▼          ▼           ▼               ▼
//! SizeLimitExceeded  ParseError  ValidationFailed  CompileError
//! ```
//!
//! `Sanitized` is reached once the input passed the size gate and the
//! markup pre-scan; `Parsed` once the allow-listed tree exists. The time
//! budget is checked between stages and periodically inside every loop.
//! [`compile`] never panics on user input: every failure is returned as
//! diagnostics on the [`CompileResult`].

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Ast;
use crate::budget::{BudgetExceeded, Deadline};
use crate::diagnostic::{Diagnostic, DiagnosticCode, DiagnosticLabel};
use crate::islands::{Island, IslandError, detect_islands, template_hash};
use crate::options::CompileOptions;
use crate::parser::{ParseError, parse_preprocessed, preprocess};
use crate::printer::print_static;
use crate::registry::ComponentRegistry;
use crate::validator::{AstStats, validate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Raw,
    Sanitized,
    Parsed,
    Validated,
    IslandsDetected,
    Compiled,
    SizeLimitExceeded,
    ParseError,
    ValidationFailed,
    CompileError,
}

impl Stage {
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::SizeLimitExceeded | Self::ParseError | Self::ValidationFailed | Self::CompileError
        )
    }
}

/// Why a compile stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileFailure {
    #[error("template is {actual} bytes, the limit is {limit} bytes")]
    SizeLimitExceeded { actual: usize, limit: usize },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("template failed validation: {reason}")]
    ValidationFailed {
        reason: String,
        errors: Vec<Diagnostic>,
    },
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),
    #[error(transparent)]
    Islands(#[from] IslandError),
}

impl CompileFailure {
    /// The terminal stage this failure ends the pipeline in.
    pub const fn stage(&self) -> Stage {
        match self {
            Self::SizeLimitExceeded { .. } => Stage::SizeLimitExceeded,
            Self::Parse(ParseError::Malformed(_)) => Stage::ParseError,
            Self::Parse(ParseError::Limit(_)) | Self::ValidationFailed { .. } => {
                Stage::ValidationFailed
            }
            Self::Parse(ParseError::Budget(_)) | Self::Budget(_) | Self::Islands(_) => {
                Stage::CompileError
            }
        }
    }

    /// Diagnostics for the caller. `source` is used for line/column labels.
    pub fn into_diagnostics(self, source: &str, options: &CompileOptions) -> Vec<Diagnostic> {
        let budget = |error: &BudgetExceeded| {
            Diagnostic::error(DiagnosticCode::CompileBudgetExceeded, error.to_string())
                .with_hint("simplify the template")
        };
        match self {
            Self::SizeLimitExceeded { .. } => vec![
                Diagnostic::error(DiagnosticCode::SizeLimitExceeded, self.to_string())
                    .with_hint("shorten the template"),
            ],
            Self::Parse(ParseError::Malformed(malformed)) => vec![
                Diagnostic::error(DiagnosticCode::MalformedMarkup, malformed.message.clone())
                    .with_label(DiagnosticLabel::new(
                        None,
                        malformed.start,
                        malformed.end,
                        source,
                    )),
            ],
            Self::Parse(ParseError::Limit(limit)) => {
                let configured = match limit.kind {
                    crate::ast::LimitKind::NodeCount => options.limits.max_nodes,
                    crate::ast::LimitKind::Depth => options.limits.max_depth,
                    crate::ast::LimitKind::ComponentCount => options.limits.max_components,
                };
                vec![
                    Diagnostic::error(
                        DiagnosticCode::ValidationLimitExceeded,
                        format!(
                            "template {} is at least {}, the limit is {configured}",
                            limit.kind.as_str(),
                            limit.actual
                        ),
                    )
                    .with_hint("parsing stopped early"),
                ]
            }
            Self::Parse(ParseError::Budget(error)) | Self::Budget(error) => vec![budget(&error)],
            Self::ValidationFailed { errors, .. } => errors,
            Self::Islands(IslandError::Budget(error)) => vec![budget(&error)],
            Self::Islands(error) => vec![Diagnostic::error(
                DiagnosticCode::ValidationLimitExceeded,
                error.to_string(),
            )],
        }
    }
}

/// Size statistics reported for a compile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileStats {
    pub node_count: usize,
    pub max_depth: usize,
    pub component_counts: BTreeMap<String, usize>,
    /// Input size in kilobytes, two decimals.
    pub size_kb: f64,
}

impl CompileStats {
    #[expect(clippy::cast_precision_loss)]
    fn new(stats: AstStats, bytes: usize) -> Self {
        Self {
            node_count: stats.node_count,
            max_depth: stats.max_depth,
            component_counts: stats.component_counts,
            size_kb: (bytes as f64 / 1024.0 * 100.0).round() / 100.0,
        }
    }
}

/// A template ready to render. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledTemplate {
    pub static_html: String,
    pub islands: Vec<Island>,
    /// Milliseconds since the Unix epoch.
    pub compiled_at: u64,
    pub template_hash: String,
    /// The validated tree islands index into.
    pub ast: Ast,
    pub stats: CompileStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityError {
    #[error("compiled template tree is malformed: {0}")]
    Tree(String),
    #[error("island `{0}` does not match the compiled template tree")]
    Island(String),
}

impl CompiledTemplate {
    pub fn island(&self, id: &str) -> Option<&Island> {
        self.islands.iter().find(|island| island.id == id)
    }

    /// Check a template that came back from storage before rendering it.
    pub fn verify(&self) -> Result<(), IntegrityError> {
        self.ast.check_structure().map_err(IntegrityError::Tree)?;
        for island in &self.islands {
            let matches = self.ast.get(island.root).is_some_and(|node| {
                node.component() == Some(island.component) && node.end == island.end
            });
            if !matches {
                return Err(IntegrityError::Island(island.id.clone()));
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Output of [`compile`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ast: Option<Ast>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compiled: Option<CompiledTemplate>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CompileStats>,
    pub stage: Stage,
    /// Names of removed elements, in first-seen order.
    pub stripped_components: Vec<String>,
}

#[derive(Debug)]
struct Progress {
    stage: Stage,
    warnings: Vec<Diagnostic>,
    stripped_components: Vec<String>,
    stats: Option<CompileStats>,
}

impl Progress {
    fn advance(&mut self, stage: Stage) {
        tracing::debug!(from = ?self.stage, to = ?stage, "compile stage");
        self.stage = stage;
    }
}

/// Compile `source` into a [`CompiledTemplate`].
#[tracing::instrument(skip_all, fields(bytes = source.len()))]
pub fn compile(source: &str, registry: &ComponentRegistry, options: &CompileOptions) -> CompileResult {
    let mut progress = Progress {
        stage: Stage::Raw,
        warnings: Vec::new(),
        stripped_components: Vec::new(),
        stats: None,
    };
    match run(source, registry, options, &mut progress) {
        Ok(compiled) => {
            progress.advance(Stage::Compiled);
            CompileResult {
                success: true,
                ast: Some(compiled.ast.clone()),
                stats: Some(compiled.stats.clone()),
                compiled: Some(compiled),
                errors: Vec::new(),
                warnings: progress.warnings,
                stage: Stage::Compiled,
                stripped_components: progress.stripped_components,
            }
        }
        Err(failure) => {
            let stage = failure.stage();
            tracing::debug!(after = ?progress.stage, failed = ?stage, error = %failure, "compile failed");
            CompileResult {
                success: false,
                ast: None,
                compiled: None,
                errors: failure.into_diagnostics(source, options),
                warnings: progress.warnings,
                stats: progress.stats,
                stage,
                stripped_components: progress.stripped_components,
            }
        }
    }
}

fn run(
    source: &str,
    registry: &ComponentRegistry,
    options: &CompileOptions,
    progress: &mut Progress,
) -> Result<CompiledTemplate, CompileFailure> {
    let deadline = Deadline::new(options.time_budget);
    let limit = options.limits.max_input_bytes;
    if source.len() > limit {
        return Err(CompileFailure::SizeLimitExceeded {
            actual: source.len(),
            limit,
        });
    }

    let preprocessed = preprocess(source, registry, &deadline)?;
    progress.advance(Stage::Sanitized);
    deadline.check()?;

    let parsed = parse_preprocessed(&preprocessed, registry, options, &deadline)?;
    progress.warnings.extend(parsed.warnings);
    progress.stripped_components = parsed.stripped_components;
    progress.advance(Stage::Parsed);
    deadline.check()?;

    let mut ast = parsed.ast;
    let validation = validate(&mut ast, registry, &options.limits, &deadline)?;
    progress.warnings.extend(validation.warnings);
    let stats = CompileStats::new(validation.stats, source.len());
    progress.stats = Some(stats.clone());
    if !validation.is_valid {
        return Err(CompileFailure::ValidationFailed {
            reason: validation.errors.first().map(|e| e.text.clone()).unwrap_or_default(),
            errors: validation.errors,
        });
    }
    progress.advance(Stage::Validated);
    deadline.check()?;

    let hash = template_hash(source);
    let partition = detect_islands(&ast, &hash, options.get_island_prefix(), &deadline)?;
    progress.advance(Stage::IslandsDetected);
    deadline.check()?;

    let static_html = print_static(&partition.skeleton, &partition.islands, &deadline)?;
    let compiled_at = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));

    Ok(CompiledTemplate {
        static_html,
        islands: partition.islands,
        compiled_at,
        template_hash: hash,
        ast,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::options::Dialect;

    fn compile_default(source: &str) -> CompileResult {
        compile(source, &ComponentRegistry::standard(), &CompileOptions::new())
    }

    #[test]
    fn test_successful_compile() {
        let result = compile_default(
            r#"<FlexContainer><DisplayName/><OnClick><span>hi</span></OnClick></FlexContainer>"#,
        );
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.stage, Stage::Compiled);
        let compiled = result.compiled.unwrap();
        assert_eq!(compiled.islands.len(), 1);
        assert!(compiled.static_html.contains("data-island-component=\"OnClick\""));
        let stats = result.stats.unwrap();
        assert_eq!(stats.node_count, 5);
        assert_eq!(stats.component_counts.get("DisplayName"), Some(&1));
        assert!(stats.size_kb > 0.0);
    }

    #[test]
    fn test_oversized_input_fails_before_parsing() {
        let source = format!("<p>{}</p>", "x".repeat(70 * 1024));
        let result = compile_default(&source);
        assert!(!result.success);
        assert_eq!(result.stage, Stage::SizeLimitExceeded);
        assert_eq!(result.errors[0].code, DiagnosticCode::SizeLimitExceeded);
        assert!(result.stats.is_none());
    }

    #[test]
    fn test_malformed_markup_has_position() {
        let result = compile_default("<div>\n  <OnClick>\n</div>");
        assert_eq!(result.stage, Stage::ParseError);
        let error = &result.errors[0];
        assert_eq!(error.code, DiagnosticCode::MalformedMarkup);
        assert_eq!((error.labels[0].line, error.labels[0].column), (2, 2));
    }

    #[test]
    fn test_depth_failure_keeps_stats() {
        let source = format!("{}{}", "<CenteredBox>".repeat(25), "</CenteredBox>".repeat(25));
        let result = compile_default(&source);
        assert_eq!(result.stage, Stage::ValidationFailed);
        assert!(result.errors[0].text.contains("25"));
        assert_eq!(result.stats.unwrap().max_depth, 25);
    }

    #[test]
    fn test_hard_ceiling_is_a_validation_failure() {
        let result = compile_default(&"<div>".repeat(300));
        assert_eq!(result.stage, Stage::ValidationFailed);
        assert_eq!(result.errors[0].code, DiagnosticCode::ValidationLimitExceeded);
    }

    #[test]
    fn test_warnings_and_stripped_components_survive_success() {
        let result = compile_default("<p>ok</p><script>x</script><Gadget>y</Gadget>");
        assert!(result.success);
        assert_eq!(result.stripped_components, vec!["script", "Gadget"]);
        assert_eq!(result.warnings.len(), 2);
    }

    #[test]
    fn test_zero_budget_is_a_compile_error() {
        let options = CompileOptions::new().with_time_budget(Duration::ZERO);
        let result = compile("<p>x</p>", &ComponentRegistry::standard(), &options);
        assert_eq!(result.stage, Stage::CompileError);
        assert_eq!(result.errors[0].code, DiagnosticCode::CompileBudgetExceeded);
    }

    #[test]
    fn test_data_attribute_dialect_compiles_islands() {
        let options = CompileOptions::new().with_dialect(Dialect::DataAttributes);
        let result = compile(
            r#"<div data-component="OnClick"><span>x</span></div>"#,
            &ComponentRegistry::standard(),
            &options,
        );
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.compiled.unwrap().islands[0].component.name(), "OnClick");
    }

    #[test]
    fn test_json_round_trip_verifies() {
        let compiled = compile_default("<div><OnHover><p>a</p></OnHover></div>")
            .compiled
            .unwrap();
        let restored = CompiledTemplate::from_json(&compiled.to_json().unwrap()).unwrap();
        assert_eq!(restored, compiled);
        assert_eq!(restored.verify(), Ok(()));

        let mut tampered = restored;
        tampered.islands[0].end = crate::ast::NodeId::new(1);
        assert_eq!(
            tampered.verify(),
            Err(IntegrityError::Island(tampered.islands[0].id.clone()))
        );
    }
}
