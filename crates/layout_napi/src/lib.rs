//! Profile layout compilation and rendering for Node.js.
//!
//! Compiled templates cross the boundary as JSON strings so the host can
//! store them and hand them back to the render functions unchanged.

mod error;

#[cfg(all(
    feature = "allocator",
    not(any(
        target_arch = "arm",
        target_os = "freebsd",
        target_os = "windows",
        target_family = "wasm"
    ))
))]
#[global_allocator]
static ALLOC: mimalloc_safe::MiMalloc = mimalloc_safe::MiMalloc;

use std::collections::HashMap;
use std::mem;
use std::sync::LazyLock;
use std::time::Duration;

use napi::{Task, bindgen_prelude::AsyncTask};
use napi_derive::napi;

use crate::error::CompilerError;
use layout_compiler::css::{CssErrorType, validate_styles};
use layout_compiler::{
    CompiledTemplate, ComponentRegistry, DiagnosticCode, Dialect, Limits, Renderer, ResidentData,
};

static REGISTRY: LazyLock<ComponentRegistry> = LazyLock::new(ComponentRegistry::standard);

/// How components are written in template markup.
#[napi(string_enum)]
pub enum MarkupDialect {
    /// `<OnClick>...</OnClick>`
    #[napi(value = "custom-tags")]
    CustomTags,
    /// `<div data-component="OnClick">...</div>`
    #[napi(value = "data-attributes")]
    DataAttributes,
}

#[napi(string_enum)]
pub enum RenderMode {
    /// Unresolved bindings render empty.
    #[napi(value = "production")]
    Production,
    /// Unresolved bindings render a visible placeholder and a warning.
    #[napi(value = "preview")]
    Preview,
}

/// Options for compiling a template. Limits can only be lowered.
#[napi(object)]
#[derive(Default)]
pub struct CompileOptions {
    /// @default "custom-tags"
    #[napi(ts_type = "'custom-tags' | 'data-attributes'")]
    pub dialect: Option<MarkupDialect>,
    /// @default 65536
    pub max_input_bytes: Option<u32>,
    /// @default 200
    pub max_nodes: Option<u32>,
    /// @default 20
    pub max_depth: Option<u32>,
    /// @default 50
    pub max_components: Option<u32>,
    /// Wall-clock budget in milliseconds.
    ///
    /// @default 250
    pub time_budget_ms: Option<u32>,
    /// @default "island"
    pub island_prefix: Option<String>,
}

impl CompileOptions {
    fn to_compiler(&self) -> layout_compiler::CompileOptions {
        let defaults = Limits::default();
        let limit = |value: Option<u32>, default: usize| value.map_or(default, |v| v as usize);
        let mut options = layout_compiler::CompileOptions::new().with_limits(Limits {
            max_input_bytes: limit(self.max_input_bytes, defaults.max_input_bytes),
            max_nodes: limit(self.max_nodes, defaults.max_nodes),
            max_depth: limit(self.max_depth, defaults.max_depth),
            max_components: limit(self.max_components, defaults.max_components),
        });
        if let Some(MarkupDialect::DataAttributes) = self.dialect {
            options = options.with_dialect(Dialect::DataAttributes);
        }
        if let Some(ms) = self.time_budget_ms {
            options = options.with_time_budget(Duration::from_millis(u64::from(ms)));
        }
        if let Some(prefix) = &self.island_prefix {
            options = options.with_island_prefix(prefix.clone());
        }
        options
    }
}

#[napi(object)]
#[derive(Clone)]
pub struct Island {
    pub id: String,
    pub component: String,
}

#[napi(object)]
pub struct CompileStats {
    pub node_count: u32,
    pub max_depth: u32,
    pub component_counts: HashMap<String, u32>,
    pub size_kb: f64,
}

#[napi(object)]
pub struct CompileResult {
    pub success: bool,
    /// Final pipeline stage, e.g. `"compiled"` or `"validationFailed"`.
    pub stage: String,
    /// The compiled template as JSON; pass it to the render functions.
    pub compiled: Option<String>,
    pub static_html: Option<String>,
    pub islands: Vec<Island>,
    pub stats: Option<CompileStats>,
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerError>,
    pub stripped_components: Vec<String>,
}

#[expect(clippy::cast_possible_truncation)]
fn compile_template_impl(source_text: &str, options: &CompileOptions) -> CompileResult {
    let result = layout_compiler::compile(source_text, &REGISTRY, &options.to_compiler());

    let stage = serde_json::to_value(result.stage)
        .ok()
        .and_then(|value| value.as_str().map(ToString::to_string))
        .unwrap_or_default();
    let stats = result.stats.as_ref().map(|stats| CompileStats {
        node_count: stats.node_count as u32,
        max_depth: stats.max_depth as u32,
        component_counts: stats
            .component_counts
            .iter()
            .map(|(name, count)| (name.clone(), *count as u32))
            .collect(),
        size_kb: stats.size_kb,
    });
    let (compiled, static_html, islands) = match &result.compiled {
        Some(template) => (
            template.to_json().ok(),
            Some(template.static_html.clone()),
            template
                .islands
                .iter()
                .map(|island| Island {
                    id: island.id.clone(),
                    component: island.component.name().to_string(),
                })
                .collect(),
        ),
        None => (None, None, Vec::new()),
    };

    CompileResult {
        success: result.success && compiled.is_some(),
        stage,
        compiled,
        static_html,
        islands,
        stats,
        errors: CompilerError::from_diagnostics(&result.errors),
        warnings: CompilerError::from_diagnostics(&result.warnings),
        stripped_components: result.stripped_components,
    }
}

#[napi]
pub fn compile_template_sync(
    source_text: String,
    options: Option<CompileOptions>,
) -> CompileResult {
    let options = options.unwrap_or_default();
    compile_template_impl(&source_text, &options)
}

pub struct CompileTask {
    source_text: String,
    options: CompileOptions,
}

#[napi]
impl Task for CompileTask {
    type JsValue = CompileResult;
    type Output = CompileResult;

    fn compute(&mut self) -> napi::Result<Self::Output> {
        let source_text = mem::take(&mut self.source_text);
        Ok(compile_template_impl(&source_text, &self.options))
    }

    fn resolve(&mut self, _: napi::Env, result: Self::Output) -> napi::Result<Self::JsValue> {
        Ok(result)
    }
}

#[napi]
pub fn compile_template(
    source_text: String,
    options: Option<CompileOptions>,
) -> AsyncTask<CompileTask> {
    let options = options.unwrap_or_default();
    AsyncTask::new(CompileTask {
        source_text,
        options,
    })
}

#[napi(object)]
pub struct RenderResult {
    pub success: bool,
    pub content: String,
    pub errors: Vec<CompilerError>,
    pub warnings: Vec<CompilerError>,
}

impl From<layout_compiler::RenderResult> for RenderResult {
    fn from(result: layout_compiler::RenderResult) -> Self {
        Self {
            success: result.success,
            content: result.content,
            errors: CompilerError::from_diagnostics(&result.errors),
            warnings: CompilerError::from_diagnostics(&result.warnings),
        }
    }
}

fn render_failure(message: String) -> RenderResult {
    RenderResult {
        success: false,
        content: String::new(),
        errors: vec![CompilerError::from(&layout_compiler::Diagnostic::error(
            DiagnosticCode::InvalidRenderInput,
            message,
        ))],
        warnings: Vec::new(),
    }
}

/// Decode the JSON inputs shared by both render functions.
fn render_inputs(
    compiled: &str,
    resident_data: &str,
) -> Result<(CompiledTemplate, ResidentData), RenderResult> {
    let template = CompiledTemplate::from_json(compiled)
        .map_err(|error| render_failure(format!("compiled template is not valid: {error}")))?;
    let data = serde_json::from_str(resident_data)
        .map_err(|error| render_failure(format!("resident data is not valid: {error}")))?;
    Ok((template, data))
}

fn renderer(mode: Option<RenderMode>) -> Renderer<'static> {
    let mode = match mode {
        Some(RenderMode::Preview) => layout_compiler::RenderMode::Preview,
        _ => layout_compiler::RenderMode::Production,
    };
    Renderer::new(&REGISTRY, mode)
}

/// Render a whole compiled template against resident data.
#[napi]
pub fn render_template_sync(
    compiled: String,
    resident_data: String,
    #[napi(ts_arg_type = "'production' | 'preview'")] mode: Option<RenderMode>,
) -> RenderResult {
    match render_inputs(&compiled, &resident_data) {
        Ok((template, data)) => renderer(mode).render_document(&template, &data).into(),
        Err(failure) => failure,
    }
}

/// Render a single island, wrapper included, for client-side hydration.
#[napi]
pub fn render_island_sync(
    compiled: String,
    island_id: String,
    resident_data: String,
    #[napi(ts_arg_type = "'production' | 'preview'")] mode: Option<RenderMode>,
) -> RenderResult {
    match render_inputs(&compiled, &resident_data) {
        Ok((template, data)) => renderer(mode)
            .render_island(&template, &island_id, &data)
            .into(),
        Err(failure) => failure,
    }
}

#[napi(object)]
pub struct CssError {
    pub property: String,
    pub error: String,
    /// `"invalid"` or `"dangerous"`.
    #[napi(js_name = "type")]
    pub error_type: String,
}

#[napi(object)]
pub struct CssWarning {
    pub property: String,
    pub message: String,
}

#[napi(object)]
pub struct StyleValidation {
    pub validated_styles: HashMap<String, String>,
    pub errors: Vec<CssError>,
    pub warnings: Vec<CssWarning>,
}

/// Validate a map of CSS property names (camelCase or kebab-case) to values.
#[napi]
pub fn validate_css_sync(styles: HashMap<String, String>) -> StyleValidation {
    let mut entries: Vec<_> = styles.into_iter().collect();
    entries.sort_unstable();
    let report = validate_styles(entries);
    StyleValidation {
        validated_styles: report.validated_styles.into_iter().collect(),
        errors: report
            .errors
            .into_iter()
            .map(|error| CssError {
                property: error.property,
                error: error.error,
                error_type: match error.error_type {
                    CssErrorType::Dangerous => "dangerous",
                    _ => "invalid",
                }
                .to_string(),
            })
            .collect(),
        warnings: report
            .warnings
            .into_iter()
            .map(|warning| CssWarning {
                property: warning.property,
                message: warning.message,
            })
            .collect(),
    }
}

#[napi(object)]
pub struct PropInfo {
    pub name: String,
    #[napi(js_name = "type")]
    pub prop_type: String,
    pub required: bool,
    pub default_value: Option<String>,
}

#[napi(object)]
pub struct ComponentInfo {
    pub name: String,
    pub category: String,
    pub interactive: bool,
    pub accepts_children: bool,
    pub props: Vec<PropInfo>,
}

/// The component catalog, for editors and documentation.
#[napi]
pub fn list_components() -> Vec<ComponentInfo> {
    REGISTRY
        .definitions()
        .into_iter()
        .map(|definition| ComponentInfo {
            name: definition.name().to_string(),
            category: definition.kind.category().as_str().to_string(),
            interactive: definition.kind.is_interactive(),
            accepts_children: definition.relationship.accepts_children,
            props: definition
                .props
                .iter()
                .map(|prop| PropInfo {
                    name: prop.name.to_string(),
                    prop_type: prop.ty.name().to_string(),
                    required: prop.required,
                    default_value: prop.default.map(ToString::to_string),
                })
                .collect(),
        })
        .collect()
}
