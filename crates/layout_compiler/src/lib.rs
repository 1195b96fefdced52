//! Layout Compiler
//!
//! Compiles user-authored profile layout templates into static HTML with
//! interactive islands, and renders compiled templates against per-profile
//! resident data.
//!
//! ## Pipeline
//!
//! ```text
//! markup ─▶ parser (pre-scan, html5ever, sanitizer) ─▶ Ast
//!        ─▶ validator (limits, props, containment)
//!        ─▶ island detector ─▶ skeleton + islands
//!        ─▶ static printer ─▶ CompiledTemplate
//! ```
//!
//! [`compile`] runs the whole pipeline under a wall-clock budget and reports
//! every failure as a [`Diagnostic`]. [`Renderer`] turns a
//! [`CompiledTemplate`] into final HTML, either for a full page or for one
//! island at a time. [`css::validate_styles`] checks author style maps.
//!
//! ## Example
//!
//! ```
//! use layout_compiler::{CompileOptions, ComponentRegistry, RenderMode, Renderer, ResidentData, compile};
//!
//! let registry = ComponentRegistry::standard();
//! let result = compile("<CenteredBox><DisplayName/></CenteredBox>", &registry, &CompileOptions::new());
//! assert!(result.success);
//!
//! let mut data = ResidentData::default();
//! data.owner.display_name = "Ada".to_string();
//! let compiled = result.compiled.unwrap();
//! let page = Renderer::new(&registry, RenderMode::Production).render_document(&compiled, &data);
//! assert!(page.content.contains("Ada"));
//! ```

pub mod ast;
pub mod binding;
pub mod budget;
pub mod cache;
pub mod css;
pub mod diagnostic;
pub mod islands;
mod options;
pub mod parser;
pub mod pipeline;
pub mod printer;
pub mod registry;
pub mod render;
pub mod validator;

pub use ast::{Ast, Node, NodeId, NodeKind};
pub use budget::{BudgetExceeded, Deadline};
pub use cache::{CacheConfig, PreviewCache, PreviewSession};
pub use diagnostic::{Diagnostic, DiagnosticCode, DiagnosticLabel, DiagnosticSeverity};
pub use islands::{Island, IslandPartition, detect_islands, reconstruct};
pub use options::{CompileOptions, DEFAULT_TIME_BUDGET, Dialect, Limits};
pub use pipeline::{
    CompileFailure, CompileResult, CompileStats, CompiledTemplate, IntegrityError, Stage, compile,
};
pub use registry::{ComponentKind, ComponentRegistry};
pub use render::{
    HydratedIsland, HydrationBatch, RenderMode, RenderOptions, RenderResult, Renderer,
    ResidentData,
};
pub use validator::{ValidationResult, validate};
