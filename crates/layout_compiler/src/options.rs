//! Options for template compilation and rendering.
//!
//! Defaults match the limits enforced for every user profile layout; callers
//! may only tighten them (e.g. a stricter budget for preview requests).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Maximum template size in UTF-8 bytes.
pub const MAX_INPUT_BYTES: usize = 64 * 1024;
/// Maximum number of nodes (elements and text) in a template.
pub const MAX_NODES: usize = 200;
/// Maximum element nesting depth.
pub const MAX_DEPTH: usize = 20;
/// Maximum number of registered-component occurrences.
pub const MAX_COMPONENTS: usize = 50;
/// Default wall-clock budget for a single compile call.
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_millis(250);

/// Markup dialect accepted by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dialect {
    /// Components are written as custom tags: `<OnClick>...</OnClick>`.
    #[default]
    CustomTags,
    /// Components are written as plain elements carrying
    /// `data-component="OnClick"`.
    DataAttributes,
}

/// Structural limits checked by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub max_input_bytes: usize,
    pub max_nodes: usize,
    pub max_depth: usize,
    pub max_components: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_bytes: MAX_INPUT_BYTES,
            max_nodes: MAX_NODES,
            max_depth: MAX_DEPTH,
            max_components: MAX_COMPONENTS,
        }
    }
}

impl Limits {
    /// Hard node ceiling for tree construction. Past this point the parser
    /// stops building the arena instead of waiting for the validator.
    pub(crate) fn node_ceiling(&self) -> usize {
        self.max_nodes.saturating_mul(10).max(64)
    }

    /// Hard depth ceiling for tree construction.
    pub(crate) fn depth_ceiling(&self) -> usize {
        self.max_depth.saturating_mul(4).clamp(64, 256)
    }
}

/// Options for a single compile call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    /// Markup dialect of the source.
    pub dialect: Dialect,

    /// Structural limits. Values larger than the defaults are clamped.
    pub limits: Limits,

    /// Wall-clock budget for the whole pipeline. `None` disables the check
    /// (only useful in benchmarks).
    pub time_budget: Option<Duration>,

    /// Prefix for generated island ids. Defaults to `"island"`.
    pub island_prefix: Option<String>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            limits: Limits::default(),
            time_budget: Some(DEFAULT_TIME_BUDGET),
            island_prefix: None,
        }
    }
}

impl CompileOptions {
    /// Create new options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the markup dialect.
    #[must_use]
    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    /// Set structural limits. Each limit is clamped to its default maximum.
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        let defaults = Limits::default();
        self.limits = Limits {
            max_input_bytes: limits.max_input_bytes.min(defaults.max_input_bytes),
            max_nodes: limits.max_nodes.min(defaults.max_nodes),
            max_depth: limits.max_depth.min(defaults.max_depth),
            max_components: limits.max_components.min(defaults.max_components),
        };
        self
    }

    /// Set the wall-clock budget for the pipeline.
    #[must_use]
    pub fn with_time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Disable the wall-clock budget.
    #[must_use]
    pub fn without_time_budget(mut self) -> Self {
        self.time_budget = None;
        self
    }

    /// Set the prefix used for island ids.
    #[must_use]
    pub fn with_island_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.island_prefix = Some(prefix.into());
        self
    }

    /// Get the island id prefix, with default fallback.
    pub fn get_island_prefix(&self) -> &str {
        self.island_prefix.as_deref().unwrap_or("island")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_clamped_to_defaults() {
        let options = CompileOptions::new().with_limits(Limits {
            max_input_bytes: 1 << 30,
            max_nodes: 50,
            max_depth: 500,
            max_components: 10,
        });
        assert_eq!(options.limits.max_input_bytes, MAX_INPUT_BYTES);
        assert_eq!(options.limits.max_nodes, 50);
        assert_eq!(options.limits.max_depth, MAX_DEPTH);
        assert_eq!(options.limits.max_components, 10);
    }

    #[test]
    fn test_island_prefix_default() {
        assert_eq!(CompileOptions::new().get_island_prefix(), "island");
        assert_eq!(
            CompileOptions::new()
                .with_island_prefix("tpl")
                .get_island_prefix(),
            "tpl"
        );
    }
}
