//! Preview caching.
//!
//! [`PreviewCache`] is a bounded TTL/LRU map owned by whoever needs it.
//! Nothing here is global: a host that wants a shared cache wraps one in
//! its own lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::islands::template_hash;
use crate::options::CompileOptions;
use crate::pipeline::{CompileResult, compile};
use crate::registry::ComponentRegistry;
use crate::render::{RenderMode, RenderOptions, RenderResult, Renderer, ResidentData};

pub const DEFAULT_CAPACITY: usize = 64;
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
    /// Minimum time between two sweeps of expired entries.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expires_at: Instant,
    last_used: u64,
}

/// A string-keyed cache with per-entry expiry and least-recently-used
/// eviction at capacity.
///
/// Every operation has an `_at` form taking the current time.
#[derive(Debug)]
pub struct PreviewCache<V> {
    config: CacheConfig,
    entries: FxHashMap<String, Entry<V>>,
    clock: u64,
    last_sweep: Option<Instant>,
}

impl<V: Clone> PreviewCache<V> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: FxHashMap::default(),
            clock: 0,
            last_sweep: None,
        }
    }

    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<V> {
        self.maybe_sweep(now);
        let entry = self.entries.get_mut(key)?;
        if entry.expires_at <= now {
            self.entries.remove(key);
            return None;
        }
        self.clock += 1;
        entry.last_used = self.clock;
        Some(entry.value.clone())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub fn insert_at(&mut self, key: impl Into<String>, value: V, now: Instant) {
        if self.config.capacity == 0 {
            return;
        }
        self.maybe_sweep(now);
        let key = key.into();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.capacity {
            self.evict_least_recent();
        }
        self.clock += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.config.ttl,
                last_used: self.clock,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop expired entries now, regardless of the sweep interval.
    /// Returns how many were removed.
    pub fn sweep_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.last_sweep = Some(now);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = self.entries.len(), "swept preview cache");
        }
        removed
    }

    fn maybe_sweep(&mut self, now: Instant) {
        let due = self
            .last_sweep
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.sweep_interval);
        if due {
            self.sweep_at(now);
        }
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_used)
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            tracing::trace!(key = %key, "evicting preview cache entry");
            self.entries.remove(&key);
        }
    }
}

#[derive(Debug)]
struct CachedCompile {
    source: Box<str>,
    result: Arc<CompileResult>,
}

/// Repeated previews of one author's template.
///
/// Compiles are cached by template hash, so re-rendering unchanged markup
/// against new data skips the compile.
#[derive(Debug)]
pub struct PreviewSession<'r> {
    registry: &'r ComponentRegistry,
    options: CompileOptions,
    render_options: RenderOptions,
    cache: PreviewCache<Arc<CachedCompile>>,
}

impl<'r> PreviewSession<'r> {
    pub fn new(registry: &'r ComponentRegistry, options: CompileOptions, config: CacheConfig) -> Self {
        Self {
            registry,
            options,
            render_options: RenderOptions::new().with_mode(RenderMode::Preview),
            cache: PreviewCache::new(config),
        }
    }

    #[must_use]
    pub fn with_render_options(mut self, options: RenderOptions) -> Self {
        self.render_options = options.with_mode(RenderMode::Preview);
        self
    }

    pub fn cached_templates(&self) -> usize {
        self.cache.len()
    }

    pub fn compile(&mut self, source: &str) -> Arc<CompileResult> {
        self.compile_at(source, Instant::now())
    }

    pub fn compile_at(&mut self, source: &str, now: Instant) -> Arc<CompileResult> {
        let key = template_hash(source);
        if let Some(cached) = self.cache.get_at(&key, now)
            && *cached.source == *source
        {
            tracing::trace!(hash = %key, "preview cache hit");
            return Arc::clone(&cached.result);
        }
        let result = Arc::new(compile(source, self.registry, &self.options));
        self.cache.insert_at(
            key,
            Arc::new(CachedCompile {
                source: source.into(),
                result: Arc::clone(&result),
            }),
            now,
        );
        result
    }

    /// Compile (or reuse) `source` and render it in preview mode.
    ///
    /// A failed compile yields a failed render carrying the compile errors.
    pub fn render(&mut self, source: &str, data: &ResidentData) -> RenderResult {
        self.render_at(source, data, Instant::now())
    }

    pub fn render_at(&mut self, source: &str, data: &ResidentData, now: Instant) -> RenderResult {
        let result = self.compile_at(source, now);
        match &result.compiled {
            Some(compiled) => {
                let mut rendered =
                    Renderer::with_options(self.registry, self.render_options.clone())
                        .render_document(compiled, data);
                let mut warnings = result.warnings.clone();
                warnings.append(&mut rendered.warnings);
                rendered.warnings = warnings;
                rendered
            }
            None => RenderResult {
                success: false,
                content: String::new(),
                errors: result.errors.clone(),
                warnings: result.warnings.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize) -> CacheConfig {
        CacheConfig {
            capacity,
            ttl: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_expiry() {
        let start = Instant::now();
        let mut cache = PreviewCache::new(config(4));
        cache.insert_at("a", 1, start);
        assert_eq!(cache.get_at("a", start + Duration::from_secs(9)), Some(1));
        assert_eq!(cache.get_at("a", start + Duration::from_secs(10)), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let now = Instant::now();
        let mut cache = PreviewCache::new(config(2));
        cache.insert_at("a", 1, now);
        cache.insert_at("b", 2, now);
        assert_eq!(cache.get_at("a", now), Some(1));
        cache.insert_at("c", 3, now);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("b", now), None);
        assert_eq!(cache.get_at("a", now), Some(1));
        assert_eq!(cache.get_at("c", now), Some(3));
    }

    #[test]
    fn test_replacing_a_key_does_not_evict() {
        let now = Instant::now();
        let mut cache = PreviewCache::new(config(2));
        cache.insert_at("a", 1, now);
        cache.insert_at("b", 2, now);
        cache.insert_at("a", 10, now);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("a", now), Some(10));
    }

    #[test]
    fn test_sweep_respects_interval() {
        let start = Instant::now();
        let mut cache = PreviewCache::new(CacheConfig {
            capacity: 8,
            ttl: Duration::from_secs(1),
            sweep_interval: Duration::from_secs(60),
        });
        cache.insert_at("a", 1, start);
        cache.insert_at("b", 2, start + Duration::from_secs(2));
        // The first insert swept; the next sweep is not due yet.
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.sweep_at(start + Duration::from_secs(2)), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_zero_capacity_stores_nothing() {
        let now = Instant::now();
        let mut cache = PreviewCache::new(config(0));
        cache.insert_at("a", 1, now);
        assert_eq!(cache.get_at("a", now), None);
    }

    #[test]
    fn test_session_reuses_compiles() {
        let registry = ComponentRegistry::standard();
        let mut session =
            PreviewSession::new(&registry, CompileOptions::new(), CacheConfig::default());
        let now = Instant::now();
        let first = session.compile_at("<p>{owner.displayName}</p>", now);
        let second = session.compile_at("<p>{owner.displayName}</p>", now);
        assert!(Arc::ptr_eq(&first, &second));
        let other = session.compile_at("<p>other</p>", now);
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(session.cached_templates(), 2);
    }

    #[test]
    fn test_session_render_reports_compile_errors() {
        let registry = ComponentRegistry::standard();
        let mut session =
            PreviewSession::new(&registry, CompileOptions::new(), CacheConfig::default());
        let result = session.render("<OnClick>", &ResidentData::default());
        assert!(!result.success);
        assert_eq!(
            result.errors[0].code,
            crate::diagnostic::DiagnosticCode::MalformedMarkup
        );
    }

    #[test]
    fn test_session_renders_in_preview_mode() {
        let registry = ComponentRegistry::standard();
        let mut session =
            PreviewSession::new(&registry, CompileOptions::new(), CacheConfig::default());
        let result = session.render("<p>{owner.nope}</p>", &ResidentData::default());
        assert!(result.success);
        assert!(result.content.contains("binding-unresolved"));
        assert!(!result.warnings.is_empty());
    }
}
