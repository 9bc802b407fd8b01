use std::sync::Arc;
use tracing::warn;

/// Receives human-readable strings for non-exceptional conditions: empty
/// filter deletes, depth overflow under the default policy, and schema
/// validation notices raised at construction.
pub trait WarningSink: Send + Sync {
    fn warn(&self, message: &str);
}

/// Default sink: routes warnings through `tracing::warn!` rather than raw
/// stderr writes, matching the rest of the engine's logging.
#[derive(Debug, Default)]
pub struct StderrSink;

impl WarningSink for StderrSink {
    fn warn(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Configuration surface accepted by the engine constructor.
#[derive(Clone)]
pub struct EngineConfig {
    /// Max recursion depth for `check` and phase-1 group traversal.
    pub default_check_depth: u32,
    /// Substring whose last occurrence splits a base object id from a field.
    pub field_separator: String,
    /// At depth overflow, raise `MaxDepthExceeded` instead of returning `false`.
    pub throw_on_max_depth: bool,
    pub warning_sink: Arc<dyn WarningSink>,
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("default_check_depth", &self.default_check_depth)
            .field("field_separator", &self.field_separator)
            .field("throw_on_max_depth", &self.throw_on_max_depth)
            .finish_non_exhaustive()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_check_depth: 10,
            field_separator: "#".to_string(),
            throw_on_max_depth: false,
            warning_sink: Arc::new(StderrSink),
        }
    }
}
