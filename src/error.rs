use crate::model::{Action, Object, Subject};
use thiserror::Error;

/// The engine's closed error taxonomy. Missing data never raises — absence
/// of a tuple is an expected `false` from `check`, not an error. Warnings
/// (empty-filter deletes, depth overflow under the default policy, schema
/// validation notices) are delivered through the configured `WarningSink`,
/// not through this type.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Missing required constructor argument.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Write-time schema violation: an undeclared relation, or an operation
    /// that requires a group/hierarchy relation the schema does not declare.
    #[error("schema error: {0}")]
    Schema(String),

    /// Adapter failure wrapped by the engine, original cause preserved.
    #[error("storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Raised only when `throw_on_max_depth` is enabled; otherwise the
    /// condition is a logged warning and the path yields `false`.
    #[error("max recursion depth exceeded checking {subject} {action} {object} at depth {depth}")]
    MaxDepthExceeded {
        subject: Subject,
        action: Action,
        object: Object,
        depth: u32,
    },
}

impl EngineError {
    pub fn storage(cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage(Box::new(cause))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
