//! A relationship-based authorization engine in the style of Google
//! Zanzibar, embedded as a library rather than run as a separate service.
//! Answers, for an `(actor, action, resource)` triple, whether the actor is
//! permitted to perform the action, given a body of relationship tuples and
//! a declarative schema mapping actions onto relations.
//!
//! ```no_run
//! use std::sync::Arc;
//! use zanzibar_engine::{Engine, Object, RelationKind, Schema, Subject};
//!
//! # async fn example() -> Result<(), zanzibar_engine::EngineError> {
//! let schema = Schema::builder()
//!     .relation("owner", RelationKind::Direct)
//!     .relation("viewer", RelationKind::Direct)
//!     .action("edit", ["owner"])
//!     .action("view", ["owner", "viewer"])
//!     .build();
//!
//! let engine = Engine::builder()
//!     .storage(zanzibar_engine::in_memory_adapter())
//!     .schema(schema)
//!     .build()?;
//!
//! let alice = Subject::new("user", "alice");
//! let doc = Object::new("document", "doc1");
//! engine.allow(alice.clone(), "owner", doc.clone(), None).await?;
//! assert!(engine.check(alice, "edit", doc).await?);
//! # Ok(())
//! # }
//! ```

mod access;
mod adapter;
mod check;
mod config;
mod engine;
mod error;
mod model;
mod schema;

pub use adapter::{in_memory_adapter, DeleteFilter, InMemoryAdapter, StorageAdapter, TupleFilter};
pub use config::{EngineConfig, StderrSink, WarningSink};
pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result};
pub use model::{AccessibleObject, Action, Condition, Entity, Object, Relation, Subject, Tuple};
pub use schema::{RelationKind, Schema, SchemaBuilder};
