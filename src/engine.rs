use crate::access::AccessLister;
use crate::adapter::{DeleteFilter, StorageAdapter, TupleFilter};
use crate::check::Checker;
use crate::config::{EngineConfig, StderrSink, WarningSink};
use crate::error::EngineError;
use crate::model::{AccessibleObject, Action, Condition, Object, Relation, Subject, Tuple};
use crate::schema::Schema;
use std::sync::Arc;
use tracing::info;

/// The permission decision engine: holds a schema, a storage adapter
/// handle, and configuration (depth limit, field separator, depth-exceeded
/// policy, warning sink). Construct via [`EngineBuilder`].
pub struct Engine {
    adapter: Arc<dyn StorageAdapter>,
    schema: Arc<Schema>,
    config: EngineConfig,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    fn checker(&self) -> Checker<'_> {
        Checker {
            adapter: self.adapter.as_ref(),
            schema: &self.schema,
            config: &self.config,
        }
    }

    fn lister(&self) -> AccessLister<'_> {
        AccessLister {
            adapter: self.adapter.as_ref(),
            schema: &self.schema,
            config: &self.config,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// `check(who, action, onWhat) -> bool`.
    pub async fn check(
        &self,
        who: Subject,
        action: impl Into<Action>,
        on_what: Object,
    ) -> Result<bool, EngineError> {
        self.checker().check(who, action.into(), on_what).await
    }

    /// Validates `relation` is declared, then writes a single tuple.
    pub async fn allow(
        &self,
        who: Subject,
        relation: impl Into<Relation>,
        on_what: Object,
        when: Option<Condition>,
    ) -> Result<(), EngineError> {
        let relation = relation.into();
        if self.schema.relation_kind(relation.as_str()).is_none() {
            return Err(EngineError::Schema(format!(
                "relation '{relation}' is not declared in the schema"
            )));
        }
        let mut tuple = Tuple::new(who, relation, on_what);
        tuple.condition = when;
        info!("allow: {tuple}");
        self.adapter.write(vec![tuple]).await?;
        Ok(())
    }

    /// Forwards to the adapter's `delete`. If all three filter slots are
    /// empty, returns 0 and emits a warning without touching storage.
    pub async fn disallow_all_matching(&self, filter: DeleteFilter) -> Result<u64, EngineError> {
        if filter.is_empty() {
            self.config
                .warning_sink
                .warn("disallowAllMatching called with an empty filter; refusing to delete all tuples");
            return Ok(0);
        }
        self.adapter.delete(filter).await
    }

    /// Resolves the schema's group relation; fails `SchemaError` if none.
    pub async fn add_member(
        &self,
        member: Subject,
        group: Object,
        when: Option<Condition>,
    ) -> Result<(), EngineError> {
        let group_relation = self.schema.group_relation().ok_or_else(|| {
            EngineError::Schema("schema declares no group relation".to_string())
        })?;
        let mut tuple = Tuple::new(member, Relation::new(group_relation), group);
        tuple.condition = when;
        info!("addMember: {tuple}");
        self.adapter.write(vec![tuple]).await?;
        Ok(())
    }

    /// Resolves the group relation; warns and returns 0 if none.
    pub async fn remove_member(&self, member: Subject, group: Object) -> Result<u64, EngineError> {
        let Some(group_relation) = self.schema.group_relation() else {
            self.config
                .warning_sink
                .warn("removeMember called but schema declares no group relation");
            return Ok(0);
        };
        self.adapter
            .delete(DeleteFilter {
                who: Some(member),
                was: Some(Relation::new(group_relation)),
                on_what: Some(group),
            })
            .await
    }

    /// Symmetric with `addMember`, using the hierarchy relation.
    pub async fn set_parent(
        &self,
        child: Object,
        parent: Object,
        when: Option<Condition>,
    ) -> Result<(), EngineError> {
        let hierarchy_relation = self.schema.hierarchy_relation().ok_or_else(|| {
            EngineError::Schema("schema declares no hierarchy relation".to_string())
        })?;
        let mut tuple = Tuple::new(child, Relation::new(hierarchy_relation), parent);
        tuple.condition = when;
        info!("setParent: {tuple}");
        self.adapter.write(vec![tuple]).await?;
        Ok(())
    }

    /// Symmetric with `removeMember`, using the hierarchy relation.
    pub async fn remove_parent(&self, child: Object, parent: Object) -> Result<u64, EngineError> {
        let Some(hierarchy_relation) = self.schema.hierarchy_relation() else {
            self.config
                .warning_sink
                .warn("removeParent called but schema declares no hierarchy relation");
            return Ok(0);
        };
        self.adapter
            .delete(DeleteFilter {
                who: Some(child),
                was: Some(Relation::new(hierarchy_relation)),
                on_what: Some(parent),
            })
            .await
    }

    /// Forwards to the adapter's `findTuples`, then slices client-side.
    pub async fn list_tuples(
        &self,
        filter: TupleFilter,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<Vec<Tuple>, EngineError> {
        let tuples = self.adapter.find_tuples(filter).await?;
        let offset = offset.unwrap_or(0);
        if offset >= tuples.len() {
            return Ok(Vec::new());
        }
        let mut remaining = tuples;
        let mut sliced = remaining.split_off(offset);
        if let Some(limit) = limit {
            sliced.truncate(limit);
        }
        Ok(sliced)
    }

    /// `listAccessibleObjects({who, ofType, action?, maxDepth?})`.
    pub async fn list_accessible_objects(
        &self,
        who: Subject,
        of_type: impl Into<String>,
        action: Option<Action>,
        max_depth: Option<u32>,
    ) -> Result<Vec<AccessibleObject>, EngineError> {
        self.lister()
            .list_accessible_objects(who, of_type.into(), action, max_depth)
            .await
    }
}

/// Builds an [`Engine`]. Mirrors the constructor shape in the external
/// interface: storage and schema are required; the rest fall back to their
/// documented defaults. Missing storage or schema is a `ConfigurationError`.
#[derive(Default)]
pub struct EngineBuilder {
    storage: Option<Arc<dyn StorageAdapter>>,
    schema: Option<Schema>,
    default_check_depth: Option<u32>,
    field_separator: Option<String>,
    throw_on_max_depth: Option<bool>,
    warning_sink: Option<Arc<dyn WarningSink>>,
}

impl EngineBuilder {
    pub fn storage(mut self, adapter: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(adapter);
        self
    }

    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn default_check_depth(mut self, depth: u32) -> Self {
        self.default_check_depth = Some(depth);
        self
    }

    pub fn field_separator(mut self, separator: impl Into<String>) -> Self {
        self.field_separator = Some(separator.into());
        self
    }

    pub fn throw_on_max_depth(mut self, on: bool) -> Self {
        self.throw_on_max_depth = Some(on);
        self
    }

    pub fn warning_sink(mut self, sink: Arc<dyn WarningSink>) -> Self {
        self.warning_sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Engine, EngineError> {
        let storage = self
            .storage
            .ok_or_else(|| EngineError::Configuration("storage adapter is required".to_string()))?;
        let schema = self
            .schema
            .ok_or_else(|| EngineError::Configuration("schema is required".to_string()))?;

        let config = EngineConfig {
            default_check_depth: self.default_check_depth.unwrap_or(10),
            field_separator: self.field_separator.unwrap_or_else(|| "#".to_string()),
            throw_on_max_depth: self.throw_on_max_depth.unwrap_or(false),
            warning_sink: self.warning_sink.unwrap_or_else(|| Arc::new(StderrSink)),
        };
        schema.validate(config.warning_sink.as_ref());

        Ok(Engine {
            adapter: storage,
            schema: Arc::new(schema),
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::in_memory_adapter;
    use crate::schema::RelationKind;

    fn doc_schema() -> Schema {
        Schema::builder()
            .relation("owner", RelationKind::Direct)
            .relation("viewer", RelationKind::Direct)
            .action("edit", ["owner"])
            .action("view", ["owner", "viewer"])
            .build()
    }

    #[tokio::test]
    async fn builder_rejects_missing_storage() {
        let result = Engine::builder().schema(doc_schema()).build();
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[tokio::test]
    async fn builder_rejects_missing_schema() {
        let result = Engine::builder().storage(in_memory_adapter()).build();
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[tokio::test]
    async fn allow_then_check_round_trips() {
        let engine = Engine::builder()
            .storage(in_memory_adapter())
            .schema(doc_schema())
            .build()
            .unwrap();

        let alice = Subject::new("user", "alice");
        let doc = Object::new("document", "doc1");
        assert!(!engine.check(alice.clone(), "edit", doc.clone()).await.unwrap());

        engine
            .allow(alice.clone(), "owner", doc.clone(), None)
            .await
            .unwrap();
        assert!(engine.check(alice, "edit", doc).await.unwrap());
    }

    #[tokio::test]
    async fn allow_rejects_undeclared_relation() {
        let engine = Engine::builder()
            .storage(in_memory_adapter())
            .schema(doc_schema())
            .build()
            .unwrap();
        let result = engine
            .allow(
                Subject::new("user", "alice"),
                "editor",
                Object::new("document", "doc1"),
                None,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Schema(_))));
    }

    #[tokio::test]
    async fn disallow_all_matching_refuses_empty_filter() {
        let engine = Engine::builder()
            .storage(in_memory_adapter())
            .schema(doc_schema())
            .build()
            .unwrap();
        let deleted = engine
            .disallow_all_matching(DeleteFilter::default())
            .await
            .unwrap();
        assert_eq!(deleted, 0);
    }

    #[tokio::test]
    async fn add_member_fails_without_group_relation() {
        let engine = Engine::builder()
            .storage(in_memory_adapter())
            .schema(doc_schema())
            .build()
            .unwrap();
        let result = engine
            .add_member(
                Subject::new("user", "alice"),
                Object::new("team", "frontend"),
                None,
            )
            .await;
        assert!(matches!(result, Err(EngineError::Schema(_))));
    }

    #[tokio::test]
    async fn list_tuples_applies_limit_and_offset() {
        let engine = Engine::builder()
            .storage(in_memory_adapter())
            .schema(doc_schema())
            .build()
            .unwrap();
        for i in 0..5 {
            engine
                .allow(
                    Subject::new("user", "alice"),
                    "owner",
                    Object::new("document", format!("doc{i}")),
                    None,
                )
                .await
                .unwrap();
        }
        let page = engine
            .list_tuples(TupleFilter::default(), Some(2), Some(1))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
    }
}
