use crate::error::EngineError;
use crate::model::{Condition, Object, Relation, Subject, Tuple};
use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexSet;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Any subset of subject / relation / object / condition. `condition` is
/// tri-state: absent means "wildcard", `Some(None)` means "condition-free
/// tuples only", `Some(Some(c))` means "exact condition match".
#[derive(Debug, Clone, Default)]
pub struct TupleFilter {
    pub subject: Option<Subject>,
    pub relation: Option<Relation>,
    pub object: Option<Object>,
    pub condition: Option<Option<Condition>>,
}

/// Filter for `delete`. `on_what`, when set, matches a tuple whose *either*
/// the object slot or the subject slot equals it — this is what lets
/// removing a resource clean up the hierarchy back-references that name it
/// as a parent.
#[derive(Debug, Clone, Default)]
pub struct DeleteFilter {
    pub who: Option<Subject>,
    pub was: Option<Relation>,
    pub on_what: Option<Object>,
}

impl DeleteFilter {
    pub fn is_empty(&self) -> bool {
        self.who.is_none() && self.was.is_none() && self.on_what.is_none()
    }
}

/// The five operations the engine consumes from durable storage. All async;
/// the engine assumes no transactionality beyond per-call atomicity and
/// never mutates returned structures. Implementers whose backend can fail
/// independently of the engine should map their error into
/// `EngineError::storage`, preserving the original as `source`.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Writes tuples, returning each with an adapter-assigned id, in input
    /// order.
    async fn write(&self, tuples: Vec<Tuple>) -> Result<Vec<Tuple>, EngineError>;

    /// Deletes tuples matching `filter`, returning the count deleted. An
    /// empty filter MUST delete nothing and log a warning.
    async fn delete(&self, filter: DeleteFilter) -> Result<u64, EngineError>;

    /// Tuples matching any subset of `filter`'s fields.
    async fn find_tuples(&self, filter: TupleFilter) -> Result<Vec<Tuple>, EngineError>;

    /// Subjects with `relation` on `object`, deduplicated by `(type, id)`.
    async fn find_subjects(
        &self,
        object: Object,
        relation: Relation,
        subject_type: Option<String>,
    ) -> Result<Vec<Subject>, EngineError>;

    /// Objects with `relation` from `subject`, deduplicated by `(type, id)`.
    async fn find_objects(
        &self,
        subject: Subject,
        relation: Relation,
        object_type: Option<String>,
    ) -> Result<Vec<Object>, EngineError>;
}

/// In-memory reference adapter, bundled so the engine is self-contained and
/// testable without an external store. Keyed by `(subject, relation, object)`
/// so writes are idempotent on that key, per the tuple multiset semantics in
/// the data model.
#[derive(Default)]
pub struct InMemoryAdapter {
    tuples: DashMap<String, Tuple>,
}

impl InMemoryAdapter {
    pub fn new() -> Self {
        Self {
            tuples: DashMap::new(),
        }
    }

    fn key(subject: &Subject, relation: &Relation, object: &Object) -> String {
        format!("{subject}|{relation}|{object}")
    }

    fn matches(tuple: &Tuple, filter: &TupleFilter) -> bool {
        if let Some(ref s) = filter.subject {
            if &tuple.subject != s {
                return false;
            }
        }
        if let Some(ref r) = filter.relation {
            if &tuple.relation != r {
                return false;
            }
        }
        if let Some(ref o) = filter.object {
            if &tuple.object != o {
                return false;
            }
        }
        match &filter.condition {
            None => {}
            Some(None) => {
                if tuple.condition.is_some() {
                    return false;
                }
            }
            Some(Some(expected)) => {
                if tuple.condition.as_ref() != Some(expected) {
                    return false;
                }
            }
        }
        true
    }
}

#[async_trait]
impl StorageAdapter for InMemoryAdapter {
    async fn write(&self, tuples: Vec<Tuple>) -> Result<Vec<Tuple>, EngineError> {
        let mut stored = Vec::with_capacity(tuples.len());
        for mut tuple in tuples {
            let key = Self::key(&tuple.subject, &tuple.relation, &tuple.object);
            tuple.id = Some(Uuid::new_v4().to_string());
            self.tuples.insert(key, tuple.clone());
            stored.push(tuple);
        }
        Ok(stored)
    }

    async fn delete(&self, filter: DeleteFilter) -> Result<u64, EngineError> {
        if filter.is_empty() {
            warn!("delete called with an empty filter; refusing to delete all tuples");
            return Ok(0);
        }

        let mut to_remove = Vec::new();
        for entry in self.tuples.iter() {
            let tuple = entry.value();
            if let Some(ref who) = filter.who {
                if &tuple.subject != who {
                    continue;
                }
            }
            if let Some(ref was) = filter.was {
                if &tuple.relation != was {
                    continue;
                }
            }
            if let Some(ref on_what) = filter.on_what {
                if &tuple.object != on_what && &tuple.subject != on_what {
                    continue;
                }
            }
            to_remove.push(entry.key().clone());
        }

        let count = to_remove.len() as u64;
        for key in to_remove {
            self.tuples.remove(&key);
        }
        Ok(count)
    }

    async fn find_tuples(&self, filter: TupleFilter) -> Result<Vec<Tuple>, EngineError> {
        Ok(self
            .tuples
            .iter()
            .filter(|entry| Self::matches(entry.value(), &filter))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn find_subjects(
        &self,
        object: Object,
        relation: Relation,
        subject_type: Option<String>,
    ) -> Result<Vec<Subject>, EngineError> {
        let mut seen = IndexSet::new();
        for entry in self.tuples.iter() {
            let tuple = entry.value();
            if tuple.object != object || tuple.relation != relation {
                continue;
            }
            if let Some(ref want_type) = subject_type {
                if &tuple.subject.entity_type != want_type {
                    continue;
                }
            }
            seen.insert(tuple.subject.clone());
        }
        Ok(seen.into_iter().collect())
    }

    async fn find_objects(
        &self,
        subject: Subject,
        relation: Relation,
        object_type: Option<String>,
    ) -> Result<Vec<Object>, EngineError> {
        let mut seen = IndexSet::new();
        for entry in self.tuples.iter() {
            let tuple = entry.value();
            if tuple.subject != subject || tuple.relation != relation {
                continue;
            }
            if let Some(ref want_type) = object_type {
                if &tuple.object.entity_type != want_type {
                    continue;
                }
            }
            seen.insert(tuple.object.clone());
        }
        Ok(seen.into_iter().collect())
    }
}

pub fn in_memory_adapter() -> Arc<dyn StorageAdapter> {
    Arc::new(InMemoryAdapter::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Relation as R, Tuple};

    #[tokio::test]
    async fn write_then_find_round_trips() {
        let adapter = InMemoryAdapter::new();
        let tuple = Tuple::new(
            Subject::new("user", "alice"),
            R::new("editor"),
            Object::new("document", "doc1"),
        );
        adapter.write(vec![tuple.clone()]).await.unwrap();

        let found = adapter
            .find_tuples(TupleFilter {
                subject: Some(Subject::new("user", "alice")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].id.is_some());
    }

    #[tokio::test]
    async fn empty_delete_filter_deletes_nothing() {
        let adapter = InMemoryAdapter::new();
        adapter
            .write(vec![Tuple::new(
                Subject::new("user", "alice"),
                R::new("editor"),
                Object::new("document", "doc1"),
            )])
            .await
            .unwrap();

        let deleted = adapter.delete(DeleteFilter::default()).await.unwrap();
        assert_eq!(deleted, 0);
        let remaining = adapter.find_tuples(TupleFilter::default()).await.unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn delete_on_what_matches_either_side() {
        let adapter = InMemoryAdapter::new();
        adapter
            .write(vec![Tuple::new(
                Object::new("document", "doc1"),
                R::new("parent"),
                Object::new("folder", "f1"),
            )])
            .await
            .unwrap();

        let deleted = adapter
            .delete(DeleteFilter {
                on_what: Some(Object::new("folder", "f1")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn find_subjects_deduplicates() {
        let adapter = InMemoryAdapter::new();
        let tuple = Tuple::new(
            Subject::new("user", "alice"),
            R::new("viewer"),
            Object::new("document", "doc1"),
        );
        adapter.write(vec![tuple.clone(), tuple]).await.unwrap();

        let subjects = adapter
            .find_subjects(Object::new("document", "doc1"), R::new("viewer"), None)
            .await
            .unwrap();
        assert_eq!(subjects.len(), 1);
    }
}
