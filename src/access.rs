use crate::adapter::{StorageAdapter, TupleFilter};
use crate::check::Checker;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{Action, AccessibleObject, Object, Relation, Subject};
use crate::schema::Schema;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use indexmap::{IndexMap, IndexSet};
use std::collections::HashSet;

/// Implements `listAccessibleObjects`'s two phases: collect plausible
/// candidate objects breadth-first, then decide each candidate with the
/// same `check` used for direct calls, so the authoritative answer never
/// diverges from what `check` itself would say.
pub(crate) struct AccessLister<'a> {
    pub adapter: &'a dyn StorageAdapter,
    pub schema: &'a Schema,
    pub config: &'a EngineConfig,
}

impl<'a> AccessLister<'a> {
    pub async fn list_accessible_objects(
        &self,
        who: Subject,
        of_type: String,
        action: Option<Action>,
        max_depth: Option<u32>,
    ) -> Result<Vec<AccessibleObject>, EngineError> {
        let max_depth = max_depth.unwrap_or(self.config.default_check_depth);
        let now = Utc::now();

        let child_to_parent = self.build_child_to_parent(now).await?;

        let mut candidates: IndexSet<Object> = IndexSet::new();
        let mut group_visited = HashSet::new();
        self.collect_reachable(&who, &mut candidates, &mut group_visited, 0, max_depth, now)
            .await?;

        if !child_to_parent.is_empty() {
            self.collect_via_hierarchy_propagation(&who, &child_to_parent, &mut candidates)
                .await?;
        }

        let decisions = join_all(candidates.into_iter().filter(|c| c.entity_type == of_type).map(
            |candidate| {
                let parent = child_to_parent.get(&candidate).cloned();
                self.decide(who.clone(), candidate, parent, action.clone())
            },
        ))
        .await;

        let mut results = Vec::with_capacity(decisions.len());
        for decision in decisions {
            if let Some(object) = decision? {
                results.push(object);
            }
        }

        results.sort_by(|a, b| sort_key(&a.object).cmp(&sort_key(&b.object)));
        Ok(results)
    }

    /// All valid hierarchy-relation tuples, as a child -> parent map.
    async fn build_child_to_parent(
        &self,
        now: DateTime<Utc>,
    ) -> Result<IndexMap<Object, Object>, EngineError> {
        let mut map = IndexMap::new();
        let Some(hierarchy_relation) = self.schema.hierarchy_relation() else {
            return Ok(map);
        };
        let links = self
            .adapter
            .find_tuples(TupleFilter {
                subject: None,
                relation: Some(Relation::new(hierarchy_relation)),
                object: None,
                condition: None,
            })
            .await?;
        for link in links {
            if link.is_valid_at(now) {
                map.insert(link.subject, link.object);
            }
        }
        Ok(map)
    }

    /// Phase 1(a)+(b): objects directly reachable from `subject`, plus field
    /// bases, plus the same collected transitively through every group
    /// `subject` (or a group it belongs to) is a member of, bounded by
    /// `max_depth` with a local visited set.
    fn collect_reachable<'b>(
        &'b self,
        subject: &'b Subject,
        candidates: &'b mut IndexSet<Object>,
        visited: &'b mut HashSet<String>,
        depth: u32,
        max_depth: u32,
        now: DateTime<Utc>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), EngineError>> + Send + 'b>>
    {
        Box::pin(async move {
            if depth > max_depth {
                return Ok(());
            }
            let key = subject.to_string();
            if visited.contains(&key) {
                return Ok(());
            }
            visited.insert(key);

            let owned = self
                .adapter
                .find_tuples(TupleFilter {
                    subject: Some(subject.clone()),
                    relation: None,
                    object: None,
                    condition: None,
                })
                .await?;

            for tuple in &owned {
                if !tuple.is_valid_at(now) {
                    continue;
                }
                candidates.insert(tuple.object.clone());
                if let Some(base) = tuple.object.base(&self.config.field_separator) {
                    candidates.insert(base);
                }
            }

            if let Some(group_relation) = self.schema.group_relation() {
                for tuple in &owned {
                    if tuple.relation.as_str() != group_relation || !tuple.is_valid_at(now) {
                        continue;
                    }
                    let group_as_subject = tuple.object.clone();
                    self.collect_reachable(
                        &group_as_subject,
                        candidates,
                        visited,
                        depth + 1,
                        max_depth,
                        now,
                    )
                    .await?;
                }
            }

            Ok(())
        })
    }

    /// Phase 1(c): for every distinct parent object, if `who` can reach it
    /// via any action named in `hierarchyPropagation`, every child pointing
    /// at that parent becomes a candidate too.
    async fn collect_via_hierarchy_propagation(
        &self,
        who: &Subject,
        child_to_parent: &IndexMap<Object, Object>,
        candidates: &mut IndexSet<Object>,
    ) -> Result<(), EngineError> {
        let propagating_actions = self.schema.all_propagated_actions();
        if propagating_actions.is_empty() {
            return Ok(());
        }

        let distinct_parents: IndexSet<Object> = child_to_parent.values().cloned().collect();
        let checker = Checker {
            adapter: self.adapter,
            schema: self.schema,
            config: self.config,
        };

        for parent in &distinct_parents {
            let mut reachable = false;
            for action_name in &propagating_actions {
                if checker
                    .check(who.clone(), Action::new(action_name.clone()), parent.clone())
                    .await?
                {
                    reachable = true;
                    break;
                }
            }
            if reachable {
                for (child, p) in child_to_parent {
                    if p == parent {
                        candidates.insert(child.clone());
                    }
                }
            }
        }
        Ok(())
    }

    /// Phase 2: decide one candidate with a fresh `check` per action.
    async fn decide(
        &self,
        who: Subject,
        candidate: Object,
        parent: Option<Object>,
        action_filter: Option<Action>,
    ) -> Result<Option<AccessibleObject>, EngineError> {
        let checker = Checker {
            adapter: self.adapter,
            schema: self.schema,
            config: self.config,
        };

        let mut allowed_actions = Vec::new();
        for action_name in self.schema.actions() {
            if checker
                .check(who.clone(), Action::new(action_name), candidate.clone())
                .await?
            {
                allowed_actions.push(action_name.to_string());
            }
        }

        if allowed_actions.is_empty() {
            return Ok(None);
        }
        if let Some(ref required) = action_filter {
            if !allowed_actions.iter().any(|a| a == required.as_str()) {
                return Ok(None);
            }
        }

        Ok(Some(AccessibleObject {
            object: candidate,
            allowed_actions,
            parent,
        }))
    }
}

fn sort_key(object: &Object) -> String {
    format!("{}:{}", object.entity_type, object.id)
}
