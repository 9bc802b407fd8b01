use crate::adapter::{StorageAdapter, TupleFilter};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::{Action, Object, Relation, Subject};
use crate::schema::Schema;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::debug;

/// Implements `check`'s recursive traversal: direct grants, then group
/// membership, then resource hierarchy, short-circuiting on the first
/// accepting path. Borrows everything it needs for the duration of one
/// top-level call; holds no state of its own between calls.
pub(crate) struct Checker<'a> {
    pub adapter: &'a dyn StorageAdapter,
    pub schema: &'a Schema,
    pub config: &'a EngineConfig,
}

impl<'a> Checker<'a> {
    pub async fn check(
        &self,
        who: Subject,
        action: Action,
        on_what: Object,
    ) -> Result<bool, EngineError> {
        let mut visited = HashSet::new();
        self.check_recursive(who, action, on_what, &mut visited, 0)
            .await
    }

    fn check_recursive<'b>(
        &'b self,
        subject: Subject,
        action: Action,
        object: Object,
        visited: &'b mut HashSet<String>,
        depth: u32,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<bool, EngineError>> + Send + 'b>>
    {
        Box::pin(async move {
            let key = format!("{subject}|{action}|{object}");

            // 1. Cycle guard.
            if visited.contains(&key) {
                debug!("cycle detected, skipping: {subject} {action} {object}");
                return Ok(false);
            }

            // 2. Depth guard.
            if depth > self.config.default_check_depth {
                let message = format!(
                    "max recursion depth {} exceeded checking {subject} {action} {object}",
                    self.config.default_check_depth
                );
                self.config.warning_sink.warn(&message);
                if self.config.throw_on_max_depth {
                    return Err(EngineError::MaxDepthExceeded {
                        subject,
                        action,
                        object,
                        depth,
                    });
                }
                return Ok(false);
            }

            // 3. Mark visited for the remainder of this path.
            visited.insert(key.clone());

            debug!("checking: {subject} {action} {object} at depth {depth}");

            let result = self
                .check_uncached(&subject, &action, &object, visited, depth)
                .await;

            // 9. Leaving this path: allow the node to be revisited by a
            // sibling branch that is not itself a cycle back to here.
            visited.remove(&key);

            result
        })
    }

    async fn check_uncached(
        &self,
        subject: &Subject,
        action: &Action,
        object: &Object,
        visited: &mut HashSet<String>,
        depth: u32,
    ) -> Result<bool, EngineError> {
        // 4. Required relations.
        let relations = self.schema.relations_for_action(action.as_str());
        if relations.is_empty() {
            return Ok(false);
        }

        let now = Utc::now();

        // 5. Target-object enumeration (field fallback): field-level target
        // is tried before the base object.
        let mut targets = vec![object.clone()];
        if let Some(base) = object.base(&self.config.field_separator) {
            targets.push(base);
        }

        // 6. Direct path.
        for target in &targets {
            for relation_name in relations {
                let found = self
                    .adapter
                    .find_tuples(TupleFilter {
                        subject: Some(subject.clone()),
                        relation: Some(Relation::new(relation_name.clone())),
                        object: Some(target.clone()),
                        condition: None,
                    })
                    .await?;
                if found.iter().any(|t| tuple_is_valid(t, now)) {
                    debug!("direct grant found: {subject} {relation_name} {target}");
                    return Ok(true);
                }
            }
        }

        // 7. Group path.
        if let Some(group_relation) = self.schema.group_relation() {
            debug!("checking group membership via '{group_relation}' for {subject}");
            let memberships = self
                .adapter
                .find_tuples(TupleFilter {
                    subject: Some(subject.clone()),
                    relation: Some(Relation::new(group_relation)),
                    object: None,
                    condition: None,
                })
                .await?;
            for membership in memberships {
                if !tuple_is_valid(&membership, now) {
                    continue;
                }
                let group_as_subject = membership.object;
                if self
                    .check_recursive(
                        group_as_subject,
                        action.clone(),
                        object.clone(),
                        visited,
                        depth + 1,
                    )
                    .await?
                {
                    return Ok(true);
                }
            }
        }

        // 8. Hierarchy path.
        if let Some(hierarchy_relation) = self.schema.hierarchy_relation() {
            debug!("checking hierarchy parents via '{hierarchy_relation}' for {object}");
            let parent_links = self
                .adapter
                .find_tuples(TupleFilter {
                    subject: Some(object.clone()),
                    relation: Some(Relation::new(hierarchy_relation)),
                    object: None,
                    condition: None,
                })
                .await?;
            for link in parent_links {
                if !tuple_is_valid(&link, now) {
                    continue;
                }
                let parent = link.object;
                for parent_action in self.schema.propagated_actions(action.as_str()) {
                    if self
                        .check_recursive(
                            subject.clone(),
                            Action::new(parent_action.clone()),
                            parent.clone(),
                            visited,
                            depth + 1,
                        )
                        .await?
                    {
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }
}

fn tuple_is_valid(tuple: &crate::model::Tuple, now: DateTime<Utc>) -> bool {
    tuple.is_valid_at(now)
}
