use crate::config::WarningSink;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// How a relation participates in traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    /// The tuple itself grants the action if the action names this relation.
    Direct,
    /// Member tuples form a transitive subject-of relation; the group's
    /// permissions flow to members.
    Group,
    /// Child-of relation between objects; some parent actions propagate
    /// into some child actions per `hierarchyPropagation`.
    Hierarchy,
}

/// A validated declarative authorization model: which relations exist and
/// what kind they are, which relations satisfy which actions, and which
/// parent actions propagate into which child actions. Immutable after
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    relations: IndexMap<String, RelationKind>,
    action_to_relations: IndexMap<String, Vec<String>>,
    hierarchy_propagation: IndexMap<String, Vec<String>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn new(
        relations: Vec<(String, RelationKind)>,
        action_to_relations: Vec<(String, Vec<String>)>,
        hierarchy_propagation: Vec<(String, Vec<String>)>,
    ) -> Self {
        Self {
            relations: relations.into_iter().collect(),
            action_to_relations: action_to_relations.into_iter().collect(),
            hierarchy_propagation: hierarchy_propagation.into_iter().collect(),
        }
    }

    pub fn relation_kind(&self, name: &str) -> Option<RelationKind> {
        self.relations.get(name).copied()
    }

    /// Ordered list of relations that grant `action`; empty if the action is
    /// absent from the map (never granted by any direct relation).
    pub fn relations_for_action(&self, action: &str) -> &[String] {
        self.action_to_relations
            .get(action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Ordered list of parent actions that propagate into `child_action`.
    pub fn propagated_actions(&self, child_action: &str) -> &[String] {
        self.hierarchy_propagation
            .get(child_action)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.action_to_relations.keys().map(String::as_str)
    }

    /// The first-declared relation of kind `Group`, if any.
    pub fn group_relation(&self) -> Option<&str> {
        self.relations
            .iter()
            .find(|(_, kind)| **kind == RelationKind::Group)
            .map(|(name, _)| name.as_str())
    }

    /// The first-declared relation of kind `Hierarchy`, if any.
    pub fn hierarchy_relation(&self) -> Option<&str> {
        self.relations
            .iter()
            .find(|(_, kind)| **kind == RelationKind::Hierarchy)
            .map(|(name, _)| name.as_str())
    }

    /// The union of every action named anywhere in `hierarchyPropagation`'s
    /// value lists — the set of "propagating actions" `listAccessibleObjects`
    /// phase 1(c) checks against each distinct parent.
    pub fn all_propagated_actions(&self) -> IndexSet<String> {
        self.hierarchy_propagation
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// Emits warnings (never errors) for references to undeclared relations
    /// or actions, and for multiple `group`/`hierarchy` declarations. Schema
    /// construction itself never fails validation; `check` MUST NOT refuse
    /// to run against a schema that failed this pass.
    pub fn validate(&self, sink: &dyn WarningSink) {
        for (action, relations) in &self.action_to_relations {
            for relation in relations {
                if !self.relations.contains_key(relation) {
                    sink.warn(&format!(
                        "action '{action}' references undeclared relation '{relation}'"
                    ));
                }
            }
        }

        for (child_action, parent_actions) in &self.hierarchy_propagation {
            if !self.action_to_relations.contains_key(child_action) {
                sink.warn(&format!(
                    "hierarchyPropagation references undeclared action '{child_action}'"
                ));
            }
            for parent_action in parent_actions {
                if !self.action_to_relations.contains_key(parent_action) {
                    sink.warn(&format!(
                        "hierarchyPropagation['{child_action}'] references undeclared action '{parent_action}'"
                    ));
                }
            }
        }

        let group_count = self
            .relations
            .values()
            .filter(|k| **k == RelationKind::Group)
            .count();
        if group_count > 1 {
            sink.warn(&format!(
                "schema declares {group_count} group relations; only the first-declared is consulted"
            ));
        }
        let hierarchy_count = self
            .relations
            .values()
            .filter(|k| **k == RelationKind::Hierarchy)
            .count();
        if hierarchy_count > 1 {
            sink.warn(&format!(
                "schema declares {hierarchy_count} hierarchy relations; only the first-declared is consulted"
            ));
        }
    }
}

/// Builds a `Schema` from relation, action, and propagation declarations in
/// the order they're added — declaration order is load-bearing for
/// first-declared-wins group/hierarchy resolution.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    relations: Vec<(String, RelationKind)>,
    action_to_relations: Vec<(String, Vec<String>)>,
    hierarchy_propagation: Vec<(String, Vec<String>)>,
}

impl SchemaBuilder {
    pub fn relation(mut self, name: impl Into<String>, kind: RelationKind) -> Self {
        self.relations.push((name.into(), kind));
        self
    }

    pub fn action<I, S>(mut self, name: impl Into<String>, relations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action_to_relations
            .push((name.into(), relations.into_iter().map(Into::into).collect()));
        self
    }

    pub fn propagate<I, S>(mut self, child_action: impl Into<String>, parent_actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hierarchy_propagation.push((
            child_action.into(),
            parent_actions.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn build(self) -> Schema {
        Schema::new(
            self.relations,
            self.action_to_relations,
            self.hierarchy_propagation,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StderrSink;

    fn doc_schema() -> Schema {
        Schema::builder()
            .relation("owner", RelationKind::Direct)
            .relation("viewer", RelationKind::Direct)
            .relation("member", RelationKind::Group)
            .relation("parent", RelationKind::Hierarchy)
            .action("edit", ["owner"])
            .action("view", ["owner", "viewer"])
            .propagate("view", ["view"])
            .propagate("edit", ["edit"])
            .build()
    }

    #[test]
    fn resolves_first_declared_group_and_hierarchy() {
        let schema = doc_schema();
        assert_eq!(schema.group_relation(), Some("member"));
        assert_eq!(schema.hierarchy_relation(), Some("parent"));
    }

    #[test]
    fn action_absent_from_map_has_no_required_relations() {
        let schema = doc_schema();
        assert!(schema.relations_for_action("delete").is_empty());
    }

    #[test]
    fn validate_warns_on_undeclared_relation() {
        let schema = Schema::builder()
            .relation("owner", RelationKind::Direct)
            .action("edit", ["owner", "editor"])
            .build();
        schema.validate(&StderrSink);
    }

    #[test]
    fn validate_does_not_fail_with_multiple_group_relations() {
        let schema = Schema::builder()
            .relation("member", RelationKind::Group)
            .relation("collaborator", RelationKind::Group)
            .build();
        schema.validate(&StderrSink);
        assert_eq!(schema.group_relation(), Some("member"));
    }
}
