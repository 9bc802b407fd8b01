use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `(type, id)` pair. Identifies an actor when used as a tuple's subject,
/// or a resource when used as a tuple's object. A subject slot may also hold
/// an `Entity` that is itself a resource elsewhere (a group or a child in a
/// hierarchy) — see the module docs on polymorphic subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    pub entity_type: String,
    pub id: String,
}

impl Entity {
    pub fn new(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// The base form of this entity's id, if the id carries a field suffix.
    /// Uses the *last* occurrence of `separator`; returns `None` when the
    /// separator does not occur, i.e. the id has no field suffix to strip.
    pub fn base(&self, separator: &str) -> Option<Entity> {
        if separator.is_empty() {
            return None;
        }
        self.id.rfind(separator).map(|idx| Entity {
            entity_type: self.entity_type.clone(),
            id: self.id[..idx].to_string(),
        })
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}

pub type Subject = Entity;
pub type Object = Entity;

/// A relation name, valid only when declared in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relation(pub String);

impl Relation {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Relation {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Relation {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A named capability checked at runtime, mapped onto one or more relations
/// by the schema's `actionToRelations` table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Action(pub String);

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Action {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Action {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A time-bounded validity window. `valid_until` is strictly exclusive;
/// `valid_since` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub valid_since: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl Condition {
    pub fn new(valid_since: Option<DateTime<Utc>>, valid_until: Option<DateTime<Utc>>) -> Self {
        Self {
            valid_since,
            valid_until,
        }
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if let Some(since) = self.valid_since {
            if now < since {
                return false;
            }
        }
        if let Some(until) = self.valid_until {
            if now >= until {
                return false;
            }
        }
        true
    }
}

/// A relationship fact: `subject` has `relation` to `object`, optionally
/// gated by a time condition. `id` is adapter-assigned and opaque to the
/// engine. Tuples are semantically a multiset keyed by
/// `(subject, relation, object)`; duplicates are permitted but meaningless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub id: Option<String>,
    pub subject: Subject,
    pub relation: Relation,
    pub object: Object,
    pub condition: Option<Condition>,
}

impl Tuple {
    pub fn new(subject: Subject, relation: Relation, object: Object) -> Self {
        Self {
            id: None,
            subject,
            relation,
            object,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match &self.condition {
            None => true,
            Some(c) => c.is_valid_at(now),
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.subject, self.relation, self.object)
    }
}

/// A decided object reachable by a subject, returned by
/// `listAccessibleObjects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibleObject {
    pub object: Object,
    pub allowed_actions: Vec<String>,
    pub parent: Option<Object>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn entity_base_splits_on_last_separator() {
        let e = Entity::new("document", "d1#salary#ssn");
        let base = e.base("#").unwrap();
        assert_eq!(base.id, "d1#salary");
        assert_eq!(base.entity_type, "document");
    }

    #[test]
    fn entity_without_separator_has_no_base() {
        let e = Entity::new("document", "d1");
        assert!(e.base("#").is_none());
    }

    #[test]
    fn condition_validity_window() {
        let now = Utc::now();
        let c = Condition::new(Some(now - Duration::hours(1)), Some(now + Duration::hours(1)));
        assert!(c.is_valid_at(now));
        assert!(!c.is_valid_at(now - Duration::hours(2)));
        assert!(!c.is_valid_at(now + Duration::hours(2)));
    }

    #[test]
    fn valid_until_is_exclusive() {
        let c = Condition::new(None, Some(Utc::now()));
        assert!(!c.is_valid_at(c.valid_until.unwrap()));
    }
}
