//! Content entity store.
//!
//! Every entity kind lives in its own collection and declares its unique
//! constraints up front. The first constraint is the natural identity key used
//! by [`ContentStore::upsert`]; any further constraints (for example the
//! per-module sequence slot of a module item) are enforced on insert as well.

use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;

use crate::error::ContentError;

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CourseModule,
    CourseLesson,
    MicroLesson,
    HandsOnLab,
    Quiz,
    QuizQuestion,
    Exercise,
    ModuleItem,
    Attempt,
}

impl EntityKind {
    pub const ALL: [EntityKind; 9] = [
        EntityKind::CourseModule,
        EntityKind::CourseLesson,
        EntityKind::MicroLesson,
        EntityKind::HandsOnLab,
        EntityKind::Quiz,
        EntityKind::QuizQuestion,
        EntityKind::Exercise,
        EntityKind::ModuleItem,
        EntityKind::Attempt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::CourseModule => "course_module",
            EntityKind::CourseLesson => "course_lesson",
            EntityKind::MicroLesson => "micro_lesson",
            EntityKind::HandsOnLab => "hands_on_lab",
            EntityKind::Quiz => "quiz",
            EntityKind::QuizQuestion => "quiz_question",
            EntityKind::Exercise => "exercise",
            EntityKind::ModuleItem => "module_item",
            EntityKind::Attempt => "attempt",
        }
    }

    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::CourseModule => "course_modules",
            EntityKind::CourseLesson => "course_lessons",
            EntityKind::MicroLesson => "micro_lessons",
            EntityKind::HandsOnLab => "hands_on_labs",
            EntityKind::Quiz => "quizzes",
            EntityKind::QuizQuestion => "quiz_questions",
            EntityKind::Exercise => "exercises",
            EntityKind::ModuleItem => "module_items",
            EntityKind::Attempt => "attempt_records",
        }
    }

    /// Unique constraints, identity key first.
    pub fn unique_constraints(&self) -> &'static [&'static [&'static str]] {
        match self {
            EntityKind::CourseModule
            | EntityKind::CourseLesson
            | EntityKind::HandsOnLab
            | EntityKind::Quiz => &[&["title"]],
            EntityKind::MicroLesson => &[&["module_id", "sequence_order"]],
            EntityKind::QuizQuestion => &[&["quiz_id", "sequence_order"]],
            EntityKind::Exercise => &[&["micro_lesson_id", "sequence_order"]],
            EntityKind::ModuleItem => &[
                &["module_id", "item_type", "item_id"],
                &["module_id", "sequence_order"],
            ],
            EntityKind::Attempt => &[],
        }
    }

    pub fn identity_fields(&self) -> &'static [&'static str] {
        self.unique_constraints().first().copied().unwrap_or(&[])
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Natural identity of a record: an equality filter over exactly the
/// identity fields of its kind.
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityKey(Document);

impl IdentityKey {
    pub fn title(title: impl Into<String>) -> Self {
        let mut doc = Document::new();
        doc.insert("title", title.into());
        Self(doc)
    }

    pub fn sequence(parent_field: &str, parent_id: ObjectId, sequence_order: i32) -> Self {
        let mut doc = Document::new();
        doc.insert(parent_field, parent_id);
        doc.insert("sequence_order", sequence_order);
        Self(doc)
    }

    pub fn placement(module_id: ObjectId, item_type: &str, item_id: ObjectId) -> Self {
        let mut doc = Document::new();
        doc.insert("module_id", module_id);
        doc.insert("item_type", item_type);
        doc.insert("item_id", item_id);
        Self(doc)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    /// Checks that the key names exactly the identity fields of `kind`.
    pub fn check(&self, kind: EntityKind) -> Result<(), ContentError> {
        let expected = kind.identity_fields();
        let matches = expected.len() == self.0.len()
            && expected.iter().all(|field| self.0.contains_key(field));
        if matches {
            Ok(())
        } else {
            Err(ContentError::InvalidKey {
                kind,
                expected: expected.join("+"),
                actual: self.0.keys().cloned().collect::<Vec<_>>().join("+"),
            })
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = self
            .0
            .iter()
            .map(|(field, value)| format!("{}={}", field, display_bson(value)))
            .collect::<Vec<_>>();
        f.write_str(&parts.join(", "))
    }
}

fn display_bson(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(id) => id.to_hex(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub document: Document,
    pub created: bool,
}

/// A typed record stored in one of the content collections.
pub trait Entity: DeserializeOwned {
    const KIND: EntityKind;
}

pub fn decode<T: Entity>(document: Document) -> Result<T, ContentError> {
    mongodb::bson::from_document(document).map_err(|e| ContentError::Malformed {
        kind: T::KIND,
        reason: e.to_string(),
    })
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert-if-absent keyed by `key`. An existing record is returned
    /// untouched; `attributes` only apply on first insert.
    async fn upsert(
        &self,
        kind: EntityKind,
        key: &IdentityKey,
        attributes: Document,
    ) -> Result<UpsertOutcome, ContentError>;

    async fn find(
        &self,
        kind: EntityKind,
        key: &IdentityKey,
    ) -> Result<Option<Document>, ContentError>;

    async fn find_by_id(
        &self,
        kind: EntityKind,
        id: &ObjectId,
    ) -> Result<Option<Document>, ContentError>;

    /// Equality-filtered listing sorted ascending by `sort_field`.
    async fn find_many(
        &self,
        kind: EntityKind,
        filter: Document,
        sort_field: &str,
    ) -> Result<Vec<Document>, ContentError>;

    /// Plain insert for append-only kinds (attempt records).
    async fn insert(&self, kind: EntityKind, document: Document) -> Result<ObjectId, ContentError>;

    async fn count(&self, kind: EntityKind) -> Result<u64, ContentError>;

    /// Placements of one module in sequence order.
    async fn list_module_items(&self, module_id: &ObjectId) -> Result<Vec<Document>, ContentError> {
        let mut filter = Document::new();
        filter.insert("module_id", *module_id);
        self.find_many(EntityKind::ModuleItem, filter, "sequence_order")
            .await
    }

    async fn ensure_indexes(&self) -> Result<(), ContentError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), ContentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn module_item_has_placement_and_slot_constraints() {
        let constraints = EntityKind::ModuleItem.unique_constraints();
        assert_eq!(constraints.len(), 2);
        assert_eq!(
            EntityKind::ModuleItem.identity_fields(),
            &["module_id", "item_type", "item_id"]
        );
        assert_eq!(constraints[1], &["module_id", "sequence_order"]);
    }

    #[test]
    fn identity_key_must_match_kind() {
        let key = IdentityKey::title("Docker basics");
        assert!(key.check(EntityKind::CourseLesson).is_ok());
        assert!(matches!(
            key.check(EntityKind::Exercise),
            Err(ContentError::InvalidKey { .. })
        ));

        let seq = IdentityKey::sequence("micro_lesson_id", ObjectId::new(), 2);
        assert!(seq.check(EntityKind::Exercise).is_ok());
        assert!(seq.check(EntityKind::QuizQuestion).is_err());
    }

    #[test]
    fn identity_key_display_is_readable() {
        let id = ObjectId::new();
        let key = IdentityKey::sequence("quiz_id", id, 3);
        assert_eq!(key.to_string(), format!("quiz_id={}, sequence_order=3", id.to_hex()));
        assert_eq!(key.as_document(), &doc! { "quiz_id": id, "sequence_order": 3 });
    }

    #[test]
    fn attempts_have_no_identity() {
        assert!(EntityKind::Attempt.identity_fields().is_empty());
    }
}
