use async_trait::async_trait;
use mongodb::bson::{oid::ObjectId, Bson, Document};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{ContentStore, EntityKind, IdentityKey, UpsertOutcome};
use crate::error::ContentError;

/// In-process store used for dry runs and tests.
///
/// All writes take the single write lock, so the find-then-insert of an
/// upsert and the unique-constraint checks happen atomically.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<EntityKind, Vec<Document>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(document: &Document, filter: &Document) -> bool {
    filter
        .iter()
        .all(|(field, expected)| document.get(field) == Some(expected))
}

fn project(document: &Document, fields: &[&str]) -> Option<Document> {
    let mut projected = Document::new();
    for field in fields {
        projected.insert(*field, document.get(*field)?.clone());
    }
    Some(projected)
}

fn compare_bson(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (Some(Bson::Int32(x)), Some(Bson::Int32(y))) => x.cmp(y),
        (Some(Bson::Int64(x)), Some(Bson::Int64(y))) => x.cmp(y),
        (Some(Bson::Int32(x)), Some(Bson::Int64(y))) => i64::from(*x).cmp(y),
        (Some(Bson::Int64(x)), Some(Bson::Int32(y))) => x.cmp(&i64::from(*y)),
        (Some(Bson::String(x)), Some(Bson::String(y))) => x.cmp(y),
        (Some(Bson::DateTime(x)), Some(Bson::DateTime(y))) => x.cmp(y),
        (Some(Bson::ObjectId(x)), Some(Bson::ObjectId(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn upsert(
        &self,
        kind: EntityKind,
        key: &IdentityKey,
        attributes: Document,
    ) -> Result<UpsertOutcome, ContentError> {
        key.check(kind)?;
        let mut collections = self.collections.write().await;
        let rows = collections.entry(kind).or_default();

        if let Some(existing) = rows
            .iter()
            .find(|row| matches_filter(row, key.as_document()))
        {
            return Ok(UpsertOutcome {
                document: existing.clone(),
                created: false,
            });
        }

        let mut document = attributes;
        for (field, value) in key.as_document() {
            document.insert(field.clone(), value.clone());
        }
        document.insert("_id", ObjectId::new());

        for constraint in kind.unique_constraints().iter().skip(1) {
            let Some(slot) = project(&document, constraint) else {
                continue;
            };
            if rows.iter().any(|row| matches_filter(row, &slot)) {
                return Err(ContentError::Conflict {
                    kind,
                    key: IdentityKey(slot).to_string(),
                });
            }
        }

        rows.push(document.clone());
        Ok(UpsertOutcome {
            document,
            created: true,
        })
    }

    async fn find(
        &self,
        kind: EntityKind,
        key: &IdentityKey,
    ) -> Result<Option<Document>, ContentError> {
        key.check(kind)?;
        let collections = self.collections.read().await;
        Ok(collections.get(&kind).and_then(|rows| {
            rows.iter()
                .find(|row| matches_filter(row, key.as_document()))
                .cloned()
        }))
    }

    async fn find_by_id(
        &self,
        kind: EntityKind,
        id: &ObjectId,
    ) -> Result<Option<Document>, ContentError> {
        let collections = self.collections.read().await;
        Ok(collections.get(&kind).and_then(|rows| {
            rows.iter()
                .find(|row| row.get_object_id("_id").ok() == Some(*id))
                .cloned()
        }))
    }

    async fn find_many(
        &self,
        kind: EntityKind,
        filter: Document,
        sort_field: &str,
    ) -> Result<Vec<Document>, ContentError> {
        let collections = self.collections.read().await;
        let mut found = collections
            .get(&kind)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches_filter(row, &filter))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        found.sort_by(|a, b| compare_bson(a.get(sort_field), b.get(sort_field)));
        Ok(found)
    }

    async fn insert(&self, kind: EntityKind, document: Document) -> Result<ObjectId, ContentError> {
        let id = ObjectId::new();
        let mut document = document;
        document.insert("_id", id);
        let mut collections = self.collections.write().await;
        collections.entry(kind).or_default().push(document);
        Ok(id)
    }

    async fn count(&self, kind: EntityKind) -> Result<u64, ContentError> {
        let collections = self.collections.read().await;
        Ok(collections.get(&kind).map(|rows| rows.len() as u64).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use std::sync::Arc;

    #[tokio::test]
    async fn first_write_wins() {
        let store = MemoryStore::new();
        let key = IdentityKey::title("Acids and Bases");

        let first = store
            .upsert(EntityKind::CourseLesson, &key, doc! { "content": "v1" })
            .await
            .unwrap();
        let second = store
            .upsert(EntityKind::CourseLesson, &key, doc! { "content": "v2" })
            .await
            .unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.document.get_str("content").unwrap(), "v1");
        assert_eq!(
            first.document.get_object_id("_id").unwrap(),
            second.document.get_object_id("_id").unwrap()
        );
        assert_eq!(store.count(EntityKind::CourseLesson).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn secondary_constraint_rejects_taken_slot() {
        let store = MemoryStore::new();
        let module_id = ObjectId::new();

        store
            .upsert(
                EntityKind::ModuleItem,
                &IdentityKey::placement(module_id, "lesson", ObjectId::new()),
                doc! { "sequence_order": 1, "required": true },
            )
            .await
            .unwrap();

        let err = store
            .upsert(
                EntityKind::ModuleItem,
                &IdentityKey::placement(module_id, "quiz", ObjectId::new()),
                doc! { "sequence_order": 1, "required": true },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ContentError::Conflict { kind: EntityKind::ModuleItem, .. }));
        assert_eq!(store.count(EntityKind::ModuleItem).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_upserts_create_one_row() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for n in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert(
                        EntityKind::Quiz,
                        &IdentityKey::title("Docker quiz"),
                        doc! { "passing_score": 70, "attempt": n },
                    )
                    .await
                    .map(|outcome| outcome.created)
            }));
        }

        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                created += 1;
            }
        }

        assert_eq!(created, 1);
        assert_eq!(store.count(EntityKind::Quiz).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn find_many_sorts_by_field() {
        let store = MemoryStore::new();
        let quiz_id = ObjectId::new();
        for order in [3, 1, 2] {
            store
                .upsert(
                    EntityKind::QuizQuestion,
                    &IdentityKey::sequence("quiz_id", quiz_id, order),
                    doc! { "question": format!("q{}", order) },
                )
                .await
                .unwrap();
        }

        let rows = store
            .find_many(EntityKind::QuizQuestion, doc! { "quiz_id": quiz_id }, "sequence_order")
            .await
            .unwrap();
        let orders: Vec<i32> = rows
            .iter()
            .map(|row| row.get_i32("sequence_order").unwrap())
            .collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn find_by_id_and_missing() {
        let store = MemoryStore::new();
        let outcome = store
            .upsert(EntityKind::HandsOnLab, &IdentityKey::title("Lab"), doc! {})
            .await
            .unwrap();
        let id = outcome.document.get_object_id("_id").unwrap();

        assert!(store
            .find_by_id(EntityKind::HandsOnLab, &id)
            .await
            .unwrap()
            .is_some());
        assert!(store
            .find_by_id(EntityKind::Quiz, &id)
            .await
            .unwrap()
            .is_none());
    }
}
