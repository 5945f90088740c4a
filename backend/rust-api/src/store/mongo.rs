use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, Document},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Collection, Database, IndexModel,
};

use super::{ContentStore, EntityKind, IdentityKey, UpsertOutcome};
use crate::error::ContentError;
use crate::metrics::track_db_operation;
use crate::utils::retry::{retry_async_with_config, RetryConfig};

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed store. Identity keys are backed by unique indexes and
/// upserts use `$setOnInsert`, so concurrent seed runs cannot duplicate rows.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn collection(&self, kind: EntityKind) -> Collection<Document> {
        self.db.collection(kind.collection())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref we)) => we.code == DUPLICATE_KEY,
        ErrorKind::Command(ref ce) => ce.code == DUPLICATE_KEY,
        _ => false,
    }
}

fn index_name(kind: EntityKind, fields: &[&str]) -> String {
    format!("uniq_{}_{}", kind.as_str(), fields.join("_"))
}

#[async_trait]
impl ContentStore for MongoStore {
    async fn upsert(
        &self,
        kind: EntityKind,
        key: &IdentityKey,
        attributes: Document,
    ) -> Result<UpsertOutcome, ContentError> {
        key.check(kind)?;
        let collection = self.collection(kind);
        let filter = key.as_document().clone();

        // Filter fields are copied into the inserted document by the server.
        let mut on_insert = attributes;
        for field in filter.keys() {
            on_insert.remove(field);
        }

        let write = track_db_operation("upsert", kind.collection(), async {
            collection
                .update_one(filter.clone(), doc! { "$setOnInsert": on_insert })
                .upsert(true)
                .await
                .map_err(anyhow::Error::from)
        })
        .await;

        let created = match write {
            Ok(result) => result.upserted_id.is_some(),
            Err(e) => match e.downcast_ref::<mongodb::error::Error>() {
                // Lost an insert race, or hit a secondary unique index. Either
                // way the re-read below decides.
                Some(mongo_err) if is_duplicate_key(mongo_err) => {
                    tracing::debug!("Duplicate key on {} upsert for {}", kind, key);
                    false
                }
                _ => return Err(ContentError::Store(format!("{:#}", e))),
            },
        };

        let stored = retry_async_with_config(RetryConfig::default(), || async {
            collection.find_one(filter.clone()).await
        })
        .await?;

        match stored {
            Some(document) => Ok(UpsertOutcome { document, created }),
            None => Err(ContentError::Conflict {
                kind,
                key: key.to_string(),
            }),
        }
    }

    async fn find(
        &self,
        kind: EntityKind,
        key: &IdentityKey,
    ) -> Result<Option<Document>, ContentError> {
        key.check(kind)?;
        let collection = self.collection(kind);
        let filter = key.as_document().clone();
        let found = retry_async_with_config(RetryConfig::default(), || async {
            collection.find_one(filter.clone()).await
        })
        .await?;
        Ok(found)
    }

    async fn find_by_id(
        &self,
        kind: EntityKind,
        id: &ObjectId,
    ) -> Result<Option<Document>, ContentError> {
        let collection = self.collection(kind);
        let found = retry_async_with_config(RetryConfig::default(), || async {
            collection.find_one(doc! { "_id": id }).await
        })
        .await?;
        Ok(found)
    }

    async fn find_many(
        &self,
        kind: EntityKind,
        filter: Document,
        sort_field: &str,
    ) -> Result<Vec<Document>, ContentError> {
        let collection = self.collection(kind);
        let mut sort = Document::new();
        sort.insert(sort_field, 1);
        let documents = track_db_operation("find", kind.collection(), async {
            let cursor = collection.find(filter).sort(sort).await?;
            let documents: Vec<Document> = cursor.try_collect().await?;
            Ok(documents)
        })
        .await
        .map_err(|e| ContentError::Store(format!("{:#}", e)))?;
        Ok(documents)
    }

    async fn insert(&self, kind: EntityKind, document: Document) -> Result<ObjectId, ContentError> {
        let id = ObjectId::new();
        let mut document = document;
        document.insert("_id", id);
        self.collection(kind).insert_one(document).await?;
        Ok(id)
    }

    async fn count(&self, kind: EntityKind) -> Result<u64, ContentError> {
        Ok(self.collection(kind).count_documents(doc! {}).await?)
    }

    async fn ensure_indexes(&self) -> Result<(), ContentError> {
        for kind in EntityKind::ALL {
            for fields in kind.unique_constraints() {
                let mut keys = Document::new();
                for field in fields.iter() {
                    keys.insert(*field, 1);
                }
                let model = IndexModel::builder()
                    .keys(keys)
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .name(index_name(kind, fields))
                            .build(),
                    )
                    .build();
                self.collection(kind).create_index(model).await?;
            }
        }
        tracing::info!("Unique indexes ensured for content collections");
        Ok(())
    }

    async fn ping(&self) -> Result<(), ContentError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_names_are_stable() {
        assert_eq!(
            index_name(EntityKind::ModuleItem, &["module_id", "sequence_order"]),
            "uniq_module_item_module_id_sequence_order"
        );
        assert_eq!(
            index_name(EntityKind::Quiz, &["title"]),
            "uniq_quiz_title"
        );
    }
}
