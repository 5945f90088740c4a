use mongodb::bson::{doc, oid::ObjectId, Document};
use std::collections::BTreeMap;
use std::sync::Arc;
use validator::Validate;

use crate::error::ContentError;
use crate::models::course::{
    CourseLessonRecord, CourseModuleRecord, HandsOnLabRecord, ItemType, MicroLessonRecord,
    ModuleItemRecord, ModuleItemView, ModuleOutline,
};
use crate::models::exercise::{ExerciseRecord, ExerciseSpec};
use crate::models::quiz::{validate_question, QuizQuestionRecord, QuizRecord};
use crate::models::seed::{ExerciseSeed, LabSeed, LessonSeed, MicroLessonSeed, ModuleSeed, QuestionSeed, QuizSeed};
use crate::store::{decode, ContentStore, Entity, EntityKind, IdentityKey};
use crate::utils::time::now_bson;

/// Typed content operations on top of a [`ContentStore`].
///
/// Every `upsert_*` is first-write-wins: when a record with the same natural
/// identity already exists it is returned unchanged together with
/// `created = false`.
#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn ContentStore>,
}

impl ContentService {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    async fn upsert_entity<T: Entity>(
        &self,
        key: IdentityKey,
        mut attributes: Document,
    ) -> Result<(T, bool), ContentError> {
        attributes.insert("created_at", now_bson());
        let outcome = self.store.upsert(T::KIND, &key, attributes).await?;
        if outcome.created {
            tracing::debug!("Created {} ({})", T::KIND, key);
        }
        Ok((decode::<T>(outcome.document)?, outcome.created))
    }

    async fn get_entity<T: Entity>(&self, id: &ObjectId) -> Result<T, ContentError> {
        match self.store.find_by_id(T::KIND, id).await? {
            Some(document) => decode(document),
            None => Err(ContentError::NotFound {
                kind: T::KIND,
                key: id.to_hex(),
            }),
        }
    }

    pub async fn upsert_module(
        &self,
        seed: &ModuleSeed,
    ) -> Result<(CourseModuleRecord, bool), ContentError> {
        check_seed(EntityKind::CourseModule, &seed.title, seed)?;
        self.upsert_entity(
            IdentityKey::title(seed.title.as_str()),
            doc! {
                "description": seed.description.clone(),
                "position": seed.position,
            },
        )
        .await
    }

    pub async fn upsert_lesson(
        &self,
        seed: &LessonSeed,
    ) -> Result<(CourseLessonRecord, bool), ContentError> {
        check_seed(EntityKind::CourseLesson, &seed.title, seed)?;
        self.upsert_entity(
            IdentityKey::title(seed.title.as_str()),
            doc! {
                "content": seed.content.clone(),
                "estimated_minutes": seed.estimated_minutes,
                "difficulty": seed.difficulty.as_str(),
                "key_concepts": seed.key_concepts.clone(),
            },
        )
        .await
    }

    pub async fn upsert_micro_lesson(
        &self,
        module_id: ObjectId,
        sequence_order: i32,
        seed: &MicroLessonSeed,
    ) -> Result<(MicroLessonRecord, bool), ContentError> {
        check_seed(EntityKind::MicroLesson, &seed.title, seed)?;
        self.upsert_entity(
            IdentityKey::sequence("module_id", module_id, sequence_order),
            doc! {
                "title": seed.title.clone(),
                "content": seed.content.clone(),
                "estimated_minutes": seed.estimated_minutes,
                "difficulty": seed.difficulty.as_str(),
                "key_concepts": seed.key_concepts.clone(),
            },
        )
        .await
    }

    pub async fn upsert_lab(&self, seed: &LabSeed) -> Result<(HandsOnLabRecord, bool), ContentError> {
        check_seed(EntityKind::HandsOnLab, &seed.title, seed)?;
        self.upsert_entity(
            IdentityKey::title(seed.title.as_str()),
            doc! {
                "description": seed.description.clone(),
                "estimated_minutes": seed.estimated_minutes,
                "difficulty": seed.difficulty.as_str(),
            },
        )
        .await
    }

    /// Questions are not touched here; see [`ContentService::upsert_question`].
    pub async fn upsert_quiz(&self, seed: &QuizSeed) -> Result<(QuizRecord, bool), ContentError> {
        seed.validate().map_err(|e| ContentError::InvalidQuiz {
            quiz: seed.title.clone(),
            reason: e.to_string(),
        })?;
        self.upsert_entity(
            IdentityKey::title(seed.title.as_str()),
            doc! {
                "description": seed.description.clone(),
                "time_limit_minutes": seed.time_limit_minutes,
                "passing_score": seed.passing_score,
                "max_attempts": seed.max_attempts,
                "shuffle_questions": seed.shuffle_questions,
            },
        )
        .await
    }

    pub async fn upsert_question(
        &self,
        quiz: &QuizRecord,
        sequence_order: i32,
        seed: &QuestionSeed,
    ) -> Result<(QuizQuestionRecord, bool), ContentError> {
        let invalid = |reason: String| ContentError::InvalidQuestion {
            quiz: quiz.title.clone(),
            sequence_order,
            reason,
        };

        seed.validate().map_err(|e| invalid(e.to_string()))?;
        validate_question(
            seed.question_type,
            &seed.question,
            &seed.options,
            seed.correct_answer.as_deref(),
        )
        .map_err(invalid)?;
        let options = mongodb::bson::to_bson(&seed.options).map_err(|e| invalid(e.to_string()))?;

        let mut attributes = doc! {
            "question_type": seed.question_type.as_str(),
            "question": seed.question.clone(),
            "options": options,
            "points": seed.points,
        };
        if let Some(answer) = &seed.correct_answer {
            attributes.insert("correct_answer", answer.trim());
        }
        if let Some(explanation) = &seed.explanation {
            attributes.insert("explanation", explanation.clone());
        }
        if let Some(difficulty) = seed.difficulty {
            attributes.insert("difficulty", difficulty.as_str());
        }

        self.upsert_entity(
            IdentityKey::sequence("quiz_id", quiz.id, sequence_order),
            attributes,
        )
        .await
    }

    /// Parses `exercise_data` into an [`ExerciseSpec`] before anything is
    /// written, so malformed configuration never reaches the store.
    pub async fn upsert_exercise(
        &self,
        micro_lesson: &MicroLessonRecord,
        sequence_order: i32,
        seed: &ExerciseSeed,
    ) -> Result<(ExerciseRecord, bool), ContentError> {
        let invalid = |reason: String| ContentError::InvalidExerciseSpec {
            exercise: seed.title.clone(),
            reason,
        };

        seed.validate().map_err(|e| invalid(e.to_string()))?;
        let exercise_data = match &seed.exercise_data {
            serde_json::Value::Null => Document::new(),
            serde_json::Value::Object(_) => {
                mongodb::bson::to_document(&seed.exercise_data).map_err(|e| invalid(e.to_string()))?
            }
            _ => return Err(invalid("exercise_data must be an object".to_string())),
        };
        ExerciseSpec::parse(&seed.title, seed.exercise_type, &exercise_data)?;

        self.upsert_entity(
            IdentityKey::sequence("micro_lesson_id", micro_lesson.id, sequence_order),
            doc! {
                "title": seed.title.clone(),
                "exercise_type": seed.exercise_type.as_str(),
                "require_pass": seed.require_pass,
                "exercise_data": exercise_data,
            },
        )
        .await
    }

    /// Places an existing record in a module. Both the module and the target
    /// must exist, and the sequence slot must be free or already held by the
    /// same placement.
    pub async fn place_item(
        &self,
        module_id: ObjectId,
        item_type: ItemType,
        item_id: ObjectId,
        sequence_order: i32,
        required: bool,
    ) -> Result<(ModuleItemRecord, bool), ContentError> {
        let module = match self.store.find_by_id(EntityKind::CourseModule, &module_id).await? {
            Some(document) => decode::<CourseModuleRecord>(document)?,
            None => {
                return Err(ContentError::DanglingReference {
                    module: module_id.to_hex(),
                    item_type: EntityKind::CourseModule.as_str().to_string(),
                    target: module_id.to_hex(),
                })
            }
        };

        if self
            .store
            .find_by_id(item_type.entity_kind(), &item_id)
            .await?
            .is_none()
        {
            return Err(ContentError::DanglingReference {
                module: module.title,
                item_type: item_type.as_str().to_string(),
                target: item_id.to_hex(),
            });
        }

        let result = self
            .upsert_entity::<ModuleItemRecord>(
                IdentityKey::placement(module_id, item_type.as_str(), item_id),
                doc! {
                    "sequence_order": sequence_order,
                    "required": required,
                },
            )
            .await;

        match result {
            Err(ContentError::Conflict { .. }) => Err(ContentError::SequenceConflict {
                module: module.title,
                sequence_order,
            }),
            other => other,
        }
    }

    /// Looks up a placeable record by title, for seed items that reference
    /// content seeded elsewhere.
    pub async fn find_by_title(
        &self,
        item_type: ItemType,
        title: &str,
    ) -> Result<Option<ObjectId>, ContentError> {
        let kind = item_type.entity_kind();
        let found = if kind.identity_fields() == ["title"] {
            self.store.find(kind, &IdentityKey::title(title)).await?
        } else {
            self.store
                .find_many(kind, doc! { "title": title }, "_id")
                .await?
                .into_iter()
                .next()
        };
        Ok(found.and_then(|document| document.get_object_id("_id").ok()))
    }

    pub async fn get_module(&self, id: &ObjectId) -> Result<CourseModuleRecord, ContentError> {
        self.get_entity(id).await
    }

    pub async fn list_module_items(
        &self,
        module_id: &ObjectId,
    ) -> Result<Vec<ModuleItemRecord>, ContentError> {
        self.store
            .list_module_items(module_id)
            .await?
            .into_iter()
            .map(decode::<ModuleItemRecord>)
            .collect()
    }

    /// Ordered placements with the title of each target resolved through its
    /// item type. Targets that disappeared show up without a title.
    pub async fn module_outline(&self, module_id: &ObjectId) -> Result<ModuleOutline, ContentError> {
        let module = self.get_module(module_id).await?;
        let mut items = Vec::new();
        for item in self.list_module_items(module_id).await? {
            let title = self
                .store
                .find_by_id(item.item_type.entity_kind(), &item.item_id)
                .await?
                .and_then(|document| document.get_str("title").ok().map(str::to_string));
            if title.is_none() {
                tracing::warn!(
                    "Module item {} points at missing {} {}",
                    item.id,
                    item.item_type.as_str(),
                    item.item_id
                );
            }
            items.push(ModuleItemView::from_record(&item, title));
        }
        Ok(ModuleOutline {
            module_id: module.id.to_hex(),
            title: module.title,
            items,
        })
    }

    pub async fn get_micro_lesson(&self, id: &ObjectId) -> Result<MicroLessonRecord, ContentError> {
        self.get_entity(id).await
    }

    pub async fn get_exercise(&self, id: &ObjectId) -> Result<ExerciseRecord, ContentError> {
        self.get_entity(id).await
    }

    pub async fn exercises_for(
        &self,
        micro_lesson_id: &ObjectId,
    ) -> Result<Vec<ExerciseRecord>, ContentError> {
        self.store
            .find_many(
                EntityKind::Exercise,
                doc! { "micro_lesson_id": *micro_lesson_id },
                "sequence_order",
            )
            .await?
            .into_iter()
            .map(decode::<ExerciseRecord>)
            .collect()
    }

    pub async fn get_quiz(&self, id: &ObjectId) -> Result<QuizRecord, ContentError> {
        self.get_entity(id).await
    }

    pub async fn quiz_questions(&self, quiz_id: &ObjectId) -> Result<Vec<QuizQuestionRecord>, ContentError> {
        self.store
            .find_many(
                EntityKind::QuizQuestion,
                doc! { "quiz_id": *quiz_id },
                "sequence_order",
            )
            .await?
            .into_iter()
            .map(decode::<QuizQuestionRecord>)
            .collect()
    }

    /// Record counts per content kind.
    pub async fn counts(&self) -> Result<BTreeMap<String, u64>, ContentError> {
        let mut counts = BTreeMap::new();
        for kind in EntityKind::ALL {
            counts.insert(kind.as_str().to_string(), self.store.count(kind).await?);
        }
        Ok(counts)
    }
}

fn check_seed(kind: EntityKind, label: &str, seed: &impl Validate) -> Result<(), ContentError> {
    seed.validate().map_err(|e| ContentError::InvalidRecord {
        kind,
        label: label.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::course::Difficulty;
    use crate::models::exercise::ExerciseType;
    use crate::models::quiz::{QuestionOption, QuestionType};
    use crate::store::MemoryStore;

    fn service() -> ContentService {
        ContentService::new(Arc::new(MemoryStore::new()))
    }

    fn module(title: &str) -> ModuleSeed {
        ModuleSeed {
            title: title.to_string(),
            description: "Containers from scratch".to_string(),
            position: 1,
            items: vec![],
        }
    }

    fn lesson(title: &str) -> LessonSeed {
        LessonSeed {
            title: title.to_string(),
            content: "Images and layers".to_string(),
            estimated_minutes: 10,
            difficulty: Difficulty::Beginner,
            key_concepts: vec!["image".to_string()],
        }
    }

    fn micro_lesson() -> MicroLessonSeed {
        MicroLessonSeed {
            title: "Build an image".to_string(),
            content: String::new(),
            estimated_minutes: 5,
            difficulty: Difficulty::Beginner,
            key_concepts: vec![],
            exercises: vec![],
        }
    }

    #[tokio::test]
    async fn upsert_is_first_write_wins() {
        let content = service();
        let (first, created) = content.upsert_lesson(&lesson("Docker images")).await.unwrap();
        assert!(created);

        let mut changed = lesson("Docker images");
        changed.estimated_minutes = 99;
        let (second, created) = content.upsert_lesson(&changed).await.unwrap();
        assert!(!created);
        assert_eq!(second.id, first.id);
        assert_eq!(second.estimated_minutes, 10);
    }

    #[tokio::test]
    async fn invalid_seed_is_rejected() {
        let mut bad = lesson("");
        bad.estimated_minutes = 0;
        let err = service().upsert_lesson(&bad).await.unwrap_err();
        assert!(matches!(err, ContentError::InvalidRecord { kind: EntityKind::CourseLesson, .. }));
    }

    #[tokio::test]
    async fn placement_requires_existing_target() {
        let content = service();
        let (module, _) = content.upsert_module(&module("Docker")).await.unwrap();

        let err = content
            .place_item(module.id, ItemType::Quiz, ObjectId::new(), 1, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::DanglingReference { .. }));

        let (lesson, _) = content.upsert_lesson(&lesson("Intro")).await.unwrap();
        let err = content
            .place_item(ObjectId::new(), ItemType::Lesson, lesson.id, 1, true)
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::DanglingReference { .. }));
    }

    #[tokio::test]
    async fn occupied_sequence_slot_is_a_sequence_conflict() {
        let content = service();
        let (module, _) = content.upsert_module(&module("Docker")).await.unwrap();
        let (intro, _) = content.upsert_lesson(&lesson("Intro")).await.unwrap();
        let (layers, _) = content.upsert_lesson(&lesson("Layers")).await.unwrap();

        content
            .place_item(module.id, ItemType::Lesson, intro.id, 1, true)
            .await
            .unwrap();
        let err = content
            .place_item(module.id, ItemType::Lesson, layers.id, 1, true)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ContentError::SequenceConflict {
                module: "Docker".to_string(),
                sequence_order: 1
            }
        );

        // Re-placing the same item is a no-op, even with another slot.
        let (again, created) = content
            .place_item(module.id, ItemType::Lesson, intro.id, 7, false)
            .await
            .unwrap();
        assert!(!created);
        assert_eq!(again.sequence_order, 1);
    }

    #[tokio::test]
    async fn outline_is_ordered_with_titles() {
        let content = service();
        let (module, _) = content.upsert_module(&module("Docker")).await.unwrap();
        let (intro, _) = content.upsert_lesson(&lesson("Intro")).await.unwrap();
        let (micro, _) = content
            .upsert_micro_lesson(module.id, 2, &micro_lesson())
            .await
            .unwrap();

        content
            .place_item(module.id, ItemType::MicroLesson, micro.id, 2, true)
            .await
            .unwrap();
        content
            .place_item(module.id, ItemType::Lesson, intro.id, 1, false)
            .await
            .unwrap();

        let outline = content.module_outline(&module.id).await.unwrap();
        let titles: Vec<_> = outline.items.iter().map(|i| i.title.clone()).collect();
        assert_eq!(
            titles,
            vec![Some("Intro".to_string()), Some("Build an image".to_string())]
        );
        assert_eq!(outline.items[0].item_type, ItemType::Lesson);
    }

    #[tokio::test]
    async fn invalid_question_is_rejected() {
        let content = service();
        let quiz_seed = QuizSeed {
            title: "Docker quiz".to_string(),
            description: String::new(),
            time_limit_minutes: 10,
            passing_score: 70,
            max_attempts: 3,
            shuffle_questions: false,
            questions: vec![],
        };
        let (quiz, _) = content.upsert_quiz(&quiz_seed).await.unwrap();

        let question = QuestionSeed {
            sequence_order: None,
            question_type: QuestionType::TrueFalse,
            question: "Containers share the host kernel".to_string(),
            options: vec![
                QuestionOption { text: "True".to_string(), correct: true, explanation: None },
                QuestionOption { text: "False".to_string(), correct: true, explanation: None },
            ],
            correct_answer: None,
            explanation: None,
            points: 1,
            difficulty: None,
        };
        let err = content.upsert_question(&quiz, 1, &question).await.unwrap_err();
        assert!(matches!(err, ContentError::InvalidQuestion { sequence_order: 1, .. }));
        assert_eq!(content.store().count(EntityKind::QuizQuestion).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn exercise_spec_is_checked_before_write() {
        let content = service();
        let (module, _) = content.upsert_module(&module("Docker")).await.unwrap();
        let (micro, _) = content
            .upsert_micro_lesson(module.id, 1, &micro_lesson())
            .await
            .unwrap();

        let typo = ExerciseSeed {
            sequence_order: None,
            title: "Build".to_string(),
            exercise_type: ExerciseType::Terminal,
            require_pass: true,
            exercise_data: serde_json::json!({
                "command": "docker build -t myapp:1.0 .",
                "validation": { "must_not_include": ["Error"] },
                "timeout_sec": 60,
                "hint": ["typo"]
            }),
        };
        let err = content.upsert_exercise(&micro, 1, &typo).await.unwrap_err();
        assert!(matches!(err, ContentError::InvalidExerciseSpec { .. }));

        let mut fixed = typo.clone();
        fixed.exercise_data = serde_json::json!({
            "command": "docker build -t myapp:1.0 .",
            "validation": { "must_not_include": ["Error"] },
            "timeout_sec": 60
        });
        let (record, created) = content.upsert_exercise(&micro, 1, &fixed).await.unwrap();
        assert!(created);
        assert!(matches!(record.spec().unwrap(), ExerciseSpec::Terminal(_)));
        assert_eq!(content.exercises_for(&micro.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn find_by_title_covers_sequence_keyed_kinds() {
        let content = service();
        let (module, _) = content.upsert_module(&module("Docker")).await.unwrap();
        let (micro, _) = content
            .upsert_micro_lesson(module.id, 3, &micro_lesson())
            .await
            .unwrap();

        let found = content
            .find_by_title(ItemType::MicroLesson, "Build an image")
            .await
            .unwrap();
        assert_eq!(found, Some(micro.id));
        assert_eq!(
            content.find_by_title(ItemType::Quiz, "missing").await.unwrap(),
            None
        );
    }
}
