//! Seed batch payloads.
//!
//! A batch is a JSON document listing modules and, per module, the ordered
//! content items to place in it. Loading is idempotent: every record is keyed
//! by its natural identity and existing records are left untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::course::{Difficulty, ItemType};
use super::exercise::ExerciseType;
use super::quiz::{default_points, QuestionOption, QuestionType};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedBatch {
    #[serde(default)]
    pub modules: Vec<ModuleSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ModuleSeed {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub items: Vec<ItemSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSeed {
    /// Defaults to the 1-based position within `items`.
    #[serde(default)]
    pub sequence_order: Option<i32>,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(flatten)]
    pub content: ItemContent,
}

fn default_required() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemContent {
    Lesson(LessonSeed),
    MicroLesson(MicroLessonSeed),
    Quiz(QuizSeed),
    HandsOnLab(LabSeed),
    /// Places a record seeded elsewhere, looked up by title.
    Reference { item_type: ItemType, title: String },
}

impl ItemContent {
    pub fn item_type(&self) -> ItemType {
        match self {
            ItemContent::Lesson(_) => ItemType::Lesson,
            ItemContent::MicroLesson(_) => ItemType::MicroLesson,
            ItemContent::Quiz(_) => ItemType::Quiz,
            ItemContent::HandsOnLab(_) => ItemType::HandsOnLab,
            ItemContent::Reference { item_type, .. } => *item_type,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            ItemContent::Lesson(seed) => &seed.title,
            ItemContent::MicroLesson(seed) => &seed.title,
            ItemContent::Quiz(seed) => &seed.title,
            ItemContent::HandsOnLab(seed) => &seed.title,
            ItemContent::Reference { title, .. } => title,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LessonSeed {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[validate(range(min = 1, message = "Estimated time must be at least one minute"))]
    pub estimated_minutes: i32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub key_concepts: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct MicroLessonSeed {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[validate(range(min = 1, message = "Estimated time must be at least one minute"))]
    pub estimated_minutes: i32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    #[serde(default)]
    pub exercises: Vec<ExerciseSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LabSeed {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 1, message = "Estimated time must be at least one minute"))]
    pub estimated_minutes: i32,
    pub difficulty: Difficulty,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuizSeed {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 1, message = "Time limit must be at least one minute"))]
    pub time_limit_minutes: i32,
    #[validate(range(min = 0, max = 100, message = "Passing score must be a percentage"))]
    pub passing_score: i32,
    #[validate(range(min = 1, message = "At least one attempt must be allowed"))]
    pub max_attempts: i32,
    #[serde(default)]
    pub shuffle_questions: bool,
    #[serde(default)]
    pub questions: Vec<QuestionSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct QuestionSeed {
    #[serde(default)]
    pub sequence_order: Option<i32>,
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default = "default_points")]
    #[validate(range(min = 0, max = 1000, message = "Points must be between 0 and 1000"))]
    pub points: i32,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ExerciseSeed {
    #[serde(default)]
    pub sequence_order: Option<i32>,
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,
    pub exercise_type: ExerciseType,
    #[serde(default)]
    pub require_pass: bool,
    #[serde(default)]
    pub exercise_data: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedRecord {
    pub kind: String,
    pub label: String,
    pub reason: String,
}

/// Outcome of applying one seed batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeedReport {
    pub created: BTreeMap<String, u64>,
    pub existing: BTreeMap<String, u64>,
    pub skipped: Vec<SkippedRecord>,
}

impl SeedReport {
    pub fn record(&mut self, kind: &str, created: bool) {
        let bucket = if created {
            &mut self.created
        } else {
            &mut self.existing
        };
        *bucket.entry(kind.to_string()).or_insert(0) += 1;
    }

    pub fn skip(&mut self, kind: &str, label: &str, reason: impl Into<String>) {
        self.skipped.push(SkippedRecord {
            kind: kind.to_string(),
            label: label.to_string(),
            reason: reason.into(),
        });
    }

    pub fn created_total(&self) -> u64 {
        self.created.values().sum()
    }

    pub fn existing_total(&self) -> u64 {
        self.existing.values().sum()
    }
}
