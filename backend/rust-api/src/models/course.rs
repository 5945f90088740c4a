use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::store::{Entity, EntityKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Beginner => "beginner",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Advanced => "advanced",
        }
    }
}

/// Content kinds a module item may point at.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Lesson,
    Quiz,
    HandsOnLab,
    MicroLesson,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Lesson => "lesson",
            ItemType::Quiz => "quiz",
            ItemType::HandsOnLab => "hands_on_lab",
            ItemType::MicroLesson => "micro_lesson",
        }
    }

    /// Collection that owns the referenced record.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            ItemType::Lesson => EntityKind::CourseLesson,
            ItemType::Quiz => EntityKind::Quiz,
            ItemType::HandsOnLab => EntityKind::HandsOnLab,
            ItemType::MicroLesson => EntityKind::MicroLesson,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseModuleRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub position: i32,
    pub created_at: BsonDateTime,
}

impl Entity for CourseModuleRecord {
    const KIND: EntityKind = EntityKind::CourseModule;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseLessonRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub estimated_minutes: i32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    pub created_at: BsonDateTime,
}

impl Entity for CourseLessonRecord {
    const KIND: EntityKind = EntityKind::CourseLesson;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroLessonRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub module_id: ObjectId,
    pub sequence_order: i32,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub estimated_minutes: i32,
    pub difficulty: Difficulty,
    #[serde(default)]
    pub key_concepts: Vec<String>,
    pub created_at: BsonDateTime,
}

impl Entity for MicroLessonRecord {
    const KIND: EntityKind = EntityKind::MicroLesson;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandsOnLabRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub estimated_minutes: i32,
    pub difficulty: Difficulty,
    pub created_at: BsonDateTime,
}

impl Entity for HandsOnLabRecord {
    const KIND: EntityKind = EntityKind::HandsOnLab;
}

/// Placement of one content record inside a module. The referenced record is
/// not owned: it may be placed in several modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleItemRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub module_id: ObjectId,
    pub item_type: ItemType,
    pub item_id: ObjectId,
    pub sequence_order: i32,
    pub required: bool,
    pub created_at: BsonDateTime,
}

impl Entity for ModuleItemRecord {
    const KIND: EntityKind = EntityKind::ModuleItem;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModuleItemView {
    pub id: String,
    pub item_type: ItemType,
    pub item_id: String,
    pub sequence_order: i32,
    pub required: bool,
    pub title: Option<String>,
}

impl ModuleItemView {
    pub fn from_record(record: &ModuleItemRecord, title: Option<String>) -> Self {
        Self {
            id: record.id.to_hex(),
            item_type: record.item_type,
            item_id: record.item_id.to_hex(),
            sequence_order: record.sequence_order,
            required: record.required,
            title,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModuleOutline {
    pub module_id: String,
    pub title: String,
    pub items: Vec<ModuleItemView>,
}
