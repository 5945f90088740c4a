use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::store::{Entity, EntityKind};

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAttemptRequest {
    #[validate(length(min = 1, max = 128, message = "learner_id must not be empty"))]
    pub learner_id: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
    #[serde(flatten)]
    pub attempt: AttemptInput,
}

/// What a learner hands in. Choices and text are graded directly; `run` and
/// `code` are first sent to the external executor or test runner, which is
/// the only source of execution and test evidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptInput {
    Choice {
        #[serde(default)]
        selected: Option<usize>,
    },
    Text {
        #[serde(default)]
        answer: Option<String>,
    },
    Run {
        #[serde(default)]
        command: Option<String>,
    },
    Code {
        #[serde(default)]
        source: Option<String>,
    },
}

impl AttemptInput {
    pub fn kind(&self) -> &'static str {
        match self {
            AttemptInput::Choice { .. } => "choice",
            AttemptInput::Text { .. } => "text",
            AttemptInput::Run { .. } => "run",
            AttemptInput::Code { .. } => "code",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub learner_id: String,
    pub exercise_id: ObjectId,
    pub micro_lesson_id: ObjectId,
    pub submission_kind: String,
    pub passed: bool,
    pub detail: String,
    pub submitted_at: BsonDateTime,
}

impl Entity for AttemptRecord {
    const KIND: EntityKind = EntityKind::Attempt;
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProgressQuery {
    #[validate(length(min = 1, max = 128, message = "learner_id must not be empty"))]
    pub learner_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockingExercise {
    pub exercise_id: String,
    pub title: String,
    pub sequence_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressReport {
    pub micro_lesson_id: String,
    pub learner_id: String,
    pub can_advance: bool,
    pub blocking: Vec<BlockingExercise>,
}
