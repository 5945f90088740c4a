use thiserror::Error;

use crate::store::EntityKind;

/// Errors raised while loading, storing or resolving course content.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContentError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: EntityKind, key: String },

    #[error("module item in '{module}' points at missing {item_type} '{target}'")]
    DanglingReference {
        module: String,
        item_type: String,
        target: String,
    },

    #[error("invalid exercise spec for '{exercise}': {reason}")]
    InvalidExerciseSpec { exercise: String, reason: String },

    #[error("invalid quiz '{quiz}': {reason}")]
    InvalidQuiz { quiz: String, reason: String },

    #[error("invalid question #{sequence_order} in quiz '{quiz}': {reason}")]
    InvalidQuestion {
        quiz: String,
        sequence_order: i32,
        reason: String,
    },

    #[error("invalid {kind} '{label}': {reason}")]
    InvalidRecord {
        kind: EntityKind,
        label: String,
        reason: String,
    },

    #[error("sequence slot {sequence_order} in module '{module}' is already taken")]
    SequenceConflict { module: String, sequence_order: i32 },

    #[error("unique constraint violated for {kind}: {key}")]
    Conflict { kind: EntityKind, key: String },

    #[error("identity key for {kind} must consist of {expected}, got {actual}")]
    InvalidKey {
        kind: EntityKind,
        expected: String,
        actual: String,
    },

    #[error("stored {kind} document is malformed: {reason}")]
    Malformed { kind: EntityKind, reason: String },

    #[error("storage error: {0}")]
    Store(String),
}

impl ContentError {
    /// Load-time errors are recoverable per record: the offending record is
    /// skipped and the rest of the batch continues.
    pub fn is_record_level(&self) -> bool {
        !matches!(self, ContentError::Store(_) | ContentError::Malformed { .. })
    }
}

impl From<mongodb::error::Error> for ContentError {
    fn from(err: mongodb::error::Error) -> Self {
        ContentError::Store(err.to_string())
    }
}

/// Reasons a grading attempt could not establish success. Every variant is
/// graded as "not passed".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GradingError {
    #[error("{exercise_type} exercise cannot be graded from a {submission} submission")]
    SubmissionMismatch {
        exercise_type: String,
        submission: String,
    },

    #[error("unparseable result from execution service: {0}")]
    Unparseable(String),

    #[error("execution service failed: {0}")]
    Executor(String),
}

/// Failures talking to the external command/sandbox executor or test runner.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("no execution service configured")]
    Unavailable,

    #[error("request to execution service failed: {0}")]
    Transport(String),

    #[error("execution service did not answer within {0} seconds")]
    TimedOut(u64),

    #[error("execution service answered with HTTP {0}")]
    Status(u16),

    #[error("execution service returned an unparseable payload: {0}")]
    Unparseable(String),
}

impl From<ExecutorError> for GradingError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Unparseable(reason) => GradingError::Unparseable(reason),
            other => GradingError::Executor(other.to_string()),
        }
    }
}
