use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::exercise::ExerciseType;

/// How a captured command run ended, as reported by the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExitStatus {
    Exited { code: i32 },
    TimedOut,
    ResourceLimitExceeded { resource: String },
}

/// Output of one command/sandbox run. Grading never spawns processes; it
/// only inspects records like this one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionRecord {
    pub exit_status: ExitStatus,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub elapsed_sec: f64,
}

impl ExecutionRecord {
    pub fn timed_out(elapsed_sec: f64) -> Self {
        Self {
            exit_status: ExitStatus::TimedOut,
            stdout: String::new(),
            stderr: String::new(),
            elapsed_sec,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TestOutcome {
    Pass,
    Fail,
    Skip,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestReport {
    pub results: BTreeMap<String, TestOutcome>,
}

/// Evidence handed to the grading engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    Empty,
    Choice { selected: usize },
    Text { answer: String },
    Execution(ExecutionRecord),
    Tests(TestReport),
}

impl Submission {
    pub fn kind(&self) -> &'static str {
        match self {
            Submission::Empty => "empty",
            Submission::Choice { .. } => "choice",
            Submission::Text { .. } => "text",
            Submission::Execution(_) => "execution",
            Submission::Tests(_) => "tests",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GradeResult {
    pub passed: bool,
    pub detail: String,
}

impl GradeResult {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            detail: detail.into(),
        }
    }

    pub fn fail(detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            detail: detail.into(),
        }
    }
}

/// What the presentation layer shows after an attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradeFeedback {
    pub exercise_id: String,
    pub exercise_type: ExerciseType,
    #[serde(flatten)]
    pub result: GradeResult,
    pub hints: Vec<String>,
    pub explanation: Option<String>,
}
