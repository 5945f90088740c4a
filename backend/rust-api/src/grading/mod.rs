//! Grading engine.
//!
//! `grade` is a pure function of an exercise spec and the evidence a learner
//! produced. It never spawns processes or talks to the network, so the same
//! inputs always give the same result. Anything that cannot establish success
//! is reported as a failed grade.

use crate::error::GradingError;
use crate::models::exercise::{ExerciseSpec, McqSpec, Normalization, ShortAnswerSpec};
use crate::models::grading::{GradeResult, Submission};

pub mod code;
pub mod execution;
pub mod quiz;

pub use code::parse_go_test_output;
pub use quiz::{grade_question, score_quiz};

pub fn grade(spec: &ExerciseSpec, submission: &Submission) -> GradeResult {
    match evaluate(spec, submission) {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(
                "Grading {} exercise failed closed: {}",
                spec.exercise_type().as_str(),
                err
            );
            GradeResult::fail(err.to_string())
        }
    }
}

fn evaluate(spec: &ExerciseSpec, submission: &Submission) -> Result<GradeResult, GradingError> {
    if matches!(submission, Submission::Empty) {
        return Ok(GradeResult::fail("No answer was submitted"));
    }

    match (spec, submission) {
        (ExerciseSpec::Mcq(mcq), Submission::Choice { selected }) => Ok(grade_mcq(mcq, *selected)),
        (ExerciseSpec::ShortAnswer(short), Submission::Text { answer }) => {
            Ok(grade_short_answer(short, answer))
        }
        (ExerciseSpec::Terminal(terminal), Submission::Execution(record)) => Ok(
            execution::check_execution(&terminal.validation, terminal.timeout_sec, None, record),
        ),
        (ExerciseSpec::Sandbox(sandbox), Submission::Execution(record)) => {
            Ok(execution::check_execution(
                &sandbox.validation,
                sandbox.timeout_sec,
                Some(&sandbox.constraints),
                record,
            ))
        }
        (ExerciseSpec::Code(code), Submission::Tests(report)) => Ok(code::check_tests(code, report)),
        (spec, submission) => Err(GradingError::SubmissionMismatch {
            exercise_type: spec.exercise_type().as_str().to_string(),
            submission: submission.kind().to_string(),
        }),
    }
}

fn grade_mcq(spec: &McqSpec, selected: usize) -> GradeResult {
    if spec.options.is_empty() {
        return GradeResult::fail("Exercise has no answer options");
    }
    if selected >= spec.options.len() {
        return GradeResult::fail(format!(
            "Option {} does not exist; choose between 0 and {}",
            selected,
            spec.options.len().saturating_sub(1)
        ));
    }
    if selected == spec.correct_answer {
        GradeResult::pass("Correct answer")
    } else {
        GradeResult::fail(format!("'{}' is not the correct answer", spec.options[selected]))
    }
}

/// Applies the configured normalization to a free-text answer.
pub fn normalize(text: &str, normalization: &Normalization) -> String {
    let mut value = if normalization.trim {
        text.trim().to_string()
    } else {
        text.to_string()
    };
    if normalization.collapse_whitespace {
        value = value.split_whitespace().collect::<Vec<_>>().join(" ");
    }
    if normalization.case_insensitive {
        value = value.to_lowercase();
    }
    value
}

fn grade_short_answer(spec: &ShortAnswerSpec, answer: &str) -> GradeResult {
    if answer.trim().is_empty() {
        return GradeResult::fail("No answer was submitted");
    }
    // Exact comparison after normalization; no numeric tolerance.
    if normalize(answer, &spec.normalization) == normalize(&spec.answer, &spec.normalization) {
        GradeResult::pass("Correct answer")
    } else {
        GradeResult::fail("Answer does not match the expected value")
    }
}
