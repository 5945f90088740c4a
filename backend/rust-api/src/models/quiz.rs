use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

use super::course::Difficulty;
use crate::store::{Entity, EntityKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    TrueFalse,
    Command,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::Mcq => "mcq",
            QuestionType::TrueFalse => "true_false",
            QuestionType::Command => "command",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionOption {
    pub text: String,
    #[serde(default)]
    pub correct: bool,
    #[serde(default)]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub time_limit_minutes: i32,
    pub passing_score: i32,
    pub max_attempts: i32,
    #[serde(default)]
    pub shuffle_questions: bool,
    pub created_at: BsonDateTime,
}

impl Entity for QuizRecord {
    const KIND: EntityKind = EntityKind::Quiz;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestionRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub quiz_id: ObjectId,
    pub sequence_order: i32,
    pub question_type: QuestionType,
    pub question: String,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default)]
    pub correct_answer: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(default = "default_points")]
    pub points: i32,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    pub created_at: BsonDateTime,
}

impl Entity for QuizQuestionRecord {
    const KIND: EntityKind = EntityKind::QuizQuestion;
}

pub fn default_points() -> i32 {
    1
}

/// Checks the per-kind field contract of a quiz question.
pub fn validate_question(
    question_type: QuestionType,
    question: &str,
    options: &[QuestionOption],
    correct_answer: Option<&str>,
) -> Result<(), String> {
    if question.trim().is_empty() {
        return Err("question text is empty".to_string());
    }

    match question_type {
        QuestionType::Mcq | QuestionType::TrueFalse => {
            if question_type == QuestionType::TrueFalse && options.len() != 2 {
                return Err(format!(
                    "true_false questions need exactly 2 options, got {}",
                    options.len()
                ));
            }
            if options.len() < 2 {
                return Err(format!(
                    "mcq questions need at least 2 options, got {}",
                    options.len()
                ));
            }
            let correct = options.iter().filter(|option| option.correct).count();
            if correct != 1 {
                return Err(format!(
                    "exactly one option must be marked correct, found {}",
                    correct
                ));
            }
            Ok(())
        }
        QuestionType::Command => match correct_answer {
            Some(answer) if !answer.trim().is_empty() => Ok(()),
            _ => Err("command questions need a non-empty correct_answer".to_string()),
        },
    }
}

/// A learner's answer to one question: an option index for choice questions
/// or free text for command questions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum QuestionResponse {
    Choice(usize),
    Text(String),
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuizSubmissionRequest {
    #[validate(length(min = 1, max = 128, message = "learner_id must not be empty"))]
    pub learner_id: String,
    /// Keyed by question sequence order.
    #[serde(default)]
    pub answers: HashMap<i32, QuestionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionResult {
    pub sequence_order: i32,
    pub correct: bool,
    pub points_awarded: i32,
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizScore {
    pub quiz_id: String,
    pub earned_points: i64,
    pub possible_points: i64,
    pub percentage: f64,
    pub passing_score: i32,
    pub passed: bool,
    pub results: Vec<QuestionResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn option(text: &str, correct: bool) -> QuestionOption {
        QuestionOption {
            text: text.to_string(),
            correct,
            explanation: None,
        }
    }

    #[test]
    fn mcq_needs_exactly_one_correct_option() {
        let ok = [option("H2O", true), option("CO2", false), option("O2", false)];
        assert!(validate_question(QuestionType::Mcq, "Water?", &ok, None).is_ok());

        let none = [option("H2O", false), option("CO2", false)];
        assert!(validate_question(QuestionType::Mcq, "Water?", &none, None).is_err());

        let two = [option("H2O", true), option("CO2", true)];
        let err = validate_question(QuestionType::Mcq, "Water?", &two, None).unwrap_err();
        assert!(err.contains("found 2"));
    }

    #[test]
    fn true_false_needs_two_options() {
        let three = [option("True", true), option("False", false), option("Maybe", false)];
        assert!(validate_question(QuestionType::TrueFalse, "Is it?", &three, None).is_err());

        let two = [option("True", false), option("False", true)];
        assert!(validate_question(QuestionType::TrueFalse, "Is it?", &two, None).is_ok());
    }

    #[test]
    fn command_needs_canonical_answer() {
        assert!(validate_question(QuestionType::Command, "List images", &[], Some("docker images")).is_ok());
        assert!(validate_question(QuestionType::Command, "List images", &[], Some("  ")).is_err());
        assert!(validate_question(QuestionType::Command, "List images", &[], None).is_err());
    }

    #[test]
    fn question_response_is_untagged() {
        let choice: QuestionResponse = serde_json::from_str("2").unwrap();
        assert_eq!(choice, QuestionResponse::Choice(2));
        let text: QuestionResponse = serde_json::from_str("\"docker ps\"").unwrap();
        assert_eq!(text, QuestionResponse::Text("docker ps".to_string()));
    }

    #[test]
    fn submission_answers_are_keyed_by_sequence() {
        let req: QuizSubmissionRequest = serde_json::from_str(
            r#"{"learner_id": "l-1", "answers": {"1": 0, "2": "docker ps"}}"#,
        )
        .unwrap();
        assert_eq!(req.answers.get(&1), Some(&QuestionResponse::Choice(0)));
        assert_eq!(
            req.answers.get(&2),
            Some(&QuestionResponse::Text("docker ps".to_string()))
        );
    }
}
