use std::collections::HashMap;

use crate::models::quiz::{
    QuestionResponse, QuestionResult, QuestionType, QuizQuestionRecord, QuizRecord, QuizScore,
};

/// Grades one quiz question. Unanswered or wrongly-shaped responses earn
/// nothing.
pub fn grade_question(
    question: &QuizQuestionRecord,
    response: Option<&QuestionResponse>,
) -> QuestionResult {
    let correct = match (question.question_type, response) {
        (QuestionType::Mcq | QuestionType::TrueFalse, Some(QuestionResponse::Choice(index))) => {
            question
                .options
                .get(*index)
                .map(|option| option.correct)
                .unwrap_or(false)
        }
        (QuestionType::Command, Some(QuestionResponse::Text(answer))) => question
            .correct_answer
            .as_deref()
            .map(|expected| {
                let answer = answer.trim();
                !answer.is_empty() && answer == expected.trim()
            })
            .unwrap_or(false),
        _ => false,
    };

    QuestionResult {
        sequence_order: question.sequence_order,
        correct,
        points_awarded: if correct { question.points.max(0) } else { 0 },
        explanation: question.explanation.clone(),
    }
}

/// Scores a full submission against the quiz's passing threshold.
pub fn score_quiz(
    quiz: &QuizRecord,
    questions: &[QuizQuestionRecord],
    answers: &HashMap<i32, QuestionResponse>,
) -> QuizScore {
    let mut ordered: Vec<&QuizQuestionRecord> = questions.iter().collect();
    ordered.sort_by_key(|question| question.sequence_order);

    let results: Vec<QuestionResult> = ordered
        .iter()
        .map(|question| grade_question(question, answers.get(&question.sequence_order)))
        .collect();

    let earned_points: i64 = results.iter().map(|result| i64::from(result.points_awarded)).sum();
    let possible_points: i64 = ordered
        .iter()
        .map(|question| i64::from(question.points.max(0)))
        .sum();

    // A quiz with nothing to score can never be passed.
    let percentage = if possible_points > 0 {
        earned_points as f64 * 100.0 / possible_points as f64
    } else {
        0.0
    };
    let passed = possible_points > 0 && percentage >= f64::from(quiz.passing_score);

    QuizScore {
        quiz_id: quiz.id.to_hex(),
        earned_points,
        possible_points,
        percentage,
        passing_score: quiz.passing_score,
        passed,
        results,
    }
}
