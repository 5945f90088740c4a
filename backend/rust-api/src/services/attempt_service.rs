use anyhow::Context;
use mongodb::bson::{doc, oid::ObjectId};
use redis::aio::ConnectionManager;
use std::collections::HashSet;
use std::sync::Arc;

use super::content_service::ContentService;
use super::executor::{ExecutionRequest, Executor, TestRunRequest, TestRunner};
use crate::error::{ContentError, GradingError};
use crate::grading;
use crate::metrics::{
    record_cache_hit, record_cache_miss, record_cache_operation, record_grade,
    QUIZ_SUBMISSIONS_TOTAL,
};
use crate::models::attempt::{AttemptInput, AttemptRecord, BlockingExercise, ProgressReport, SubmitAttemptRequest};
use crate::models::exercise::{ExerciseSpec, ResourceConstraints};
use crate::models::grading::{GradeFeedback, GradeResult, Submission};
use crate::models::quiz::{QuizScore, QuizSubmissionRequest};
use crate::store::{decode, EntityKind};
use crate::utils::retry::{retry_async_with_config, RetryConfig};
use crate::utils::time::now_bson;

const IDEMPOTENCY_TTL_SECS: u64 = 86_400;

/// Grades learner attempts and answers progression queries.
pub struct AttemptService {
    content: ContentService,
    redis: Option<ConnectionManager>,
    executor: Arc<dyn Executor>,
    test_runner: Arc<dyn TestRunner>,
}

impl AttemptService {
    pub fn new(
        content: ContentService,
        redis: Option<ConnectionManager>,
        executor: Arc<dyn Executor>,
        test_runner: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            content,
            redis,
            executor,
            test_runner,
        }
    }

    /// Grades one attempt and records it. Anything that prevents grading
    /// (unusable stored spec, executor failure, mismatched input) produces a
    /// failed grade rather than an error; only a missing exercise or a store
    /// failure is returned as `Err`.
    pub async fn submit(
        &self,
        exercise_id: &ObjectId,
        req: SubmitAttemptRequest,
    ) -> Result<GradeFeedback, ContentError> {
        let cache_key = req
            .idempotency_key
            .as_deref()
            .map(|key| format!("idempotency:attempt:{}:{}:{}", req.learner_id, exercise_id, key));

        if let Some(key) = &cache_key {
            if let Some(cached) = self.cached_feedback(key).await {
                record_cache_hit();
                tracing::info!("Returning cached feedback for {}", key);
                return Ok(cached);
            }
            record_cache_miss();
        }

        let exercise = self.content.get_exercise(exercise_id).await?;
        let (result, hints, explanation) = match exercise.spec() {
            Ok(spec) => {
                let result = match self.resolve(&spec, &req.attempt).await {
                    Ok(submission) => grading::grade(&spec, &submission),
                    Err(e) => {
                        tracing::warn!(
                            "Attempt on exercise {} could not be graded: {}",
                            exercise_id,
                            e
                        );
                        GradeResult::fail(e.to_string())
                    }
                };
                (result, spec.hints().to_vec(), spec.explanation().map(str::to_string))
            }
            Err(e) => {
                tracing::error!("Stored exercise {} has an unusable spec: {}", exercise_id, e);
                (GradeResult::fail("Exercise cannot be graded"), Vec::new(), None)
            }
        };

        record_grade(exercise.exercise_type.as_str(), result.passed);

        let attempt = AttemptRecord {
            learner_id: req.learner_id.clone(),
            exercise_id: exercise.id,
            micro_lesson_id: exercise.micro_lesson_id,
            submission_kind: req.attempt.kind().to_string(),
            passed: result.passed,
            detail: result.detail.clone(),
            submitted_at: now_bson(),
        };
        let document = mongodb::bson::to_document(&attempt).map_err(|e| ContentError::Malformed {
            kind: EntityKind::Attempt,
            reason: e.to_string(),
        })?;
        self.content
            .store()
            .insert(EntityKind::Attempt, document)
            .await?;

        tracing::info!(
            "Attempt graded: learner={}, exercise={}, passed={}",
            req.learner_id,
            exercise_id,
            result.passed
        );

        let feedback = GradeFeedback {
            exercise_id: exercise.id.to_hex(),
            exercise_type: exercise.exercise_type,
            result,
            hints,
            explanation,
        };

        if let Some(key) = &cache_key {
            self.cache_feedback(key, &feedback).await;
        }
        Ok(feedback)
    }

    /// Turns the learner's input into grading evidence, calling the executor
    /// or test runner when the input has to be run first.
    async fn resolve(
        &self,
        spec: &ExerciseSpec,
        input: &AttemptInput,
    ) -> Result<Submission, GradingError> {
        let submission = match (input, spec) {
            (AttemptInput::Choice { selected: Some(selected) }, _) => Submission::Choice {
                selected: *selected,
            },
            (AttemptInput::Text { answer: Some(answer) }, _) if !answer.trim().is_empty() => {
                Submission::Text {
                    answer: answer.clone(),
                }
            }
            (AttemptInput::Run { command }, ExerciseSpec::Terminal(terminal)) => {
                self.run_command(command.as_deref(), None, terminal.timeout_sec)
                    .await?
            }
            // The sandbox runs the learner's command under the exercise's limits.
            (AttemptInput::Run { command }, ExerciseSpec::Sandbox(sandbox)) => {
                self.run_command(
                    command.as_deref(),
                    Some(sandbox.constraints),
                    sandbox.timeout_sec,
                )
                .await?
            }
            (AttemptInput::Code { source }, ExerciseSpec::Code(code)) => {
                match source.as_deref().filter(|s| !s.trim().is_empty()) {
                    Some(source) => {
                        let report = self
                            .test_runner
                            .run_tests(&TestRunRequest {
                                run: code.tests.run.clone(),
                                source: source.to_string(),
                                tests: code.all_tests().cloned().collect(),
                                language: code.language.clone(),
                                timeout_sec: code.timeout_sec,
                            })
                            .await?;
                        Submission::Tests(report)
                    }
                    None => Submission::Empty,
                }
            }
            (AttemptInput::Choice { selected: None }, _) | (AttemptInput::Text { .. }, _) => {
                Submission::Empty
            }
            (input, spec) => {
                return Err(GradingError::SubmissionMismatch {
                    exercise_type: spec.exercise_type().as_str().to_string(),
                    submission: input.kind().to_string(),
                })
            }
        };
        Ok(submission)
    }

    async fn run_command(
        &self,
        command: Option<&str>,
        constraints: Option<ResourceConstraints>,
        timeout_sec: u64,
    ) -> Result<Submission, GradingError> {
        let Some(command) = command.map(str::trim).filter(|c| !c.is_empty()) else {
            return Ok(Submission::Empty);
        };
        let record = self
            .executor
            .execute(&ExecutionRequest {
                command: command.to_string(),
                constraints,
                timeout_sec,
            })
            .await?;
        Ok(Submission::Execution(record))
    }

    /// A learner may advance past a micro-lesson once every `require_pass`
    /// exercise in it has at least one passing attempt.
    pub async fn progress(
        &self,
        learner_id: &str,
        micro_lesson_id: &ObjectId,
    ) -> Result<ProgressReport, ContentError> {
        let micro_lesson = self.content.get_micro_lesson(micro_lesson_id).await?;

        let passed: HashSet<ObjectId> = self
            .content
            .store()
            .find_many(
                EntityKind::Attempt,
                doc! {
                    "learner_id": learner_id,
                    "micro_lesson_id": micro_lesson.id,
                    "passed": true,
                },
                "submitted_at",
            )
            .await?
            .into_iter()
            .map(decode::<AttemptRecord>)
            .map(|attempt| attempt.map(|a| a.exercise_id))
            .collect::<Result<_, _>>()?;

        let blocking: Vec<BlockingExercise> = self
            .content
            .exercises_for(&micro_lesson.id)
            .await?
            .into_iter()
            .filter(|exercise| exercise.require_pass && !passed.contains(&exercise.id))
            .map(|exercise| BlockingExercise {
                exercise_id: exercise.id.to_hex(),
                title: exercise.title,
                sequence_order: exercise.sequence_order,
            })
            .collect();

        Ok(ProgressReport {
            micro_lesson_id: micro_lesson.id.to_hex(),
            learner_id: learner_id.to_string(),
            can_advance: blocking.is_empty(),
            blocking,
        })
    }

    pub async fn submit_quiz(
        &self,
        quiz_id: &ObjectId,
        req: &QuizSubmissionRequest,
    ) -> Result<QuizScore, ContentError> {
        let quiz = self.content.get_quiz(quiz_id).await?;
        let questions = self.content.quiz_questions(quiz_id).await?;
        let score = grading::score_quiz(&quiz, &questions, &req.answers);

        QUIZ_SUBMISSIONS_TOTAL
            .with_label_values(&[if score.passed { "true" } else { "false" }])
            .inc();
        tracing::info!(
            "Quiz scored: learner={}, quiz={}, {}/{} points, passed={}",
            req.learner_id,
            quiz.title,
            score.earned_points,
            score.possible_points,
            score.passed
        );
        Ok(score)
    }

    /// Cache lookups are best effort; a Redis failure only costs idempotency.
    async fn cached_feedback(&self, cache_key: &str) -> Option<GradeFeedback> {
        let redis = self.redis.as_ref()?;
        let lookup = retry_async_with_config(RetryConfig::default(), || async {
            let mut conn = redis.clone();
            let cached: Option<String> = redis::cmd("GET")
                .arg(cache_key)
                .query_async(&mut conn)
                .await
                .context("Failed to check idempotency cache")?;
            match cached {
                Some(json) => serde_json::from_str::<GradeFeedback>(&json)
                    .map(Some)
                    .context("Failed to deserialize cached feedback"),
                None => Ok(None),
            }
        })
        .await;

        record_cache_operation("get", lookup.is_ok());
        match lookup {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("Idempotency lookup failed for {}: {:#}", cache_key, e);
                None
            }
        }
    }

    async fn cache_feedback(&self, cache_key: &str, feedback: &GradeFeedback) {
        let Some(redis) = self.redis.as_ref() else {
            return;
        };
        let json = match serde_json::to_string(feedback) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!("Failed to serialize feedback for caching: {}", e);
                return;
            }
        };

        let stored = retry_async_with_config(RetryConfig::default(), || async {
            let mut conn = redis.clone();
            redis::cmd("SETEX")
                .arg(cache_key)
                .arg(IDEMPOTENCY_TTL_SECS)
                .arg(&json)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to cache feedback")
        })
        .await;

        record_cache_operation("setex", stored.is_ok());
        if let Err(e) = stored {
            tracing::warn!("Idempotency cache write failed for {}: {:#}", cache_key, e);
        }
    }
}
