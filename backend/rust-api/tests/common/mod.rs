#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use mongodb::bson::oid::ObjectId;
use serde_json::json;
use std::sync::{Arc, Mutex};

use courseware_api::{
    config::Config,
    create_router,
    error::ExecutorError,
    models::{
        course::ItemType,
        grading::{ExecutionRecord, ExitStatus, TestOutcome, TestReport},
        seed::SeedBatch,
    },
    services::{
        content_service::ContentService,
        executor::{ExecutionRequest, Executor, TestRunRequest, TestRunner},
        seed_service::SeedRunner,
        AppState,
    },
    store::{ContentStore, EntityKind, IdentityKey, MemoryStore},
};

pub const MODULE_TITLE: &str = "Docker Fundamentals";
pub const MICRO_LESSON_TITLE: &str = "Running containers";
pub const QUIZ_TITLE: &str = "Docker basics quiz";

/// Executor and test runner double that replays a canned answer and keeps
/// every request it was given.
pub struct StubExecutor {
    pub record: Result<ExecutionRecord, ExecutorError>,
    pub report: Result<TestReport, ExecutorError>,
    pub executed: Mutex<Vec<ExecutionRequest>>,
    pub test_runs: Mutex<Vec<TestRunRequest>>,
}

impl StubExecutor {
    pub fn new(
        record: Result<ExecutionRecord, ExecutorError>,
        report: Result<TestReport, ExecutorError>,
    ) -> Self {
        Self {
            record,
            report,
            executed: Mutex::new(Vec::new()),
            test_runs: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(Ok(exited(0, "CONTAINER ID   IMAGE\n", "")), Ok(all_passing()))
    }

    pub fn failing(err: ExecutorError) -> Self {
        Self::new(Err(err.clone()), Err(err))
    }
}

#[async_trait]
impl Executor for StubExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionRecord, ExecutorError> {
        self.executed.lock().unwrap().push(request.clone());
        self.record.clone()
    }
}

#[async_trait]
impl TestRunner for StubExecutor {
    async fn run_tests(&self, request: &TestRunRequest) -> Result<TestReport, ExecutorError> {
        self.test_runs.lock().unwrap().push(request.clone());
        self.report.clone()
    }
}

pub fn exited(code: i32, stdout: &str, stderr: &str) -> ExecutionRecord {
    ExecutionRecord {
        exit_status: ExitStatus::Exited { code },
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        elapsed_sec: 0.4,
    }
}

pub fn all_passing() -> TestReport {
    TestReport {
        results: [
            ("TestAdd".to_string(), TestOutcome::Pass),
            ("TestAddNegative".to_string(), TestOutcome::Pass),
        ]
        .into_iter()
        .collect(),
    }
}

pub fn sample_batch_json() -> serde_json::Value {
    json!({
        "modules": [{
            "title": MODULE_TITLE,
            "description": "Images, containers and the daemon",
            "position": 1,
            "items": [
                {
                    "kind": "lesson",
                    "title": "What is a container",
                    "content": "Namespaces and cgroups",
                    "estimated_minutes": 10,
                    "difficulty": "beginner",
                    "key_concepts": ["namespace", "cgroup"]
                },
                {
                    "kind": "micro_lesson",
                    "title": MICRO_LESSON_TITLE,
                    "estimated_minutes": 15,
                    "difficulty": "beginner",
                    "exercises": [
                        {
                            "title": "Pick the run command",
                            "exercise_type": "mcq",
                            "require_pass": true,
                            "exercise_data": {
                                "question": "Which command starts a new container?",
                                "options": ["docker ps", "docker run", "docker rm"],
                                "correct_answer": 1,
                                "hints": ["It creates and starts in one step"],
                                "explanation": "docker run creates and starts a container"
                            }
                        },
                        {
                            "title": "Name the detach flag",
                            "exercise_type": "short_answer",
                            "exercise_data": {
                                "question": "Which flag runs a container in the background?",
                                "answer": "-d"
                            }
                        },
                        {
                            "title": "List containers",
                            "exercise_type": "terminal",
                            "require_pass": true,
                            "exercise_data": {
                                "command": "docker ps",
                                "validation": {
                                    "must_not_include": ["Cannot connect to the Docker daemon"],
                                    "must_include": ["CONTAINER ID"]
                                },
                                "timeout_sec": 10
                            }
                        },
                        {
                            "title": "Limit memory",
                            "exercise_type": "sandbox",
                            "exercise_data": {
                                "run": "docker run --memory 64m alpine echo hi",
                                "constraints": {"cpus": 0.5, "mem_mb": 64},
                                "validation": {"must_not_include": ["OOMKilled"]},
                                "timeout_sec": 30
                            }
                        },
                        {
                            "title": "Implement Add",
                            "exercise_type": "code",
                            "exercise_data": {
                                "starter_code": "package calc\n\nfunc Add(a, b int) int { return 0 }\n",
                                "tests": {
                                    "run": "go test -v ./...",
                                    "visible": ["TestAdd"],
                                    "hidden": ["TestAddNegative"]
                                },
                                "language": "go"
                            }
                        }
                    ]
                },
                {
                    "kind": "quiz",
                    "title": QUIZ_TITLE,
                    "time_limit_minutes": 10,
                    "passing_score": 70,
                    "max_attempts": 3,
                    "questions": [
                        {
                            "question_type": "mcq",
                            "question": "What is a container?",
                            "options": [
                                {"text": "An image on disk"},
                                {"text": "A running instance of an image", "correct": true}
                            ],
                            "points": 2
                        },
                        {
                            "question_type": "command",
                            "question": "List running containers",
                            "correct_answer": "docker ps"
                        }
                    ]
                },
                {
                    "kind": "hands_on_lab",
                    "title": "Networking lab",
                    "description": "Bridge and host networks",
                    "estimated_minutes": 30,
                    "difficulty": "intermediate"
                }
            ]
        }]
    })
}

pub fn sample_batch() -> SeedBatch {
    serde_json::from_value(sample_batch_json()).unwrap()
}

pub fn content_service() -> ContentService {
    ContentService::new(Arc::new(MemoryStore::new()))
}

pub async fn seeded_state(executor: Arc<StubExecutor>) -> Arc<AppState> {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let store: Arc<dyn ContentStore> = Arc::new(MemoryStore::new());
    let test_runner: Arc<dyn TestRunner> = executor.clone();
    let executor: Arc<dyn Executor> = executor;
    let state = Arc::new(AppState::with_store(
        Config::default(),
        store,
        executor,
        test_runner,
    ));

    SeedRunner::new(state.content(), true)
        .apply(&sample_batch())
        .await
        .unwrap();
    state
}

pub async fn create_test_app() -> (Router, Arc<AppState>) {
    let state = seeded_state(Arc::new(StubExecutor::succeeding())).await;
    (create_router(state.clone()), state)
}

pub async fn module_id(state: &AppState) -> ObjectId {
    let module = state
        .store
        .find(EntityKind::CourseModule, &IdentityKey::title(MODULE_TITLE))
        .await
        .unwrap()
        .expect("module is seeded");
    module.get_object_id("_id").unwrap()
}

pub async fn micro_lesson_id(state: &AppState) -> ObjectId {
    state
        .content()
        .find_by_title(ItemType::MicroLesson, MICRO_LESSON_TITLE)
        .await
        .unwrap()
        .expect("micro-lesson is seeded")
}

pub async fn quiz_id(state: &AppState) -> ObjectId {
    state
        .content()
        .find_by_title(ItemType::Quiz, QUIZ_TITLE)
        .await
        .unwrap()
        .expect("quiz is seeded")
}

/// Exercise id by title within the seeded micro-lesson.
pub async fn exercise_id(state: &AppState, title: &str) -> ObjectId {
    let micro_lesson_id = micro_lesson_id(state).await;
    state
        .content()
        .exercises_for(&micro_lesson_id)
        .await
        .unwrap()
        .into_iter()
        .find(|exercise| exercise.title == title)
        .map(|exercise| exercise.id)
        .expect("exercise is seeded")
}
