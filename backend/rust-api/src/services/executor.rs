//! Clients for the external command executor and test runner.
//!
//! Both services are reached over HTTP. Calls are bounded by the exercise's
//! own timeout plus a grace period, so a stuck executor turns into a
//! timed-out run instead of a hanging request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::grading::parse_go_test_output;
use crate::metrics::record_executor_call;
use crate::models::exercise::ResourceConstraints;
use crate::models::grading::{ExecutionRecord, ExitStatus, TestOutcome, TestReport};
use crate::utils::retry::{retry_async_with_config, RetryConfig};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExecutionRequest {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<ResourceConstraints>,
    pub timeout_sec: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TestRunRequest {
    pub run: String,
    pub source: String,
    pub tests: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub timeout_sec: u64,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionRecord, ExecutorError>;
}

#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn run_tests(&self, request: &TestRunRequest) -> Result<TestReport, ExecutorError>;
}

/// Stand-in used when no executor URL is configured. Every call fails, which
/// the attempt service grades as not passed.
pub struct UnavailableExecutor;

#[async_trait]
impl Executor for UnavailableExecutor {
    async fn execute(&self, _request: &ExecutionRequest) -> Result<ExecutionRecord, ExecutorError> {
        Err(ExecutorError::Unavailable)
    }
}

#[async_trait]
impl TestRunner for UnavailableExecutor {
    async fn run_tests(&self, _request: &TestRunRequest) -> Result<TestReport, ExecutorError> {
        Err(ExecutorError::Unavailable)
    }
}

/// The runner may answer with structured results or with raw verbose test
/// output.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RunnerResponse {
    Structured { results: BTreeMap<String, TestOutcome> },
    Raw { output: String },
}

impl RunnerResponse {
    fn into_report(self) -> Result<TestReport, ExecutorError> {
        match self {
            RunnerResponse::Structured { results } => Ok(TestReport { results }),
            RunnerResponse::Raw { output } => {
                parse_go_test_output(&output).map_err(|e| ExecutorError::Unparseable(e.to_string()))
            }
        }
    }
}

pub struct HttpExecutor {
    client: reqwest::Client,
    base_url: String,
    grace: Duration,
}

impl HttpExecutor {
    pub fn new(base_url: impl Into<String>, grace: Duration) -> Result<Self, ExecutorError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            grace,
        })
    }

    /// `None` when no executor URL is configured.
    pub fn from_config(config: &ExecutorConfig) -> Option<Self> {
        let url = config.url.as_deref()?;
        match Self::new(url, Duration::from_millis(config.grace_period_ms)) {
            Ok(executor) => Some(executor),
            Err(e) => {
                tracing::error!("Failed to build executor client for {}: {}", url, e);
                None
            }
        }
    }

    fn deadline(&self, timeout_sec: u64) -> Duration {
        Duration::from_secs(timeout_sec) + self.grace
    }

    /// Only connection failures are retried: the request never reached the
    /// service, so nothing ran twice.
    async fn post<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<reqwest::Response, ExecutorError> {
        let url = format!("{}{}", self.base_url, path);
        let retry_cfg = RetryConfig {
            max_attempts: 3,
            ..RetryConfig::default()
        };
        let sent = retry_async_with_config(retry_cfg, || async {
            match self.client.post(&url).json(body).send().await {
                Err(e) if e.is_connect() => Err(e),
                other => Ok(other),
            }
        })
        .await;

        let response = match sent {
            Ok(Ok(response)) => response,
            Ok(Err(e)) | Err(e) => return Err(ExecutorError::Transport(e.to_string())),
        };
        if !response.status().is_success() {
            return Err(ExecutorError::Status(response.status().as_u16()));
        }
        Ok(response)
    }

    async fn call_execute(&self, request: &ExecutionRequest) -> Result<ExecutionRecord, ExecutorError> {
        let response = self.post("/execute", request).await?;
        response
            .json::<ExecutionRecord>()
            .await
            .map_err(|e| ExecutorError::Unparseable(e.to_string()))
    }

    async fn call_tests(&self, request: &TestRunRequest) -> Result<TestReport, ExecutorError> {
        let response = self.post("/tests", request).await?;
        response
            .json::<RunnerResponse>()
            .await
            .map_err(|e| ExecutorError::Unparseable(e.to_string()))?
            .into_report()
    }
}

fn status_label<T>(result: &Result<T, ExecutorError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(ExecutorError::TimedOut(_)) => "timeout",
        Err(ExecutorError::Unparseable(_)) => "unparseable",
        Err(_) => "error",
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionRecord, ExecutorError> {
        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.deadline(request.timeout_sec),
            self.call_execute(request),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    "Executor did not answer within {}s (+{}ms grace), reporting timeout",
                    request.timeout_sec,
                    self.grace.as_millis()
                );
                Ok(ExecutionRecord::timed_out(start.elapsed().as_secs_f64()))
            }
        };

        let status = match &result {
            Ok(record) if record.exit_status == ExitStatus::TimedOut => {
                "timeout"
            }
            other => status_label(other),
        };
        record_executor_call("execute", status, start.elapsed().as_secs_f64());
        result
    }
}

#[async_trait]
impl TestRunner for HttpExecutor {
    async fn run_tests(&self, request: &TestRunRequest) -> Result<TestReport, ExecutorError> {
        let start = Instant::now();
        let result = tokio::time::timeout(self.deadline(request.timeout_sec), self.call_tests(request))
            .await
            .unwrap_or(Err(ExecutorError::TimedOut(request.timeout_sec)));

        record_executor_call("run_tests", status_label(&result), start.elapsed().as_secs_f64());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runner_accepts_structured_results() {
        let response: RunnerResponse =
            serde_json::from_str(r#"{"results": {"TestAdd": "pass", "TestSub": "fail"}}"#).unwrap();
        let report = response.into_report().unwrap();
        assert_eq!(report.results.get("TestAdd"), Some(&TestOutcome::Pass));
        assert_eq!(report.results.get("TestSub"), Some(&TestOutcome::Fail));
    }

    #[test]
    fn runner_accepts_raw_output() {
        let response: RunnerResponse =
            serde_json::from_str(r#"{"output": "--- PASS: TestAdd (0.00s)\nok"}"#).unwrap();
        let report = response.into_report().unwrap();
        assert_eq!(report.results.len(), 1);
    }

    #[test]
    fn raw_output_without_results_is_unparseable() {
        let response: RunnerResponse = serde_json::from_str(r#"{"output": "compile error"}"#).unwrap();
        assert!(matches!(response.into_report(), Err(ExecutorError::Unparseable(_))));
    }

    #[test]
    fn deadline_adds_grace() {
        let executor = HttpExecutor::new("http://executor/", Duration::from_millis(500)).unwrap();
        assert_eq!(executor.deadline(2), Duration::from_millis(2_500));
        assert_eq!(executor.base_url, "http://executor");
    }

    #[test]
    fn execution_request_omits_missing_constraints() {
        let request = ExecutionRequest {
            command: "docker ps".to_string(),
            constraints: None,
            timeout_sec: 30,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("constraints").is_none());
    }

    #[tokio::test]
    async fn unreachable_executor_is_a_transport_error() {
        // Port 9 (discard) is closed on test hosts.
        let executor = HttpExecutor::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        let err = executor
            .execute(&ExecutionRequest {
                command: "true".to_string(),
                constraints: None,
                timeout_sec: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Transport(_)));
    }

    #[tokio::test]
    async fn unavailable_executor_always_fails() {
        let err = UnavailableExecutor
            .run_tests(&TestRunRequest {
                run: "go test -v".to_string(),
                source: String::new(),
                tests: vec![],
                language: None,
                timeout_sec: 10,
            })
            .await
            .unwrap_err();
        assert_eq!(err, ExecutorError::Unavailable);
    }
}
