use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, register_int_counter_vec, CounterVec, Encoder,
    HistogramVec, IntCounterVec, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Database Metrics (MongoDB)
    pub static ref DB_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "db_operations_total",
        "Total number of database operations",
        &["operation", "collection", "status"]
    )
    .unwrap();

    pub static ref DB_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "db_operation_duration_seconds",
        "Database operation duration in seconds",
        &["operation", "collection"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();

    // Cache Metrics (Redis idempotency cache)
    pub static ref CACHE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_operations_total",
        "Total number of cache operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref CACHE_HIT_RATIO: CounterVec = register_counter_vec!(
        "cache_hit_ratio",
        "Cache hit/miss ratio",
        &["result"]
    )
    .unwrap();

    // Seeding Metrics
    pub static ref SEED_RECORDS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "seed_records_total",
        "Seeded records by entity kind and outcome",
        &["kind", "outcome"]
    )
    .unwrap();

    // Grading Metrics
    pub static ref GRADES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "grades_total",
        "Graded exercise attempts",
        &["exercise_type", "passed"]
    )
    .unwrap();

    pub static ref QUIZ_SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "quiz_submissions_total",
        "Scored quiz submissions",
        &["passed"]
    )
    .unwrap();

    pub static ref EXECUTOR_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "executor_calls_total",
        "Calls to the command executor and test runner",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref EXECUTOR_CALL_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "executor_call_duration_seconds",
        "Executor call duration in seconds",
        &["operation"],
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track database operation with metrics
pub async fn track_db_operation<F, T>(
    operation: &str,
    collection: &str,
    future: F,
) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    DB_OPERATIONS_TOTAL
        .with_label_values(&[operation, collection, status])
        .inc();

    DB_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation, collection])
        .observe(duration);

    result
}

pub fn record_cache_operation(operation: &str, ok: bool) {
    let status = if ok { "success" } else { "error" };
    CACHE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

pub fn record_cache_hit() {
    CACHE_HIT_RATIO.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_HIT_RATIO.with_label_values(&["miss"]).inc();
}

/// `outcome` is one of created, existing or skipped.
pub fn record_seed(kind: &str, outcome: &str) {
    SEED_RECORDS_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_grade(exercise_type: &str, passed: bool) {
    let passed = if passed { "true" } else { "false" };
    GRADES_TOTAL
        .with_label_values(&[exercise_type, passed])
        .inc();
}

pub fn record_executor_call(operation: &str, status: &str, duration_secs: f64) {
    EXECUTOR_CALLS_TOTAL
        .with_label_values(&[operation, status])
        .inc();
    EXECUTOR_CALL_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        let _ = HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", "/health", "200"])
            .get();
        let _ = SEED_RECORDS_TOTAL
            .with_label_values(&["quiz", "created"])
            .get();
    }

    #[test]
    fn test_render_metrics() {
        record_grade("terminal", true);
        record_seed("module_item", "existing");

        let output = render_metrics().unwrap();
        assert!(output.contains("grades_total"));
        assert!(output.contains("seed_records_total"));
    }
}
