use lazy_static::lazy_static;
use regex::Regex;

use crate::error::GradingError;
use crate::models::exercise::CodeSpec;
use crate::models::grading::{GradeResult, TestOutcome, TestReport};

lazy_static! {
    static ref GO_TEST_RESULT: Regex =
        Regex::new(r"(?m)^\s*--- (PASS|FAIL|SKIP): (\S+)").expect("static regex");
}

/// Every visible and hidden test must report a pass. A test the runner did
/// not report at all counts as failed.
pub fn check_tests(spec: &CodeSpec, report: &TestReport) -> GradeResult {
    let passed = |name: &String| report.results.get(name) == Some(&TestOutcome::Pass);

    let failing_visible: Vec<&str> = spec
        .tests
        .visible
        .iter()
        .filter(|name| !passed(name))
        .map(String::as_str)
        .collect();
    let failing_hidden = spec.tests.hidden.iter().filter(|name| !passed(name)).count();

    if failing_visible.is_empty() && failing_hidden == 0 {
        return GradeResult::pass(format!(
            "All {} tests passed",
            spec.tests.visible.len() + spec.tests.hidden.len()
        ));
    }

    let mut problems = Vec::new();
    if !failing_visible.is_empty() {
        problems.push(format!("failing tests: {}", failing_visible.join(", ")));
    }
    if failing_hidden > 0 {
        // Hidden test names stay hidden.
        problems.push(format!("{} hidden test(s) failed", failing_hidden));
    }
    GradeResult::fail(problems.join("; "))
}

/// Parses verbose `go test` output into a report.
pub fn parse_go_test_output(output: &str) -> Result<TestReport, GradingError> {
    let mut report = TestReport::default();
    for caps in GO_TEST_RESULT.captures_iter(output) {
        let outcome = match &caps[1] {
            "PASS" => TestOutcome::Pass,
            "FAIL" => TestOutcome::Fail,
            _ => TestOutcome::Skip,
        };
        // Subtests are reported as Parent/child; keep the full path.
        report.results.insert(caps[2].to_string(), outcome);
    }

    if report.results.is_empty() {
        return Err(GradingError::Unparseable(
            "test runner output contains no test results".to_string(),
        ));
    }
    Ok(report)
}
