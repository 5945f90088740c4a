use crate::models::exercise::{OutputValidation, ResourceConstraints};
use crate::models::grading::{ExecutionRecord, ExitStatus, GradeResult};

/// Pass condition shared by terminal and sandbox exercises.
///
/// A run passes only when it exited with the expected code within the time
/// budget, produced none of the forbidden substrings and every required one.
/// Sandbox runs additionally fail when the executor reports a resource limit
/// violation.
pub fn check_execution(
    validation: &OutputValidation,
    timeout_sec: u64,
    constraints: Option<&ResourceConstraints>,
    record: &ExecutionRecord,
) -> GradeResult {
    match &record.exit_status {
        ExitStatus::TimedOut => {
            return GradeResult::fail(format!(
                "Command timed out after {} seconds",
                timeout_sec
            ))
        }
        ExitStatus::ResourceLimitExceeded { resource } => {
            let limits = constraints
                .map(|c| format!(" (limits: {} cpus, {} MB)", c.cpus, c.mem_mb))
                .unwrap_or_default();
            return GradeResult::fail(format!(
                "Resource limit exceeded: {}{}",
                resource, limits
            ));
        }
        ExitStatus::Exited { code } if *code != validation.expected_exit_code => {
            return GradeResult::fail(format!(
                "Command exited with status {} (expected {})",
                code, validation.expected_exit_code
            ));
        }
        ExitStatus::Exited { .. } => {}
    }

    if !record.elapsed_sec.is_finite() || record.elapsed_sec < 0.0 {
        return GradeResult::fail(format!(
            "Execution reported an invalid duration: {}",
            record.elapsed_sec
        ));
    }
    if record.elapsed_sec > timeout_sec as f64 {
        return GradeResult::fail(format!(
            "Command took {:.1}s, longer than the {}s limit",
            record.elapsed_sec, timeout_sec
        ));
    }

    let streams = [record.stdout.as_str(), record.stderr.as_str()];

    if let Some(forbidden) = validation
        .must_not_include
        .iter()
        .find(|needle| streams.iter().any(|stream| stream.contains(needle.as_str())))
    {
        return GradeResult::fail(format!("Output contains forbidden text '{}'", forbidden));
    }

    if let Some(missing) = validation
        .must_include
        .iter()
        .find(|needle| !streams.iter().any(|stream| stream.contains(needle.as_str())))
    {
        return GradeResult::fail(format!("Output is missing expected text '{}'", missing));
    }

    GradeResult::pass(format!(
        "Command succeeded in {:.1}s",
        record.elapsed_sec
    ))
}
