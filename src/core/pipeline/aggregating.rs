use crate::core::domain::{ExecutionOutcome, RunResult, TestVerdict};

pub fn aggregate(
    outcome: ExecutionOutcome,
    test_results: Vec<TestVerdict>,
    execution_time_ms: u64,
) -> RunResult {
    // vacuously true for an empty batch
    let all_passed = test_results.iter().all(|verdict| verdict.passed);
    let stderr = outcome.effective_stderr().into_owned();

    RunResult {
        success: true,
        stdout: outcome.stdout,
        stderr,
        test_results,
        execution_time_ms,
        all_passed,
    }
}
