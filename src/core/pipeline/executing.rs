use std::sync::Arc;

use tokio::time::Instant;

use crate::core::{
    domain::{ExecutionOutcome, SourceProgram},
    pipeline::PipelineError,
    traits::executor::Executor,
};

/// Runs the program on its own task and measures the wall-clock time of the
/// executor call alone.
///
/// The executor folds unit failures into the outcome, so the only error here
/// is the task itself dying.
pub async fn execute_timed(
    executor: Arc<dyn Executor>,
    program: SourceProgram,
) -> Result<(ExecutionOutcome, u64), PipelineError> {
    let started = Instant::now();
    let outcome = tokio::spawn(async move { executor.execute(&program).await }).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    tracing::debug!(
        timed_out = outcome.timed_out,
        truncated_stdout = outcome.truncated_stdout,
        truncated_stderr = outcome.truncated_stderr,
        "Execution finished in {}ms",
        elapsed_ms
    );

    Ok((outcome, elapsed_ms))
}
