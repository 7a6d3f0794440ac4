use std::sync::Arc;

use uuid::Uuid;

use crate::core::{
    domain::{RunResult, SourceProgram, TestSpec},
    traits::executor::Executor,
};

pub mod aggregating;
pub mod evaluating;
pub mod executing;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("execution task failed: {0}")]
    ExecutorTask(#[from] tokio::task::JoinError),
}

/// Executes the program once, then judges every test against that single
/// outcome and the original source.
#[tracing::instrument(
    skip_all,
    fields(run_id = %Uuid::new_v4(), source_bytes = program.len(), tests = tests.len())
)]
pub async fn run_submission(
    executor: Arc<dyn Executor>,
    program: SourceProgram,
    tests: Vec<TestSpec>,
) -> Result<RunResult, PipelineError> {
    tracing::debug!("Start execution");
    let (outcome, execution_time_ms) =
        executing::execute_timed(executor, program.clone()).await?;

    let verdicts = evaluating::evaluate_all(program.as_str(), &outcome, &tests);
    let result = aggregating::aggregate(outcome, verdicts, execution_time_ms);

    tracing::info!(
        all_passed = result.all_passed,
        execution_time_ms,
        "Run completed"
    );
    Ok(result)
}
