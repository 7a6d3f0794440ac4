use crate::core::domain::{ExecutionOutcome, SourceProgram};

/// Runs one admitted program to completion or to its limits.
///
/// Implementations never fail: anything that goes wrong with the execution
/// unit is folded into the returned outcome.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Executor: std::fmt::Debug + Send + Sync {
    async fn execute(&self, program: &SourceProgram) -> ExecutionOutcome;
}
