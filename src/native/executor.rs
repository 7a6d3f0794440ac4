use tokio::time::{Instant, timeout};

use crate::{
    constants::{STDERR_TRUNCATED_MARKER, STDOUT_TRUNCATED_MARKER},
    core::{
        domain::{ExecutionOutcome, SourceProgram},
        limits::ResourceLimits,
        traits::{
            backend::{Backend, Captured, CappedOutput},
            executor::Executor,
        },
    },
};

/// Drives one execution unit per call through any [`Backend`], enforcing the
/// wall-clock and output ceilings from [`ResourceLimits`].
#[derive(Debug)]
pub struct SandboxExecutor<B> {
    backend: B,
    limits: ResourceLimits,
}

impl<B: Backend> SandboxExecutor<B> {
    pub fn new(backend: B, limits: ResourceLimits) -> Self {
        SandboxExecutor { backend, limits }
    }

    fn completed(&self, captured: Captured, duration_ms: u64) -> ExecutionOutcome {
        tracing::debug!(status = ?captured.status, "Execution unit exited");

        ExecutionOutcome {
            truncated_stdout: captured.stdout.truncated,
            truncated_stderr: captured.stderr.truncated,
            stdout: render(captured.stdout, STDOUT_TRUNCATED_MARKER),
            stderr: render(captured.stderr, STDERR_TRUNCATED_MARKER),
            timed_out: false,
            duration_ms,
            launch_error: None,
        }
    }
}

fn render(output: CappedOutput, marker: &str) -> String {
    let mut text = String::from_utf8_lossy(&output.data).into_owned();
    if output.truncated {
        text.push('\n');
        text.push_str(marker);
    }
    text.trim().to_string()
}

#[async_trait::async_trait]
impl<B: Backend> Executor for SandboxExecutor<B> {
    #[tracing::instrument(skip_all)]
    async fn execute(&self, program: &SourceProgram) -> ExecutionOutcome {
        let started = Instant::now();
        let elapsed_ms = || started.elapsed().as_millis() as u64;

        let mut handle = match self.backend.launch(program).await {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!("Execution unit failed to launch: {}", err);
                return ExecutionOutcome::launch_failed(err.to_string(), elapsed_ms());
            }
        };

        let limit = self.limits.max_wall_time();
        let waited = timeout(
            limit,
            self.backend
                .wait(&mut handle, self.limits.max_output_bytes()),
        )
        .await;

        let outcome = match waited {
            Ok(Ok(captured)) => self.completed(captured, elapsed_ms()),
            Ok(Err(err)) => {
                tracing::warn!("Lost track of execution unit: {}", err);
                self.backend.kill(&mut handle).await;
                ExecutionOutcome::launch_failed(err.to_string(), elapsed_ms())
            }
            Err(_) => {
                tracing::info!("Killing execution unit after {:?}", limit);
                self.backend.kill(&mut handle).await;
                ExecutionOutcome::timed_out(limit, elapsed_ms())
            }
        };

        self.backend.cleanup(handle).await;
        outcome
    }
}
