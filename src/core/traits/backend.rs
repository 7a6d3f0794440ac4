use crate::core::domain::SourceProgram;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("failed to prepare scratch area: {0}")]
    Scratch(#[source] std::io::Error),
    #[error("failed to launch {interpreter}: {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to collect output: {0}")]
    Wait(#[source] std::io::Error),
    #[error("sandbox unavailable: {0}")]
    Isolation(String),
}

/// Raw streams of a unit that ran to completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captured {
    pub status: Option<i32>,
    pub stdout: CappedOutput,
    pub stderr: CappedOutput,
}

/// The first `limit` bytes of a stream plus whether anything was dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CappedOutput {
    pub data: Vec<u8>,
    pub truncated: bool,
}

/// Capability interface over isolated execution units.
///
/// A handle owns every resource of its unit. Dropping it must tear the unit
/// down, so callers that are cancelled mid-run still leak nothing; `cleanup`
/// is the orderly version of the same thing.
#[async_trait::async_trait]
pub trait Backend: std::fmt::Debug + Send + Sync {
    type Handle: Send;

    async fn launch(&self, program: &SourceProgram) -> Result<Self::Handle, BackendError>;

    /// Waits for the unit to exit while collecting at most
    /// `max_output_bytes` of each stream. Has no deadline of its own.
    async fn wait(
        &self,
        handle: &mut Self::Handle,
        max_output_bytes: usize,
    ) -> Result<Captured, BackendError>;

    async fn kill(&self, handle: &mut Self::Handle);

    async fn cleanup(&self, handle: Self::Handle);
}
