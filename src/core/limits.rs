use std::time::Duration;

use crate::{
    constants::{
        DEFAULT_MAX_MEMORY_BYTES, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_SOURCE_BYTES,
        DEFAULT_MAX_WALL_TIME_MS,
    },
    core::domain::SourceProgram,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LimitsError {
    #[error("{name} must be greater than zero")]
    Zero { name: &'static str },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("No code provided")]
    Empty,
    #[error("Code exceeds maximum size ({max} bytes)")]
    SizeExceeded { size: usize, max: usize },
}

/// Execution policy. Built once at startup and treated as hard ceilings by
/// everything downstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceLimits {
    max_wall_time_ms: u64,
    max_output_bytes: usize,
    max_source_bytes: usize,
    max_memory_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_wall_time_ms: DEFAULT_MAX_WALL_TIME_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_memory_bytes: DEFAULT_MAX_MEMORY_BYTES,
        }
    }
}

impl ResourceLimits {
    pub fn new(
        max_wall_time_ms: u64,
        max_output_bytes: usize,
        max_source_bytes: usize,
    ) -> Result<Self, LimitsError> {
        if max_wall_time_ms == 0 {
            return Err(LimitsError::Zero {
                name: "max_wall_time_ms",
            });
        }
        if max_output_bytes == 0 {
            return Err(LimitsError::Zero {
                name: "max_output_bytes",
            });
        }
        if max_source_bytes == 0 {
            return Err(LimitsError::Zero {
                name: "max_source_bytes",
            });
        }

        Ok(Self {
            max_wall_time_ms,
            max_output_bytes,
            max_source_bytes,
            ..Self::default()
        })
    }

    /// Address-space ceiling for one execution unit.
    pub fn with_max_memory_bytes(self, max_memory_bytes: u64) -> Result<Self, LimitsError> {
        if max_memory_bytes == 0 {
            return Err(LimitsError::Zero {
                name: "max_memory_bytes",
            });
        }

        Ok(Self {
            max_memory_bytes,
            ..self
        })
    }

    pub fn max_wall_time(&self) -> Duration {
        Duration::from_millis(self.max_wall_time_ms)
    }

    pub fn max_output_bytes(&self) -> usize {
        self.max_output_bytes
    }

    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    /// Size gate in front of the sandbox. Only a length comparison, so it
    /// runs before any execution resource is allocated.
    #[tracing::instrument(skip(code), fields(size = code.len()))]
    pub fn admit(&self, code: String) -> Result<SourceProgram, AdmissionError> {
        if code.is_empty() {
            return Err(AdmissionError::Empty);
        }
        if code.len() > self.max_source_bytes {
            tracing::debug!("Rejecting oversized source");
            return Err(AdmissionError::SizeExceeded {
                size: code.len(),
                max: self.max_source_bytes,
            });
        }

        Ok(SourceProgram::admitted(code))
    }
}
