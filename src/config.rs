use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::{
    constants::{
        DEFAULT_BWRAP_PROGRAM, DEFAULT_MAX_MEMORY_BYTES, DEFAULT_MAX_OUTPUT_BYTES,
        DEFAULT_MAX_SOURCE_BYTES, DEFAULT_MAX_WALL_TIME_MS, SERVICE_NAME,
    },
    core::{
        limits::{LimitsError, ResourceLimits},
        traits::backend::BackendError,
    },
    native::backend::Isolation,
};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum IsolationMode {
    /// Read-only host filesystem, private /tmp, no network
    Bubblewrap,
    /// Plain child processes; only for hosts that are already a disposable sandbox
    Unconfined,
}

/// Startup configuration. Every flag can also come from the environment.
#[derive(Parser, Debug, Clone)]
#[command(name = "snippet-runner", version, about = "Runs untrusted snippets under strict limits and grades them")]
pub struct Config {
    #[arg(long, env = "RUNNER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    #[arg(long, env = "RUNNER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Wall-clock budget for one execution, in milliseconds
    #[arg(long, env = "RUNNER_MAX_WALL_TIME_MS", default_value_t = DEFAULT_MAX_WALL_TIME_MS)]
    pub max_wall_time_ms: u64,

    /// Per-stream cap on captured output, in bytes
    #[arg(long, env = "RUNNER_MAX_OUTPUT_BYTES", default_value_t = DEFAULT_MAX_OUTPUT_BYTES)]
    pub max_output_bytes: usize,

    /// Largest accepted program, in bytes
    #[arg(long, env = "RUNNER_MAX_SOURCE_BYTES", default_value_t = DEFAULT_MAX_SOURCE_BYTES)]
    pub max_source_bytes: usize,

    /// Address-space ceiling for one execution, in bytes
    #[arg(long, env = "RUNNER_MAX_MEMORY_BYTES", default_value_t = DEFAULT_MAX_MEMORY_BYTES)]
    pub max_memory_bytes: u64,

    #[arg(long, env = "RUNNER_ISOLATION", value_enum, default_value_t = IsolationMode::Bubblewrap)]
    pub isolation: IsolationMode,

    /// bubblewrap executable, looked up on PATH unless it contains a slash
    #[arg(long, env = "RUNNER_BWRAP", default_value = DEFAULT_BWRAP_PROGRAM)]
    pub bwrap: String,

    #[arg(long, env = "RUNNER_INTERPRETER", default_value = "python3")]
    pub interpreter: String,

    /// Arguments placed before the script path, comma separated in the environment
    #[arg(
        long = "interpreter-arg",
        env = "RUNNER_INTERPRETER_ARGS",
        value_delimiter = ',',
        default_value = "-u",
        allow_hyphen_values = true
    )]
    pub interpreter_args: Vec<String>,

    /// Parent directory for per-run scratch areas [default: <tmp>/snippet-runner]
    #[arg(long, env = "RUNNER_SCRATCH_ROOT")]
    pub scratch_root: Option<PathBuf>,
}

impl Config {
    pub fn limits(&self) -> Result<ResourceLimits, LimitsError> {
        ResourceLimits::new(
            self.max_wall_time_ms,
            self.max_output_bytes,
            self.max_source_bytes,
        )?
        .with_max_memory_bytes(self.max_memory_bytes)
    }

    pub fn isolation(&self) -> Result<Isolation, BackendError> {
        match self.isolation {
            IsolationMode::Bubblewrap => Isolation::bubblewrap(&self.bwrap),
            IsolationMode::Unconfined => Ok(Isolation::Unconfined),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(SERVICE_NAME))
    }
}
