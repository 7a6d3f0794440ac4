pub const DEFAULT_MAX_WALL_TIME_MS: u64 = 2000;
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
pub const DEFAULT_MAX_SOURCE_BYTES: usize = 100 * 1024;
pub const DEFAULT_MAX_MEMORY_BYTES: u64 = 256 * 1024 * 1024;

pub const STDOUT_TRUNCATED_MARKER: &str = "[Output truncated - exceeded limit]";
pub const STDERR_TRUNCATED_MARKER: &str = "[Error output truncated - exceeded limit]";

/// Largest file the executed program may write into its scratch area.
pub const SCRATCH_FILE_SIZE_LIMIT_BYTES: u64 = 10_000_000;

pub const SCRIPT_FILE_NAME: &str = "main.py";

pub const DEFAULT_BWRAP_PROGRAM: &str = "bwrap";

pub const SERVICE_NAME: &str = "snippet-runner";
