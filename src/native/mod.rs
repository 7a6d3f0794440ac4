/// Native module contains implementations of core traits
/// without container runtimes, running the interpreter as a
/// plain child process confined with rlimits.
pub mod backend;
pub mod executor;
