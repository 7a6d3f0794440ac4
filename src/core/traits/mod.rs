pub mod backend;
pub mod executor;
