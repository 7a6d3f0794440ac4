use std::panic;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::http::AppState;
use crate::native::{
    backend::{Isolation, ProcessBackend},
    executor::SandboxExecutor,
};

mod config;
mod constants;
mod core;
mod http;
mod native;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    set_panic_hook();

    let config = Config::parse();
    let limits = config.limits()?;
    let scratch_root = config.scratch_root();

    tracing::info!(
        interpreter = %config.interpreter,
        scratch_root = %scratch_root.display(),
        "Execution policy: {:?}",
        limits
    );

    let isolation = config.isolation()?;
    if isolation == Isolation::Unconfined {
        tracing::warn!("Execution units run without filesystem or network isolation");
    }

    let backend = ProcessBackend::new(&config.interpreter, scratch_root, &limits)
        .with_args(config.interpreter_args.clone())
        .with_isolation(isolation);
    backend.self_check().await?;
    let executor = Arc::new(SandboxExecutor::new(backend, limits.clone()));

    http::serve(config.bind_addr(), AppState::new(executor, limits)).await?;

    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
