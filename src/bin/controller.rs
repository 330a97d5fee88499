//! Fleet-dispatch controller executable.

use std::time::Duration;

use anyhow::Context;
use fleet_dispatch::config::ControllerConfig;
use fleet_dispatch::core::AppResult;
use fleet_dispatch::util::init_tracing;

/// Grace period for blocking tasks (the stdin reader) after `serve` returns.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> AppResult<()> {
    init_tracing();

    let config = ControllerConfig::from_env()
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get().clamp(2, 8))
        .thread_name("fleet-controller")
        .enable_all()
        .build()
        .context("cannot start async runtime")?;

    let result = run(&runtime, config);
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

#[cfg(unix)]
fn run(runtime: &tokio::runtime::Runtime, config: ControllerConfig) -> AppResult<()> {
    runtime.block_on(fleet_dispatch::runtime::serve(config))
}

#[cfg(not(unix))]
fn run(_runtime: &tokio::runtime::Runtime, _config: ControllerConfig) -> AppResult<()> {
    anyhow::bail!("the controller needs named pipes and only runs on unix")
}
