//! Process bootstrap: claims the controller pipe, wires the tasks together and
//! tears everything down on `terminar`, SIGINT or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::builders::ControllerBuilder;
use crate::config::ControllerConfig;
use crate::core::{AppResult, Controller};
use crate::infra::outbox::{ControllerPipe, FifoOutbox};
use crate::runtime::admin::{execute, AdminCommand, AdminOutcome, BANNER};

/// Pause after a failed read on the controller pipe.
const LISTEN_BACKOFF: Duration = Duration::from_millis(100);

/// Run the controller until shutdown.
///
/// # Errors
///
/// Fails before any state exists if another controller is running, the pipe
/// cannot be created, or the configuration is invalid.
pub async fn serve(config: ControllerConfig) -> AppResult<()> {
    let pipe_path = config.channel.controller_pipe_path();
    let pipe = ControllerPipe::create(&pipe_path)
        .with_context(|| format!("cannot claim {}", pipe_path.display()))?;
    let outbox = Arc::new(FifoOutbox::new(
        config.channel.dir.clone(),
        config.channel.client_pipe_prefix.clone(),
    ));

    let controller = ControllerBuilder::new(config)
        .with_outbox(outbox)
        .build()
        .context("cannot build controller")?;

    let cfg = controller.config();
    info!(
        vehicles = cfg.max_vehicles,
        clients = cfg.max_clients,
        schedule = cfg.max_schedule,
        tick_ms = cfg.tick_ms,
        pid = std::process::id(),
        "controller started"
    );
    println!("{BANNER}");

    let clock = controller.spawn_clock();
    let reconciler = controller.spawn_reconciler();
    let listener = tokio::spawn(listen(Arc::clone(&controller), pipe));
    let console = tokio::spawn(admin_console(Arc::clone(&controller)));

    let token = controller.shutdown_token();
    tokio::select! {
        () = token.cancelled() => {}
        () = shutdown_signal() => info!("termination signal received"),
    }

    controller.shutdown().await;
    console.abort();
    for (name, task) in [("clock", clock), ("reconciler", reconciler), ("listener", listener)] {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "task ended abnormally");
        }
    }
    Ok(())
}

async fn listen(controller: Arc<Controller>, mut pipe: ControllerPipe) {
    let token = controller.shutdown_token();
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            next = pipe.next_message() => match next {
                Ok(message) => controller.handle_message(message).await,
                Err(e) => {
                    error!(path = %pipe.path().display(), error = %e, "controller pipe read failed");
                    tokio::time::sleep(LISTEN_BACKOFF).await;
                }
            },
        }
    }
}

async fn admin_console(controller: Arc<Controller>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let token = controller.shutdown_token();
    loop {
        let line = tokio::select! {
            () = token.cancelled() => break,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("admin console closed");
                break;
            }
            Err(e) => {
                warn!(error = %e, "admin console read failed");
                break;
            }
        };
        match AdminCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(command)) => match execute(&controller, command).await {
                AdminOutcome::Output(text) => println!("{text}"),
                AdminOutcome::Shutdown => {
                    token.cancel();
                    break;
                }
            },
            Err(e) => error!(line = %line.trim(), error = %e, "admin command rejected"),
        }
    }
}

async fn shutdown_signal() {
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "SIGTERM handler unavailable");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}
