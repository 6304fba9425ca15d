//! Long-running commands (watch, serve)

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use super::{EXIT_ERROR, EXIT_SUCCESS};
use crate::build::{BuildContext, BuildPipeline};
use crate::server::{self, shutdown_signal};
use crate::watch::watch;

/// Build once, then watch sources and serve the output with live reload.
///
/// Runs until Ctrl+C. Recovered transform errors in the initial build are
/// reported but do not stop watching.
pub fn run_watch(ctx: BuildContext) -> ExitCode {
    match BuildPipeline::new(&ctx).build() {
        Ok(result) => tracing::info!("{}", result.summary()),
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    }

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    runtime.block_on(async move {
        let ctx = Arc::new(ctx);
        let stop = Arc::new(AtomicBool::new(false));
        let watcher_done = Arc::new(Notify::new());

        let watcher = {
            let ctx = Arc::clone(&ctx);
            let stop = Arc::clone(&stop);
            let done = Arc::clone(&watcher_done);
            tokio::task::spawn_blocking(move || {
                let result = watch(&ctx, &stop);
                done.notify_one();
                result
            })
        };

        // Stop serving when interrupted or when the watcher gives up
        let shutdown = async move {
            tokio::select! {
                _ = shutdown_signal() => {},
                _ = watcher_done.notified() => {},
            }
        };
        let served = server::serve(&ctx, shutdown).await;
        stop.store(true, Ordering::SeqCst);

        let watched = match watcher.await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("watcher thread failed: {}", e)),
        };

        let mut code = EXIT_SUCCESS;
        if let Err(e) = served {
            tracing::error!("{}", e);
            code = EXIT_ERROR;
        }
        if let Err(e) = watched {
            tracing::error!("{}", e);
            code = EXIT_ERROR;
        }
        ExitCode::from(code)
    })
}

/// Serve the output root with live reload, without building.
pub fn run_serve(ctx: BuildContext) -> ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("failed to start async runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    match runtime.block_on(server::serve(&ctx, shutdown_signal())) {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
