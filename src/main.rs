use anyhow::Context;
use probe::config::Config;
use probe::instance::Instance;
use probe::server::{
    bind, build_router, run_probe_server, shutdown_channel, wait_for_signal, AppState,
    ShutdownReason,
};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Initialize tracing
///
/// Diagnostics go to stderr; stdout is reserved for the JSON message stream.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!(version = %config.version, "Starting probe server");

    let instance = Arc::new(
        Instance::new(config.version.clone(), config.relay_timeout)
            .context("failed to build outbound HTTP client")?,
    );

    // Bind failure is fatal: no retry, exit status 1
    let listener = match bind(config.port).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(port = config.port, error = %e, "Failed to bind listener");
            return Err(e).with_context(|| format!("failed to bind port {}", config.port));
        }
    };

    // Create shutdown channel for coordinated shutdown
    let (shutdown_controller, shutdown_signal) = shutdown_channel();
    let shutdown = shutdown_controller.subscribe();

    let state = AppState::new(instance.clone(), shutdown_controller);
    let controller = state.shutdown.clone();
    let app = build_router(state, &config.static_dir);

    let mut server = tokio::spawn(run_probe_server(
        listener,
        app,
        instance.clone(),
        shutdown_signal,
    ));

    // Run until a termination signal arrives or the listener stops on its own
    let finished = tokio::select! {
        result = &mut server => Some(result),
        signal = wait_for_signal() => {
            info!(signal = signal, "Initiating graceful shutdown");
            controller.shutdown(ShutdownReason::Signal(signal));
            None
        }
    };
    let server_result = match finished {
        Some(result) => result,
        // Wait for in-flight requests to drain
        None => server.await,
    };

    match server_result {
        Ok(Ok(())) => info!(reason = ?shutdown.reason(), "Listener drained"),
        Ok(Err(e)) => warn!(error = %e, "Probe server failed"),
        Err(e) => warn!(error = %e, "Probe server task failed"),
    }

    instance.log("exited.");
    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
