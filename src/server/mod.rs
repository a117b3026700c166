//! HTTP server for the probe endpoints
//!
//! Fixed routes:
//! - `/health`, `/toggleHealth` - Health reporting and flapping
//! - `/closeListener` - Graceful listener shutdown
//! - `/panic`, `/err500` - Simulated failures
//! - `/proxy/get` - Outbound relay
//!
//! Everything else falls through to static files. Every request is wrapped
//! by the logging middleware.

pub mod handlers;
pub mod logging;
pub mod relay;
pub mod shutdown;
pub mod terminate;

pub use shutdown::{
    shutdown_channel, wait_for_signal, ShutdownController, ShutdownReason, ShutdownSignal,
};
pub use terminate::{ProcessTerminator, Terminator};

use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, services::ServeDir};
use tracing::info;

use crate::instance::Instance;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub instance: Arc<Instance>,
    pub shutdown: Arc<ShutdownController>,
    pub terminator: Arc<dyn Terminator>,
}

impl AppState {
    /// Create handler state that exits the real process on `/panic`
    pub fn new(instance: Arc<Instance>, shutdown: ShutdownController) -> Self {
        Self {
            instance,
            shutdown: Arc::new(shutdown),
            terminator: Arc::new(ProcessTerminator),
        }
    }

    pub fn with_terminator(mut self, terminator: Arc<dyn Terminator>) -> Self {
        self.terminator = terminator;
        self
    }
}

/// JSON reply carrying a structured message
pub fn json_reply(instance: &Instance, status: StatusCode, message: &str) -> Response {
    (
        status,
        [(CONTENT_TYPE, "application/json")],
        instance.render(message),
    )
        .into_response()
}

/// Build the router for all probe endpoints
///
/// Middleware order, outermost first: request logging, panic catching.
/// Catching inside the logger means a panicking handler still gets its
/// line, with status 500.
pub fn build_router(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    let instance = state.instance.clone();

    Router::new()
        .route("/proxy/get", any(relay::proxy_get))
        .route("/health", any(handlers::health))
        .route("/closeListener", any(handlers::close_listener))
        .route("/toggleHealth", any(handlers::toggle_health))
        .route("/panic", any(handlers::simulate_panic))
        .route("/err500", any(handlers::err500))
        .fallback_service(ServeDir::new(static_dir.as_ref()))
        .layer(CatchPanicLayer::new())
        .layer(middleware::from_fn_with_state(instance, logging::log_requests))
        .with_state(state)
}

/// Bind the probe listener on all interfaces
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr).await
}

/// Serve `app` on `listener` until `signal` fires, then drain
///
/// Writes the startup line once serving, and the stop lines once every
/// in-flight connection has finished.
pub async fn run_probe_server(
    listener: TcpListener,
    app: Router,
    instance: Arc<Instance>,
    signal: ShutdownSignal,
) -> Result<(), std::io::Error> {
    let port = listener.local_addr()?.port();
    info!(port = %port, "Probe server listening (HTTP)");
    instance.log(&format!("http listener running on port {}", port));

    let mut drain = signal.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = drain.wait().await;
            info!(reason = ?reason, "Draining listener");
        })
        .await;

    if signal.reason() == Some(ShutdownReason::Requested) {
        instance.log("http client connections closed.");
    }
    instance.log("listener stopped.");

    served
}

#[cfg(test)]
mod testing;

#[cfg(test)]
#[path = "handlers_test.rs"]
mod handlers_tests;

#[cfg(test)]
#[path = "logging_test.rs"]
mod logging_tests;

#[cfg(test)]
#[path = "server_test.rs"]
mod server_tests;

#[cfg(test)]
#[path = "shutdown_test.rs"]
mod shutdown_tests;
