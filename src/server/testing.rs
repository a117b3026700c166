//! Shared fixtures for server tests

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode},
    Router,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use super::terminate::RecordingTerminator;
use super::{build_router, run_probe_server, shutdown_channel, AppState, ShutdownSignal};
use crate::instance::sink::MemorySink;
use crate::instance::{Instance, InstanceBuilder, LogSink};

/// Probe wired with an in-memory log stream and a recording terminator
pub struct TestProbe {
    pub instance: Arc<Instance>,
    pub log: MemorySink,
    pub terminator: Arc<RecordingTerminator>,
    pub state: AppState,
    pub signal: ShutdownSignal,
    static_dir: PathBuf,
}

impl TestProbe {
    pub fn new() -> Self {
        Self::with_builder(Instance::builder())
    }

    pub fn with_builder(builder: InstanceBuilder) -> Self {
        let log = MemorySink::new();
        let instance = Arc::new(builder.log_sink(LogSink::new(log.clone())).build().unwrap());
        let terminator = Arc::new(RecordingTerminator::default());
        let (controller, signal) = shutdown_channel();
        let state = AppState::new(instance.clone(), controller).with_terminator(terminator.clone());

        Self {
            instance,
            log,
            terminator,
            state,
            signal,
            static_dir: PathBuf::from("/nonexistent/probe-static"),
        }
    }

    pub fn static_dir(mut self, dir: &Path) -> Self {
        self.static_dir = dir.to_path_buf();
        self
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone(), &self.static_dir)
    }

    /// Log lines' `message` fields
    pub fn log_messages(&self) -> Vec<String> {
        self.log
            .messages()
            .iter()
            .map(|m| m["message"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Serve the router on an OS-assigned port
    pub async fn serve(&self) -> (SocketAddr, JoinHandle<std::io::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(run_probe_server(
            listener,
            self.router(),
            self.instance.clone(),
            self.signal.clone(),
        ));
        (addr, handle)
    }
}

/// Drive one request through `app` in-process
pub async fn send(app: Router, method: Method, uri: &str, body: impl Into<Body>) -> Reply {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(body.into())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    Reply {
        status,
        headers,
        body,
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Reply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn message(&self) -> String {
        self.json()["message"].as_str().unwrap().to_string()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(axum::http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Parse the `{:?}` rendering of a `Duration` from a request line
pub fn parse_elapsed(text: &str) -> std::time::Duration {
    let (value, scale) = if let Some(v) = text.strip_suffix("ns") {
        (v, 1e-9)
    } else if let Some(v) = text.strip_suffix("µs") {
        (v, 1e-6)
    } else if let Some(v) = text.strip_suffix("ms") {
        (v, 1e-3)
    } else if let Some(v) = text.strip_suffix('s') {
        (v, 1.0)
    } else {
        panic!("not a duration: {}", text);
    };
    std::time::Duration::from_secs_f64(value.parse::<f64>().unwrap() * scale)
}

/// Body that yields `chunks` copies of `chunk`, pausing `gap` between them
pub fn dripping_body(chunk: &'static str, chunks: usize, gap: std::time::Duration) -> Body {
    use futures::StreamExt;

    let stream = futures::stream::iter(0..chunks).then(move |i| async move {
        if i > 0 {
            tokio::time::sleep(gap).await;
        }
        Ok::<_, std::convert::Infallible>(Bytes::from_static(chunk.as_bytes()))
    });
    Body::from_stream(stream)
}
