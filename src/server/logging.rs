//! Per-request logging middleware
//!
//! Every request produces exactly one structured line on the instance log
//! stream once it completes: method, path, final status and elapsed time.
//! A request completes when its response body has been fully streamed, or
//! abandoned by the connection.

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use crate::instance::Instance;

/// Records the status code a request finished with
///
/// Only the first status is kept. A connection upgrade counts as 200.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatusRecorder {
    status: Option<StatusCode>,
}

impl StatusRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(if status == StatusCode::SWITCHING_PROTOCOLS {
            StatusCode::OK
        } else {
            status
        });
    }

    /// Final status; 500 if the handler never produced a response
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Guard that writes the request line when dropped
///
/// Dropping covers every exit path: normal return, a cancelled request
/// future, and unwinding.
pub struct RequestLog {
    instance: Arc<Instance>,
    method: Method,
    path: String,
    started: Instant,
    recorder: StatusRecorder,
}

impl RequestLog {
    pub fn start(instance: Arc<Instance>, method: Method, path: impl Into<String>) -> Self {
        Self {
            instance,
            method,
            path: path.into(),
            started: Instant::now(),
            recorder: StatusRecorder::new(),
        }
    }

    pub fn record(&mut self, status: StatusCode) {
        self.recorder.record(status);
    }

    fn line(&self) -> String {
        format!(
            "{} {} {} {:?}",
            self.method,
            self.path,
            self.recorder.status().as_u16(),
            self.started.elapsed()
        )
    }
}

impl Drop for RequestLog {
    fn drop(&mut self) {
        self.instance.log(&self.line());
    }
}

/// Logging middleware, installed with `axum::middleware::from_fn_with_state`
pub async fn log_requests(
    State(instance): State<Arc<Instance>>,
    req: Request,
    next: Next,
) -> Response {
    let mut log = RequestLog::start(instance, req.method().clone(), req.uri().path());

    let res = next.run(req).await;
    log.record(res.status());

    // The guard travels with the body so the line covers the whole transfer
    res.map(|body| Body::new(LoggedBody::new(body, log)))
}

/// Response body that writes the request line once it has been sent
pub struct LoggedBody {
    inner: Body,
    log: Option<RequestLog>,
}

impl LoggedBody {
    pub fn new(inner: Body, log: RequestLog) -> Self {
        Self {
            inner,
            log: Some(log),
        }
    }
}

impl HttpBody for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let frame = Pin::new(&mut self.inner).poll_frame(cx);
        if let Poll::Ready(None) = frame {
            // End of stream: log now rather than whenever the body is dropped
            self.log.take();
        }
        frame
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}
