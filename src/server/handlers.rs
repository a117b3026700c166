//! Endpoint handlers
//!
//! - `/health` - Reports the current health code
//! - `/toggleHealth` - Flips the health code between 200 and 500
//! - `/closeListener` - Starts a graceful drain of the listener
//! - `/panic` - Terminates the process once the reply is sent
//! - `/err500` - Always fails with 500
//!
//! The relay endpoint lives in `relay.rs`.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{
        header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE},
        HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use futures::Stream;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

use super::shutdown::ShutdownReason;
use super::{json_reply, AppState};

/// Time given to the connection to flush the `/panic` reply before exiting
pub const PANIC_FLUSH_GRACE: Duration = Duration::from_millis(50);

pub const ERR500_MESSAGE: &str = "This response is an error 500, as requested.";

/// Health probe handler
///
/// Returns the instance's current health code (200 or 500).
pub async fn health(State(state): State<AppState>) -> Response {
    let mut res = json_reply(&state.instance, state.instance.health(), "hello.");
    res.headers_mut()
        .insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    res
}

pub async fn toggle_health(State(state): State<AppState>) -> Response {
    let code = state.instance.toggle_health();
    json_reply(
        &state.instance,
        StatusCode::OK,
        &format!("/health will now return http status code {}", code.as_u16()),
    )
}

/// Acknowledge, then drain the listener in the background
///
/// The drain lets this request finish, so the reply reaches the caller
/// before the listener goes away.
pub async fn close_listener(State(state): State<AppState>) -> Response {
    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        shutdown.shutdown(ShutdownReason::Requested);
    });
    json_reply(&state.instance, StatusCode::OK, "listener will close.")
}

/// Acknowledge, then terminate the process with exit code 1
///
/// The exit waits until the connection has consumed the whole reply body,
/// plus `PANIC_FLUSH_GRACE`.
pub async fn simulate_panic(State(state): State<AppState>) -> Response {
    let body = state.instance.render("panic requested");
    let (body, sent) = notify_when_sent(body);

    let terminator = state.terminator.clone();
    tokio::spawn(async move {
        // Err means the body was dropped without being sent, e.g. the
        // client went away. Exit regardless.
        let _ = sent.await;
        tokio::time::sleep(PANIC_FLUSH_GRACE).await;
        terminator.terminate(1);
    });

    (
        StatusCode::OK,
        [(CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response()
}

pub async fn err500(State(state): State<AppState>) -> Response {
    json_reply(&state.instance, StatusCode::INTERNAL_SERVER_ERROR, ERR500_MESSAGE)
}

/// Build a body that fires the returned receiver once the server drops it
fn notify_when_sent(bytes: Vec<u8>) -> (Body, oneshot::Receiver<()>) {
    let (tx, rx) = oneshot::channel();
    let stream = NotifyOnDrop {
        chunk: Some(Bytes::from(bytes)),
        tx: Some(tx),
    };
    (Body::from_stream(stream), rx)
}

/// Single-chunk body stream that signals when it is dropped
struct NotifyOnDrop {
    chunk: Option<Bytes>,
    tx: Option<oneshot::Sender<()>>,
}

impl Stream for NotifyOnDrop {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Ready(self.chunk.take().map(Ok))
    }
}

impl Drop for NotifyOnDrop {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}
