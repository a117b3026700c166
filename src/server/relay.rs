//! Outbound relay endpoint
//!
//! `POST /proxy/get` with `{"url": "..."}` fetches the URL through the
//! instance's shared client and streams the upstream reply back verbatim.
//! Request bodies over `MAX_RELAY_BODY` are rejected like any other
//! undecodable body.

use axum::{
    body::Body,
    extract::State,
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use super::{json_reply, AppState};

/// Largest relay request body read before giving up
pub const MAX_RELAY_BODY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Usage: POST {{\"url\": \"url_to_get\"}}")]
    MethodNotAllowed,

    #[error("failed to decode json")]
    InvalidBody,

    #[error("url must be a string")]
    InvalidUrl,

    #[error("{0}")]
    Upstream(#[from] reqwest::Error),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            RelayError::InvalidBody | RelayError::InvalidUrl | RelayError::Upstream(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

/// Extract the target URL from a relay request body
///
/// The body must be a JSON object with a string `url` field. Any other
/// shape is a caller error.
pub fn parse_target(body: &[u8]) -> Result<String, RelayError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| RelayError::InvalidBody)?;
    match value.get("url") {
        None | Some(Value::Null) => Err(RelayError::InvalidBody),
        Some(Value::String(url)) => Ok(url.clone()),
        Some(_) => Err(RelayError::InvalidUrl),
    }
}

async fn fetch(state: &AppState, method: &Method, body: Body) -> Result<Response, RelayError> {
    if *method != Method::POST {
        return Err(RelayError::MethodNotAllowed);
    }
    let body = axum::body::to_bytes(body, MAX_RELAY_BODY)
        .await
        .map_err(|_| RelayError::InvalidBody)?;
    let url = parse_target(&body)?;

    debug!(url = %url, "Relaying GET");
    let upstream = state.instance.http_client().get(&url).send().await?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(content_type) = upstream.headers().get(CONTENT_TYPE) {
        response = response.header(CONTENT_TYPE, content_type.clone());
    }
    let body = Body::from_stream(upstream.bytes_stream());

    Ok(response
        .body(body)
        .unwrap_or_else(|_| StatusCode::BAD_GATEWAY.into_response()))
}

/// `/proxy/get` handler
pub async fn proxy_get(State(state): State<AppState>, method: Method, body: Body) -> Response {
    match fetch(&state, &method, body).await {
        Ok(response) => response,
        Err(e) => {
            if let RelayError::Upstream(ref source) = e {
                warn!(error = %source, timeout = source.is_timeout(), "Relay request failed");
            }
            json_reply(&state.instance, e.status(), &e.to_string())
        }
    }
}
