//! Process-wide instance state
//!
//! One `Instance` is created at startup and shared by every handler:
//! - identity (`id`) and `started_at`, fixed for the process lifetime
//! - the health code reported by `/health`, flipped by `/toggleHealth`
//! - the outbound HTTP client used by the relay endpoint
//!
//! It also formats every structured message the process emits, whether the
//! destination is an HTTP response body or the stdout log stream.

pub mod clock;
pub mod sink;

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

pub use clock::{Clock, SystemClock};
pub use sink::LogSink;

/// Build version reported in every message
///
/// Set `BUILD_VERSION` at compile time to stamp a release build.
pub const BUILD_VERSION: &str = match option_env!("BUILD_VERSION") {
    Some(version) => version,
    None => "snapshot",
};

/// Timeout applied to every outbound relay request
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(3);

/// Structured message written to responses and to the log stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub instance_id: String,
    pub started_at: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub message: String,
}

/// Shared state of this probe instance
pub struct Instance {
    id: String,
    started_at: DateTime<Utc>,
    version: String,
    health: AtomicU16,
    http: reqwest::Client,
    clock: Arc<dyn Clock>,
    log: LogSink,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .field("version", &self.version)
            .field("health", &self.health())
            .finish_non_exhaustive()
    }
}

impl Instance {
    /// Create an instance with the system clock, stdout logging and a healthy code
    pub fn new(version: impl Into<String>, relay_timeout: Duration) -> Result<Self, reqwest::Error> {
        Self::builder()
            .version(version)
            .relay_timeout(relay_timeout)
            .build()
    }

    pub fn builder() -> InstanceBuilder {
        InstanceBuilder::default()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Client shared by all relay requests
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Status code currently reported by `/health`
    pub fn health(&self) -> StatusCode {
        let code = self.health.load(Ordering::SeqCst);
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Flip the health code between 200 and 500
    ///
    /// The read-modify-write is a single atomic update, so concurrent toggles
    /// and reads never observe an intermediate value. Any other code is left
    /// untouched. Returns the code in effect after the call.
    pub fn toggle_health(&self) -> StatusCode {
        let ok = StatusCode::OK.as_u16();
        let failing = StatusCode::INTERNAL_SERVER_ERROR.as_u16();

        let result = self
            .health
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |code| {
                if code == ok {
                    Some(failing)
                } else if code == failing {
                    Some(ok)
                } else {
                    None
                }
            });

        let code = match result {
            Ok(previous) if previous == ok => failing,
            Ok(_) => ok,
            Err(unchanged) => unchanged,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Stamp `text` with this instance's identity and the current time
    pub fn message(&self, text: impl Into<String>) -> ResponseMessage {
        ResponseMessage {
            instance_id: self.id.clone(),
            started_at: self.started_at,
            timestamp: self.clock.now(),
            version: self.version.clone(),
            message: text.into(),
        }
    }

    /// Serialize a message as one JSON line to `sink`
    ///
    /// Failures are logged, never returned.
    pub fn write(&self, sink: &mut dyn Write, text: &str) {
        let message = self.message(text);
        let result = serde_json::to_writer(&mut *sink, &message)
            .map_err(std::io::Error::from)
            .and_then(|()| sink.write_all(b"\n"))
            .and_then(|()| sink.flush());
        if let Err(e) = result {
            warn!(error = %e, "Failed to write message");
        }
    }

    /// Write a message to the instance's log stream
    pub fn log(&self, text: &str) {
        self.log.with(|sink| self.write(sink, text));
    }

    /// Render a message as a response body
    pub fn render(&self, text: &str) -> Vec<u8> {
        let mut body = Vec::new();
        self.write(&mut body, text);
        body
    }
}

/// Builder for `Instance`, mainly so tests can swap the clock and log sink
pub struct InstanceBuilder {
    version: String,
    relay_timeout: Duration,
    health: StatusCode,
    clock: Arc<dyn Clock>,
    log: Option<LogSink>,
}

impl Default for InstanceBuilder {
    fn default() -> Self {
        Self {
            version: BUILD_VERSION.to_string(),
            relay_timeout: RELAY_TIMEOUT,
            health: StatusCode::OK,
            clock: Arc::new(SystemClock),
            log: None,
        }
    }
}

impl InstanceBuilder {
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn relay_timeout(mut self, timeout: Duration) -> Self {
        self.relay_timeout = timeout;
        self
    }

    pub fn health(mut self, code: StatusCode) -> Self {
        self.health = code;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn log_sink(mut self, sink: LogSink) -> Self {
        self.log = Some(sink);
        self
    }

    pub fn build(self) -> Result<Instance, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(self.relay_timeout)
            .build()?;

        Ok(Instance {
            id: Uuid::new_v4().to_string(),
            started_at: self.clock.now(),
            version: self.version,
            health: AtomicU16::new(self.health.as_u16()),
            http,
            clock: self.clock,
            log: self.log.unwrap_or_else(LogSink::stdout),
        })
    }
}

#[cfg(test)]
#[path = "instance_test.rs"]
mod tests;
