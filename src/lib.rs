//! Instrumented HTTP probe server
//!
//! A controllable test target: it reports its identity and health, can flip
//! its health on request, drain its listener, crash, fail with 500, and relay
//! outbound GET requests.

pub mod config;
pub mod instance;
pub mod server;
