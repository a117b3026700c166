//! Process termination for `/panic`
//!
//! Handlers never call `std::process::exit` directly. The terminator is
//! injected through `AppState`, so tests can observe the request instead of
//! losing the test process.

use tracing::warn;

/// Ends the process with a given exit code
pub trait Terminator: Send + Sync {
    fn terminate(&self, code: i32);
}

/// Production terminator: exits immediately, skipping graceful shutdown
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, code: i32) {
        warn!(code, "Terminating process on request");
        std::process::exit(code);
    }
}

/// Records the requested exit code instead of exiting
#[cfg(test)]
#[derive(Default)]
pub struct RecordingTerminator {
    code: std::sync::Mutex<Option<i32>>,
    notify: tokio::sync::Notify,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl RecordingTerminator {
    pub fn code(&self) -> Option<i32> {
        *self.code.lock().expect("RecordingTerminator lock poisoned")
    }

    /// Wait until `terminate` has been called and return the code
    pub async fn wait(&self) -> i32 {
        loop {
            let notified = self.notify.notified();
            if let Some(code) = self.code() {
                return code;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Terminator for RecordingTerminator {
    fn terminate(&self, code: i32) {
        *self.code.lock().expect("RecordingTerminator lock poisoned") = Some(code);
        self.notify.notify_waiters();
    }
}
