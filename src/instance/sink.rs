//! Output sinks for structured messages
//!
//! Anything implementing `std::io::Write` can receive a message. The instance
//! keeps one shared log sink (stdout in production) behind a `LogSink`.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Shared, thread-safe destination for log lines
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl LogSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Log sink writing to the process's standard output
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Run `f` with exclusive access to the underlying writer
    ///
    /// Holding the lock for the whole message keeps lines from interleaving.
    pub fn with<R>(&self, f: impl FnOnce(&mut dyn Write) -> R) -> R {
        // A poisoned lock only means another writer panicked mid-line
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut **guard)
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

/// In-memory sink for capturing lines in tests
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured output split into lines
    pub fn lines(&self) -> Vec<String> {
        let buf = self.buf.lock().expect("MemorySink lock poisoned");
        String::from_utf8_lossy(&buf)
            .lines()
            .map(str::to_owned)
            .collect()
    }

    /// Captured lines decoded as JSON objects
    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.lines()
            .iter()
            .map(|line| serde_json::from_str(line).expect("log line is not JSON"))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Write for MemorySink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf
            .lock()
            .expect("MemorySink lock poisoned")
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
