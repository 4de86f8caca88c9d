//! Line loggers for streamed command output.
//!
//! A [`BufferedLogger`] owns a bounded ring buffer of output lines and a
//! [`CancellationToken`].  Long-running streamed executions (journal
//! follows) are spawned with the logger's token, so disposing the logger
//! cancels the underlying remote process.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::errors::{QuadletError, QuadletResult};

const DEFAULT_MAX_LOGS_LENGTH: usize = 200;

// ---------------------------------------------------------------------------
// Logger trait
// ---------------------------------------------------------------------------

/// Sink for the line-by-line output of a running command.
pub trait Logger: Send + Sync {
    fn log(&self, data: &str);
    fn warn(&self, data: &str);
    fn error(&self, data: &str);
}

// ---------------------------------------------------------------------------
// BufferedLogger
// ---------------------------------------------------------------------------

/// A logger retaining the most recent lines it received.
pub struct BufferedLogger {
    id: Uuid,
    logs: Mutex<VecDeque<String>>,
    max_logs_length: usize,
    token: CancellationToken,
}

impl BufferedLogger {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_LOGS_LENGTH)
    }

    pub fn with_capacity(max_logs_length: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            logs: Mutex::new(VecDeque::new()),
            max_logs_length,
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Cancellation token tied to this logger's lifetime.  Executions
    /// spawned with it terminate when the logger is disposed.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Snapshot of the retained lines, oldest first.
    pub fn all(&self) -> Vec<String> {
        self.logs
            .lock()
            .map(|logs| logs.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Cancel the token and drop the retained lines.  Data arriving after
    /// disposal is discarded.
    pub fn dispose(&self) {
        self.token.cancel();
        if let Ok(mut logs) = self.logs.lock() {
            logs.clear();
        }
    }

    fn on_data(&self, data: &str) {
        if self.token.is_cancelled() {
            return;
        }
        let Ok(mut logs) = self.logs.lock() else {
            return;
        };
        for line in data.trim_end().split('\n') {
            logs.push_back(line.to_string());
            if logs.len() > self.max_logs_length {
                logs.pop_front();
            }
        }
    }
}

impl Default for BufferedLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger for BufferedLogger {
    fn log(&self, data: &str) {
        self.on_data(data);
    }

    fn warn(&self, data: &str) {
        self.on_data(data);
    }

    fn error(&self, data: &str) {
        self.on_data(data);
    }
}

// ---------------------------------------------------------------------------
// LoggerRegistry
// ---------------------------------------------------------------------------

/// Registry of live loggers, addressed by id across the API boundary.
pub struct LoggerRegistry {
    registry: Mutex<HashMap<Uuid, std::sync::Arc<BufferedLogger>>>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
        }
    }

    pub fn create_logger(&self) -> std::sync::Arc<BufferedLogger> {
        let logger = std::sync::Arc::new(BufferedLogger::new());
        if let Ok(mut registry) = self.registry.lock() {
            registry.insert(logger.id(), logger.clone());
        }
        logger
    }

    pub fn get_logger(&self, id: Uuid) -> QuadletResult<std::sync::Arc<BufferedLogger>> {
        self.registry
            .lock()
            .ok()
            .and_then(|registry| registry.get(&id).cloned())
            .ok_or_else(|| QuadletError::UnknownLogger(id.to_string()))
    }

    pub fn logs(&self, id: Uuid) -> QuadletResult<Vec<String>> {
        Ok(self.get_logger(id)?.all())
    }

    /// Dispose the logger and forget it.  Cancels any execution streaming
    /// into it.
    pub fn dispose_logger(&self, id: Uuid) -> QuadletResult<()> {
        let logger = self.get_logger(id)?;
        logger.dispose();
        if let Ok(mut registry) = self.registry.lock() {
            registry.remove(&id);
        }
        Ok(())
    }
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LoggerRegistry {
    fn drop(&mut self) {
        if let Ok(registry) = self.registry.lock() {
            for logger in registry.values() {
                logger.dispose();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_line_data_is_split() {
        let logger = BufferedLogger::new();
        logger.log("first\nsecond\n");
        assert_eq!(logger.all(), ["first", "second"]);
    }

    #[test]
    fn ring_buffer_caps_retained_lines() {
        let logger = BufferedLogger::with_capacity(3);
        for i in 0..5 {
            logger.log(&format!("line-{i}"));
        }
        assert_eq!(logger.all(), ["line-2", "line-3", "line-4"]);
    }

    #[test]
    fn disposed_logger_drops_late_writes() {
        let logger = BufferedLogger::new();
        logger.log("before");
        logger.dispose();
        logger.log("after");
        assert!(logger.all().is_empty());
        assert!(logger.token().is_cancelled());
    }

    #[test]
    fn registry_round_trip() {
        let registry = LoggerRegistry::new();
        let logger = registry.create_logger();
        logger.log("hello");

        assert_eq!(registry.logs(logger.id()).unwrap(), ["hello"]);

        registry.dispose_logger(logger.id()).unwrap();
        assert!(matches!(
            registry.logs(logger.id()),
            Err(QuadletError::UnknownLogger(_))
        ));
        assert!(logger.token().is_cancelled());
    }

    #[test]
    fn unknown_logger_is_an_error() {
        let registry = LoggerRegistry::new();
        assert!(matches!(
            registry.get_logger(Uuid::new_v4()),
            Err(QuadletError::UnknownLogger(_))
        ));
    }
}
