//! Server configuration.

use std::time::Duration;

/// Configuration for the exchange server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of rows accepted in one incoming delta.
    pub max_apply_batch: usize,
    /// Request timeout advertised to the hosting transport.
    pub request_timeout: Duration,
    /// Whether applied deltas re-enter the server's change log.
    ///
    /// Enabled by default: the server is a hub and other identities
    /// receive the changes through the shared log. Disable for a
    /// two-node topology where nothing downstream reads the server log.
    pub log_applied: bool,
}

impl ServerConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            max_apply_batch: 10_000,
            request_timeout: Duration::from_secs(30),
            log_applied: true,
        }
    }

    /// Sets the maximum incoming delta size.
    pub fn with_max_apply_batch(mut self, max: usize) -> Self {
        self.max_apply_batch = max;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enables or disables re-logging of applied deltas.
    pub fn with_log_applied(mut self, log_applied: bool) -> Self {
        self.log_applied = log_applied;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}
