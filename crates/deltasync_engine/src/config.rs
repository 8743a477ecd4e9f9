//! Configuration for the synchronizer.

use std::time::Duration;

/// Configuration for one synchronizer instance.
///
/// Carried explicitly through construction; there is no ambient global
/// state.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Explicit client identity. When absent, the identity is resolved
    /// from the local `Configuration` table or assigned once and
    /// persisted there.
    pub identity: Option<String>,
    /// Target data-set name, sent with every exchange.
    pub dataset: String,
    /// Base URL of the peer's exchange endpoint.
    pub server_url: String,
    /// Request timeout handed to the transport.
    pub timeout: Duration,
    /// Whether a successful round clears the change log immediately.
    ///
    /// When disabled, the round stops in the applied phase and the
    /// caller confirms it with an explicit `commit()` — the stronger
    /// two-step variant for callers that want to inspect the applied
    /// response before the log is cleared.
    pub auto_commit: bool,
}

impl SyncConfig {
    /// Creates a configuration for a dataset and peer URL.
    pub fn new(dataset: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            identity: None,
            dataset: dataset.into(),
            server_url: server_url.into(),
            timeout: Duration::from_secs(30),
            auto_commit: true,
        }
    }

    /// Sets an explicit client identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables auto-commit.
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = auto_commit;
        self
    }
}
