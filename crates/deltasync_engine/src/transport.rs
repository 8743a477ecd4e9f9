//! Transport layer abstraction for the exchange protocol.

use crate::error::{SyncError, SyncResult};
use deltasync_protocol::{ExchangeRequest, ExchangeResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Carries exchange requests to the remote peer.
///
/// This trait abstracts the network layer, allowing different
/// implementations (HTTP, loopback, mock for testing).
pub trait ExchangeTransport: Send + Sync {
    /// Performs one exchange round trip: pushes the request's delta and
    /// returns the peer's response.
    fn exchange(&self, request: &ExchangeRequest) -> SyncResult<ExchangeResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Closes the transport connection.
    fn close(&self) -> SyncResult<()>;
}

/// A mock transport for testing.
#[derive(Default)]
pub struct MockTransport {
    connected: AtomicBool,
    response: Mutex<Option<ExchangeResponse>>,
    failure: Mutex<Option<String>>,
    last_request: Mutex<Option<ExchangeRequest>>,
}

impl MockTransport {
    /// Creates a connected mock with no scripted response.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            response: Mutex::new(None),
            failure: Mutex::new(None),
            last_request: Mutex::new(None),
        }
    }

    /// Scripts the response returned by the next exchanges.
    pub fn set_response(&self, response: ExchangeResponse) {
        *self.response.lock() = Some(response);
        *self.failure.lock() = None;
    }

    /// Makes exchanges fail with a retryable transport error.
    pub fn set_failure(&self, message: impl Into<String>) {
        *self.failure.lock() = Some(message.into());
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Returns the most recent request seen by the mock.
    pub fn last_request(&self) -> Option<ExchangeRequest> {
        self.last_request.lock().clone()
    }
}

impl ExchangeTransport for MockTransport {
    fn exchange(&self, request: &ExchangeRequest) -> SyncResult<ExchangeResponse> {
        if !self.is_connected() {
            return Err(SyncError::transport_fatal("not connected"));
        }
        *self.last_request.lock() = Some(request.clone());

        if let Some(message) = self.failure.lock().clone() {
            return Err(SyncError::transport_retryable(message));
        }

        self.response
            .lock()
            .clone()
            .ok_or_else(|| SyncError::transport_fatal("no mock response set"))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}
