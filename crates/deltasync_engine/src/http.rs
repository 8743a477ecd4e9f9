//! HTTP transport implementation.
//!
//! This module provides an HTTP-based transport for the exchange
//! protocol. The actual HTTP client is abstracted via a trait to allow
//! different implementations (reqwest, ureq, a loopback for tests).

use crate::error::{SyncError, SyncResult};
use crate::transport::ExchangeTransport;
use deltasync_protocol::{Delta, ExchangeRequest, ExchangeResponse};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport. This
/// keeps the engine free of any particular HTTP library.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based exchange transport.
///
/// Requests are JSON bodies POSTed to `{base_url}/exchange`.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into(),
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the last transport error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    /// Decodes a response body.
    ///
    /// A body that is not the expected response envelope falls back to
    /// being read as a raw delta grouping, so a peer answering with the
    /// bare payload is returned rather than failed.
    fn decode_response(bytes: &[u8]) -> SyncResult<ExchangeResponse> {
        if let Ok(response) = ExchangeResponse::from_json(bytes) {
            return Ok(response);
        }
        match serde_json::from_slice::<Delta>(bytes) {
            Ok(delta) => Ok(ExchangeResponse::success(delta)),
            Err(e) => Err(SyncError::Protocol(e.into())),
        }
    }
}

impl<C: HttpClient> ExchangeTransport for HttpTransport<C> {
    fn exchange(&self, request: &ExchangeRequest) -> SyncResult<ExchangeResponse> {
        if !self.is_connected() {
            return Err(SyncError::transport_fatal("not connected"));
        }

        let body = request.to_json()?;
        let url = format!("{}/exchange", self.base_url);

        let response_body = self.client.post(&url, body).map_err(|e| {
            self.set_error(&e);
            self.connected.store(false, Ordering::SeqCst);
            SyncError::transport_retryable(e)
        })?;

        self.clear_error();
        Self::decode_response(&response_body)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Trait for servers that can handle loopback requests.
///
/// Implemented by the exchange server so engine and server can be wired
/// together in-process without network overhead.
pub trait LoopbackServer {
    /// Handles a POST request and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String>;
}

impl<T: LoopbackServer> LoopbackServer for Arc<T> {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        (**self).handle_post(path, body)
    }
}

/// An HTTP client that routes requests directly to a loopback server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>) -> Result<Vec<u8>, String> {
        let path = url.find("/exchange").map(|i| &url[i..]).unwrap_or(url);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
