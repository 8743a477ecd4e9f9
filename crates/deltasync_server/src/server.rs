//! The exchange server facade.

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::handler::{Dataset, ExchangeHandler, HandlerContext};
use deltasync_engine::{CapturePolicy, LoopbackServer, TrackedStore};
use deltasync_protocol::{ExchangeRequest, ExchangeResponse};
use deltasync_store::RowStore;
use std::sync::Arc;
use tracing::{error, warn};

/// The exchange server.
///
/// Hosts one or more datasets and serves the symmetric exchange
/// protocol. Every lower-level failure is wrapped into the protocol
/// error payload at this boundary, so transports only ever carry
/// [`ExchangeResponse`] bodies.
///
/// # Example
///
/// ```
/// use deltasync_server::{ExchangeServer, ServerConfig};
/// use deltasync_store::{MemoryStore, Schema};
///
/// let server = ExchangeServer::new(ServerConfig::default());
/// server.register_dataset("todo", MemoryStore::new(Schema::new()));
///
/// // In a real deployment an HTTP layer POSTs request bodies to
/// // server.exchange() / handle_post().
/// ```
pub struct ExchangeServer<S> {
    handler: ExchangeHandler<S>,
    context: Arc<HandlerContext<S>>,
}

impl<S: RowStore> ExchangeServer<S> {
    /// Creates a server with no datasets.
    pub fn new(config: ServerConfig) -> Self {
        let context = Arc::new(HandlerContext::new(config));
        let handler = ExchangeHandler::new(Arc::clone(&context));
        Self { handler, context }
    }

    /// Registers a dataset, wrapping the store for change tracking.
    ///
    /// The server's log is shared by every identity and consumed
    /// through per-identity markers, so capture uses the replace
    /// policy: an entry already delivered to one identity must not be
    /// cancelled before the others have seen its successor.
    pub fn register_dataset(&self, name: impl Into<String>, store: S) -> Arc<Dataset<S>> {
        self.context.register(
            name,
            Arc::new(TrackedStore::with_policy(store, CapturePolicy::Replace)),
        )
    }

    /// Registers a dataset backed by an existing tracked store.
    pub fn register_tracked(
        &self,
        name: impl Into<String>,
        store: Arc<TrackedStore<S>>,
    ) -> Arc<Dataset<S>> {
        self.context.register(name, store)
    }

    /// Looks up a registered dataset.
    pub fn dataset(&self, name: &str) -> Option<Arc<Dataset<S>>> {
        self.context.dataset(name)
    }

    /// Serves one exchange, wrapping any failure into the error payload.
    pub fn exchange(&self, request: &ExchangeRequest) -> ExchangeResponse {
        match self.handler.handle(request) {
            Ok(delta) => ExchangeResponse::success(delta),
            Err(e) => {
                if e.is_client_error() {
                    warn!(error = %e, "rejected exchange request");
                } else {
                    error!(error = %e, "exchange failed");
                }
                ExchangeResponse::error(e.to_string())
            }
        }
    }
}

impl<S: RowStore> LoopbackServer for ExchangeServer<S> {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        if path != "/exchange" {
            return Err(format!("unknown path: {path}"));
        }

        let response = match ExchangeRequest::from_json(body) {
            Ok(request) => self.exchange(&request),
            Err(e) => ExchangeResponse::error(
                ServerError::InvalidRequest(e.to_string()).to_string(),
            ),
        };
        response.to_json().map_err(|e| e.to_string())
    }
}
