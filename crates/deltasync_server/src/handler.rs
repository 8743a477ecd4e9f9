//! The exchange request handler.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use chrono::{DateTime, Utc};
use deltasync_engine::{apply_batch, Extractor, TrackedStore};
use deltasync_protocol::{Delta, ExchangeRequest};
use deltasync_store::RowStore;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One registered dataset: its tracked store plus the checkpoint marker
/// of every identity that has exchanged with it.
pub struct Dataset<S> {
    store: Arc<TrackedStore<S>>,
    markers: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl<S: RowStore> Dataset<S> {
    fn new(store: Arc<TrackedStore<S>>) -> Self {
        Self {
            store,
            markers: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the dataset's tracked store.
    pub fn store(&self) -> &Arc<TrackedStore<S>> {
        &self.store
    }

    /// Returns an identity's checkpoint marker.
    pub fn marker(&self, identity: &str) -> Option<DateTime<Utc>> {
        self.markers.read().get(identity).copied()
    }
}

/// Context shared by all exchange handlers.
pub struct HandlerContext<S> {
    /// Server configuration.
    pub config: ServerConfig,
    datasets: RwLock<HashMap<String, Arc<Dataset<S>>>>,
}

impl<S: RowStore> HandlerContext<S> {
    /// Creates an empty context.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            datasets: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a dataset under a name, replacing any previous one.
    pub fn register(
        &self,
        name: impl Into<String>,
        store: Arc<TrackedStore<S>>,
    ) -> Arc<Dataset<S>> {
        let dataset = Arc::new(Dataset::new(store));
        self.datasets
            .write()
            .insert(name.into(), Arc::clone(&dataset));
        dataset
    }

    /// Looks up a dataset.
    pub fn dataset(&self, name: &str) -> Option<Arc<Dataset<S>>> {
        self.datasets.read().get(name).cloned()
    }
}

/// Serves exchange requests against registered datasets.
pub struct ExchangeHandler<S> {
    context: Arc<HandlerContext<S>>,
}

impl<S: RowStore> ExchangeHandler<S> {
    /// Creates a handler over a context.
    pub fn new(context: Arc<HandlerContext<S>>) -> Self {
        Self { context }
    }

    /// Handles one exchange: applies the caller's delta, then extracts
    /// and returns this side's delta since the caller's last marker.
    ///
    /// Validation runs before any store access. The caller's marker
    /// advances only when the whole exchange succeeded, so a failed
    /// round is retried from the same position.
    pub fn handle(&self, request: &ExchangeRequest) -> ServerResult<Delta> {
        request
            .validate()
            .map_err(|e| ServerError::InvalidRequest(e.to_string()))?;

        let dataset = self
            .context
            .dataset(&request.dataset)
            .ok_or_else(|| ServerError::UnknownDataset(request.dataset.clone()))?;

        if let Some(delta) = &request.delta {
            if delta.len() > self.context.config.max_apply_batch {
                return Err(ServerError::InvalidRequest(format!(
                    "delta too large: {} > {}",
                    delta.len(),
                    self.context.config.max_apply_batch
                )));
            }

            let applied = if self.context.config.log_applied {
                // Hub mode: applied rows re-enter the shared log so
                // other identities receive them.
                apply_batch(dataset.store().as_ref(), delta)?
            } else {
                let _guard = dataset.store().capture().pause();
                apply_batch(dataset.store().as_ref(), delta)?
            };
            debug!(
                identity = %request.identity,
                dataset = %request.dataset,
                applied,
                "incoming delta applied"
            );
        }

        let marker = dataset.marker(&request.identity);
        // The new marker is read before the log query: entries logged
        // during extraction are re-sent next round, never skipped.
        let next_marker = Utc::now();

        let extractor = Extractor::new(Arc::clone(dataset.store()));
        let reply = if request.request_all {
            extractor.all_data()?
        } else {
            extractor.changed_data(marker)?
        };

        dataset
            .markers
            .write()
            .insert(request.identity.clone(), next_marker);

        debug!(
            identity = %request.identity,
            dataset = %request.dataset,
            rows = reply.len(),
            "outgoing delta extracted"
        );
        Ok(reply)
    }
}
