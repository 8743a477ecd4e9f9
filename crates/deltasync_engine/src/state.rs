//! Synchronizer state machine.

use crate::apply::apply_batch;
use crate::capture::TrackedStore;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::extract::Extractor;
use crate::transport::ExchangeTransport;
use chrono::{DateTime, Utc};
use deltasync_protocol::{ExchangeRequest, Row, Value};
use deltasync_store::{RowStore, StoreError, CONFIG_TABLE};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use uuid::Uuid;

/// `Configuration` table parameter holding the persisted client
/// identity.
const CLIENT_UID_PARAM: &str = "client_uid";

/// The phase of the current synchronization round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Identity not yet resolved.
    Uninitialized,
    /// Ready to start a round.
    Ready,
    /// Local delta computed and sent; waiting on the peer.
    Exchanging,
    /// Peer delta applied locally; commit pending.
    Applied,
    /// Round confirmed: log cleared, checkpoint advanced.
    Committed,
    /// Round failed; local change log left untouched.
    Failed,
}

impl SyncPhase {
    /// Returns true if a new round may start from this phase.
    pub fn can_start_round(&self) -> bool {
        matches!(
            self,
            SyncPhase::Ready | SyncPhase::Committed | SyncPhase::Failed
        )
    }

    /// Returns true while a round is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncPhase::Exchanging | SyncPhase::Applied)
    }
}

/// Result of one synchronization round.
#[derive(Debug, Clone)]
pub struct SyncRoundReport {
    /// Rows and tombstones sent to the peer.
    pub sent: u64,
    /// Rows and tombstones received from the peer.
    pub received: u64,
    /// Rows applied locally.
    pub applied: u64,
    /// Duration of the round.
    pub duration: Duration,
}

/// Drives synchronization rounds against a remote peer.
///
/// One round both pushes the local delta and pulls the peer's delta in a
/// single exchange. Rounds for one instance are sequential; concurrent
/// rounds for the *same* identity are a caller error.
///
/// # Failure behavior
///
/// Any failure during the exchange or the apply moves the round to
/// [`SyncPhase::Failed`] and leaves the local change log untouched, so
/// the same delta is naturally retried next round. Application is
/// idempotent, which makes the retry safe against partial peer state.
pub struct Synchronizer<S: RowStore, T: ExchangeTransport> {
    config: SyncConfig,
    store: Arc<TrackedStore<S>>,
    transport: Arc<T>,
    phase: RwLock<SyncPhase>,
    identity: RwLock<Option<String>>,
    checkpoint: RwLock<Option<DateTime<Utc>>>,
    pending_commit: RwLock<Option<DateTime<Utc>>>,
    cancelled: AtomicBool,
}

impl<S: RowStore, T: ExchangeTransport> Synchronizer<S, T> {
    /// Creates a synchronizer over a tracked store and a transport.
    pub fn new(config: SyncConfig, store: Arc<TrackedStore<S>>, transport: T) -> Self {
        Self {
            config,
            store,
            transport: Arc::new(transport),
            phase: RwLock::new(SyncPhase::Uninitialized),
            identity: RwLock::new(None),
            checkpoint: RwLock::new(None),
            pending_commit: RwLock::new(None),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> SyncPhase {
        *self.phase.read()
    }

    /// Returns the resolved client identity.
    pub fn identity(&self) -> Option<String> {
        self.identity.read().clone()
    }

    /// Returns the last committed checkpoint.
    pub fn checkpoint(&self) -> Option<DateTime<Utc>> {
        *self.checkpoint.read()
    }

    /// Returns the tracked store.
    pub fn store(&self) -> &Arc<TrackedStore<S>> {
        &self.store
    }

    /// Requests cancellation of the in-flight round.
    ///
    /// Checked at phase boundaries; a cancelled round never commits.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Resets the cancellation flag.
    pub fn reset_cancel(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> SyncResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.write() = phase;
    }

    fn invalid_state(&self, to: &str) -> SyncError {
        SyncError::InvalidState {
            from: format!("{:?}", self.phase()),
            to: to.to_string(),
        }
    }

    /// Resolves the client identity and confirms the store is open.
    pub fn init(&self) -> SyncResult<()> {
        if self.phase() != SyncPhase::Uninitialized {
            return Err(self.invalid_state("Ready"));
        }
        if !self.store.is_open() {
            return Err(SyncError::Store(StoreError::Closed));
        }

        let identity = match &self.config.identity {
            Some(identity) => identity.clone(),
            None => self.resolve_identity()?,
        };
        debug!(identity = %identity, "synchronizer initialized");

        *self.identity.write() = Some(identity);
        self.set_phase(SyncPhase::Ready);
        Ok(())
    }

    /// Reads the persisted identity from the `Configuration` table, or
    /// assigns one and persists it.
    fn resolve_identity(&self) -> SyncResult<String> {
        let rows = self.store.find(CONFIG_TABLE, &|row: &Row| {
            row.get("parameter").and_then(Value::as_text) == Some(CLIENT_UID_PARAM)
        })?;

        if let Some(value) = rows
            .first()
            .and_then(|row| row.get("value"))
            .and_then(Value::as_text)
        {
            return Ok(value.to_string());
        }

        let identity = Uuid::new_v4().to_string();
        self.store.add(
            CONFIG_TABLE,
            Row::new()
                .with("parameter", CLIENT_UID_PARAM)
                .with("value", identity.clone()),
        )?;
        Ok(identity)
    }

    /// Runs one synchronization round.
    ///
    /// Extracts the local delta (a full snapshot when no checkpoint
    /// exists), exchanges it with the peer, applies the peer's delta
    /// with capture paused, and commits unless auto-commit is disabled.
    pub fn sync(&self) -> SyncResult<SyncRoundReport> {
        if !self.phase().can_start_round() {
            return Err(self.invalid_state("Exchanging"));
        }
        self.reset_cancel();

        let started = Instant::now();
        // Taken before the log read: concurrent writes land after it and
        // are re-sent next round rather than lost.
        let round_start = Utc::now();

        match self.run_round(round_start) {
            Ok(mut report) => {
                report.duration = started.elapsed();
                Ok(report)
            }
            Err(e) => {
                self.set_phase(SyncPhase::Failed);
                Err(e)
            }
        }
    }

    fn run_round(&self, round_start: DateTime<Utc>) -> SyncResult<SyncRoundReport> {
        let identity = self
            .identity
            .read()
            .clone()
            .ok_or_else(|| self.invalid_state("Exchanging"))?;

        self.set_phase(SyncPhase::Exchanging);

        let checkpoint = *self.checkpoint.read();
        let extractor = Extractor::new(Arc::clone(&self.store));
        let (local, bootstrap) = match checkpoint {
            Some(cp) => (extractor.changed_data(Some(cp))?, false),
            None => (extractor.all_data()?, true),
        };
        let sent = local.len() as u64;

        let mut request = ExchangeRequest::new(identity, self.config.dataset.clone());
        if !local.is_empty() {
            request = request.with_delta(local);
        }
        if bootstrap {
            request = request.with_request_all();
        }

        self.check_cancelled()?;
        let response = self.transport.exchange(&request)?;
        if let Some(error) = response.error {
            return Err(SyncError::Peer(error.message));
        }
        let peer_delta = response.tables.unwrap_or_default();
        let received = peer_delta.len() as u64;

        self.check_cancelled()?;
        let applied = {
            // Already-synchronized changes must not re-enter the log as
            // new local changes.
            let _guard = self.store.capture().pause();
            apply_batch(self.store.as_ref(), &peer_delta)?
        };

        self.set_phase(SyncPhase::Applied);
        *self.pending_commit.write() = Some(round_start);

        if self.config.auto_commit {
            self.commit()?;
        }

        debug!(sent, received, applied, "round complete");
        Ok(SyncRoundReport {
            sent,
            received,
            applied,
            duration: Duration::ZERO,
        })
    }

    /// Confirms the applied round: clears the shipped window of the
    /// change log and advances the checkpoint.
    ///
    /// Called automatically after a successful round unless the
    /// configuration disables auto-commit.
    pub fn commit(&self) -> SyncResult<()> {
        if self.phase() != SyncPhase::Applied {
            return Err(self.invalid_state("Committed"));
        }
        let committed_at = self
            .pending_commit
            .write()
            .take()
            .ok_or_else(|| self.invalid_state("Committed"))?;

        self.store.capture().clear_through(committed_at)?;
        *self.checkpoint.write() = Some(committed_at);
        self.set_phase(SyncPhase::Committed);
        Ok(())
    }
}
