//! # deltasync Engine
//!
//! Change capture, delta extraction, idempotent application, and the
//! synchronizer state machine for deltasync.
//!
//! This crate provides:
//! - Change capture (one live log entry per object), with coalescing
//!   and trigger-style replace policies
//! - Change extraction (delta since a checkpoint) and full snapshots
//! - Idempotent batch application of incoming deltas
//! - The synchronizer state machine driving one exchange round
//! - Transport abstraction (mock, HTTP client abstraction, loopback)
//!
//! ## Architecture
//!
//! The engine implements a **symmetric exchange** model: one round trip
//! both pushes the local delta and pulls the peer's delta.
//! 1. Extract the local delta (or a full snapshot on first sync)
//! 2. Exchange it with the peer
//! 3. Apply the peer's delta locally, with capture paused
//! 4. Commit: clear the local change log and advance the checkpoint
//!
//! ## Key Invariants
//!
//! - The change log never reports more than one operation per object per
//!   checkpoint window
//! - Application is idempotent; a retried round is always safe
//! - A failed or cancelled round never commits; the local log is left
//!   untouched

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod apply;
mod capture;
mod config;
mod error;
mod extract;
mod http;
mod state;
mod transport;

pub use apply::apply_batch;
pub use capture::{CaptureGuard, CapturePolicy, ChangeCapture, TrackedStore};
pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use extract::Extractor;
pub use http::{HttpClient, HttpTransport, LoopbackClient, LoopbackServer};
pub use state::{SyncPhase, SyncRoundReport, Synchronizer};
pub use transport::{ExchangeTransport, MockTransport};
