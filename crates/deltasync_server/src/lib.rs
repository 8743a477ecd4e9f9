//! # deltasync Server
//!
//! The peer-side exchange endpoint for deltasync.
//!
//! This crate provides:
//! - A dataset registry (name → tracked store)
//! - Per-identity checkpoint markers
//! - The symmetric exchange handler: validate → apply → extract → commit
//! - Error classification (client vs. server failures)
//!
//! # Architecture
//!
//! The server is a **hub**: it applies incoming deltas with change
//! capture enabled, so one identity's changes re-enter the shared log
//! and reach every other identity. Each identity keeps its own
//! checkpoint marker; a round never clears the shared log.
//!
//! # Protocol
//!
//! One exchange both pushes and pulls:
//! 1. The caller's delta is applied to the dataset store
//! 2. The server extracts its own delta since the caller's last marker
//!    (a full snapshot when the caller requests all)
//! 3. On success the caller's marker advances; on failure it is left
//!    untouched so the round is safely retried

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod handler;
mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{Dataset, ExchangeHandler, HandlerContext};
pub use server::ExchangeServer;
