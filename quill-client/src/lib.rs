//! # quill-client
//!
//! Per-peer client for the quill ledger store.
//!
//! A [`PeerClient`] owns one framed TCP connection to a single store node and
//! multiplexes asynchronous add-entry and read-entry requests over it.
//! Responses are correlated back to their requests by transaction id, each
//! request is bounded by a timeout, and completion callbacks for the same
//! ledger run in submission order on an ordered executor.
//!
//! The client never reconnects on its own after a remote disconnect; the
//! next request initiates a fresh connection attempt.

pub mod client;
pub mod completion;
pub mod config;
mod connection;
pub mod error;
pub mod executor;
pub mod metrics;

pub use client::PeerClient;
pub use completion::{ReadCallback, WriteCallback};
pub use config::ClientConfig;
pub use error::{ClientError, CompletionCode};
pub use executor::OrderedExecutor;
pub use metrics::ClientMetrics;
