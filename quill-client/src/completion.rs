//! Completion tracking for in-flight requests.
//!
//! Every accepted request inserts a [`Pending`] into the [`CompletionTable`]
//! keyed by its transaction id. The response router, the timeout sweeper,
//! the disconnect handler and close() all race to `remove` an entry; whoever
//! wins the removal delivers the single user callback.

use crate::error::CompletionCode;
use crate::metrics::ClientMetrics;
use bytes::Bytes;
use dashmap::DashMap;
use quill_protocol::message::{OperationType, StatusCode};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Process-wide transaction id generator, shared by every peer client so ids
/// stay unique across peers for log correlation.
// TODO: a per-peer generator would also work; ids only need to be unique
// within one connection.
static TXN_ID_GENERATOR: AtomicU64 = AtomicU64::new(0);

/// Allocates the next transaction id.
pub(crate) fn next_txn_id() -> u64 {
    TXN_ID_GENERATOR.fetch_add(1, Ordering::Relaxed) + 1
}

/// Completion callback for add-entry requests:
/// `(code, ledger_id, entry_id, peer_address)`.
pub type WriteCallback = Box<dyn FnOnce(CompletionCode, u64, i64, SocketAddr) + Send>;

/// Completion callback for read-entry requests:
/// `(code, ledger_id, entry_id, body_or_none)`.
pub type ReadCallback = Box<dyn FnOnce(CompletionCode, u64, i64, Option<Bytes>) + Send>;

enum PendingKind {
    Add(WriteCallback),
    Read(ReadCallback),
}

/// An in-flight request awaiting its completion.
pub(crate) struct Pending {
    ledger_id: u64,
    /// Entry id as requested; reported back on failure paths where no
    /// response is available to supply one.
    entry_id: i64,
    started_at: Instant,
    deadline: Instant,
    metrics: Arc<ClientMetrics>,
    kind: PendingKind,
}

impl Pending {
    pub(crate) fn add(
        ledger_id: u64,
        entry_id: i64,
        cb: WriteCallback,
        timeout: Duration,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        let started_at = Instant::now();
        Self {
            ledger_id,
            entry_id,
            started_at,
            deadline: started_at + timeout,
            metrics,
            kind: PendingKind::Add(cb),
        }
    }

    pub(crate) fn read(
        ledger_id: u64,
        entry_id: i64,
        cb: ReadCallback,
        timeout: Duration,
        metrics: Arc<ClientMetrics>,
    ) -> Self {
        let started_at = Instant::now();
        Self {
            ledger_id,
            entry_id,
            started_at,
            deadline: started_at + timeout,
            metrics,
            kind: PendingKind::Read(cb),
        }
    }

    pub(crate) fn ledger_id(&self) -> u64 {
        self.ledger_id
    }

    pub(crate) fn op_type(&self) -> OperationType {
        match self.kind {
            PendingKind::Add(_) => OperationType::AddEntry,
            PendingKind::Read(_) => OperationType::ReadEntry,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Completes this request from a server response.
    ///
    /// The ledger and entry ids come from the response: a read issued with
    /// the last-add-confirmed sentinel is answered with the resolved entry
    /// id, which is what the caller wants to see.
    pub(crate) fn complete(
        self,
        status: StatusCode,
        ledger_id: u64,
        entry_id: i64,
        body: Option<Bytes>,
        peer: SocketAddr,
    ) {
        let Pending {
            started_at,
            metrics,
            kind,
            ..
        } = self;
        let latency = started_at.elapsed();

        match kind {
            PendingKind::Add(cb) => {
                let code = CompletionCode::from_status(status).unwrap_or_else(|| {
                    tracing::error!(
                        "add to ledger {} entry {} failed on peer {} with status {}",
                        ledger_id,
                        entry_id,
                        peer,
                        status
                    );
                    CompletionCode::WriteFailure
                });
                if code.is_ok() {
                    metrics.register_successful_event(OperationType::AddEntry, latency);
                } else {
                    metrics.register_failed_event(OperationType::AddEntry, latency);
                }
                cb(code, ledger_id, entry_id, peer);
            }
            PendingKind::Read(cb) => {
                let code = CompletionCode::from_status(status).unwrap_or_else(|| {
                    tracing::error!(
                        "read of ledger {} entry {} failed on peer {} with status {}",
                        ledger_id,
                        entry_id,
                        peer,
                        status
                    );
                    CompletionCode::NoSuchEntry
                });
                if code.is_ok() {
                    metrics.register_successful_event(OperationType::ReadEntry, latency);
                } else {
                    metrics.register_failed_event(OperationType::ReadEntry, latency);
                }
                cb(code, ledger_id, entry_id, body);
            }
        }
    }

    /// Fails this request with a client-side code (connection loss, timeout,
    /// close). The request's own ledger and entry ids are reported.
    pub(crate) fn fail(self, code: CompletionCode, peer: SocketAddr) {
        let Pending {
            ledger_id,
            entry_id,
            started_at,
            metrics,
            kind,
            ..
        } = self;
        let latency = started_at.elapsed();

        match kind {
            PendingKind::Add(cb) => {
                metrics.register_failed_event(OperationType::AddEntry, latency);
                cb(code, ledger_id, entry_id, peer);
            }
            PendingKind::Read(cb) => {
                metrics.register_failed_event(OperationType::ReadEntry, latency);
                cb(code, ledger_id, entry_id, None);
            }
        }
    }
}

/// Thread-safe map of transaction id to pending request.
///
/// Shared by the writer path (insert), the response router (remove), the
/// sweeper (remove-if-expired) and the disconnect handler (drain). Removal
/// is the synchronization point: the caller that gets `Some` back owns the
/// one and only callback delivery.
pub(crate) struct CompletionTable {
    entries: DashMap<u64, Mutex<Pending>>,
}

impl CompletionTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Inserts a pending request. Transaction ids come from a monotonic
    /// generator, so a collision is an invariant violation: the existing
    /// entry stays authoritative and the rejected value is handed back.
    pub(crate) fn insert(&self, txn_id: u64, pending: Pending) -> Option<Pending> {
        match self.entries.entry(txn_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                tracing::error!("duplicate txn id {} in completion table", txn_id);
                Some(pending)
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Mutex::new(pending));
                None
            }
        }
    }

    /// Atomically removes and returns the pending request for `txn_id`.
    pub(crate) fn remove(&self, txn_id: u64) -> Option<Pending> {
        self.entries
            .remove(&txn_id)
            .map(|(_, pending)| pending.into_inner().unwrap())
    }

    /// Removes the pending request only if its deadline has passed.
    pub(crate) fn remove_if_expired(&self, txn_id: u64, now: Instant) -> Option<Pending> {
        self.entries
            .remove_if(&txn_id, |_, pending| {
                pending.lock().unwrap().is_expired(now)
            })
            .map(|(_, pending)| pending.into_inner().unwrap())
    }

    /// Returns the txn ids of all entries expired at `now`, in submission
    /// (txn id) order. Entries may complete concurrently; callers must
    /// tolerate `remove_if_expired` returning `None` for a listed key.
    pub(crate) fn expired_keys(&self, now: Instant) -> Vec<u64> {
        let mut keys: Vec<u64> = self
            .entries
            .iter()
            .filter(|entry| entry.value().lock().unwrap().is_expired(now))
            .map(|entry| *entry.key())
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Removes and returns every pending request, in submission (txn id)
    /// order so same-ledger failures are delivered in the order the
    /// requests were issued.
    pub(crate) fn drain(&self) -> Vec<Pending> {
        let mut keys: Vec<u64> = self.entries.iter().map(|entry| *entry.key()).collect();
        keys.sort_unstable();

        let mut drained = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, pending)) = self.entries.remove(&key) {
                drained.push(pending.into_inner().unwrap());
            }
        }
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
