//! High-level per-peer client API.

use crate::completion::{next_txn_id, Pending, ReadCallback, WriteCallback};
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::{ClientError, CompletionCode};
use crate::executor::OrderedExecutor;
use crate::metrics::ClientMetrics;
use bytes::Bytes;
use quill_protocol::message::{AddOptions, OperationType, Request};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A client for a single remote ledger-store node.
///
/// One `PeerClient` owns one framed TCP connection and multiplexes every
/// request over it. Requests complete through their callbacks exactly once,
/// whether by response, timeout, disconnect or [`close`](Self::close);
/// callbacks for the same ledger run sequentially in submission order.
///
/// Must be created from within a tokio runtime: the constructor spawns the
/// background timeout sweeper, and the request methods spawn I/O tasks.
pub struct PeerClient {
    conn: Arc<Connection>,
    config: ClientConfig,
    metrics: Arc<ClientMetrics>,
    shutdown: broadcast::Sender<()>,
}

impl PeerClient {
    /// Creates a client for the node at `addr`.
    ///
    /// No connection is made yet; the first request triggers one.
    pub fn new(addr: SocketAddr, config: ClientConfig) -> Self {
        let metrics = Arc::new(ClientMetrics::default());
        let completions = Arc::new(crate::completion::CompletionTable::new());
        let executor = Arc::new(OrderedExecutor::new());
        let conn = Connection::new(
            addr,
            config.clone(),
            completions,
            executor,
            metrics.clone(),
        );

        let (shutdown, _) = broadcast::channel(1);
        Self::spawn_timeout_sweeper(&conn, &config, shutdown.subscribe());

        Self {
            conn,
            config,
            metrics,
            shutdown,
        }
    }

    /// Periodically errors out requests whose deadline has passed.
    fn spawn_timeout_sweeper(
        conn: &Arc<Connection>,
        config: &ClientConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        let conn = conn.clone();
        let period = config.timeout_task_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => conn.expire_timed_out_entries(),
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    /// The address of the peer this client talks to.
    pub fn peer_addr(&self) -> SocketAddr {
        self.conn.peer_addr()
    }

    /// Number of requests currently awaiting completion.
    pub fn pending_request_count(&self) -> usize {
        self.conn.pending_count()
    }

    /// Metrics for this client.
    pub fn metrics(&self) -> &ClientMetrics {
        &self.metrics
    }

    /// Appends an entry to a ledger on this peer.
    ///
    /// `cb` is invoked exactly once with
    /// `(code, ledger_id, entry_id, peer_address)`.
    pub fn add_entry(
        &self,
        ledger_id: u64,
        master_key: &[u8],
        entry_id: i64,
        payload: Bytes,
        options: AddOptions,
        cb: WriteCallback,
    ) -> Result<(), ClientError> {
        if self.conn.is_closed() {
            return Err(ClientError::Closed);
        }

        let txn_id = next_txn_id();
        let request = Request::add_entry(
            txn_id,
            ledger_id,
            entry_id,
            master_key.to_vec(),
            payload.to_vec(),
            options,
        );
        let pending = Pending::add(
            ledger_id,
            entry_id,
            cb,
            self.config.read_timeout,
            self.metrics.clone(),
        );
        self.metrics
            .requests_total
            .with_label_values(&[OperationType::AddEntry.name()])
            .inc();

        self.submit(txn_id, pending, request);
        Ok(())
    }

    /// Reads an entry from a ledger on this peer.
    ///
    /// `entry_id` may be [`LAST_ADD_CONFIRMED`](quill_protocol::LAST_ADD_CONFIRMED),
    /// in which case the peer resolves it and the callback reports the
    /// actual entry id. `cb` is invoked exactly once with
    /// `(code, ledger_id, entry_id, body_or_none)`.
    pub fn read_entry(
        &self,
        ledger_id: u64,
        entry_id: i64,
        cb: ReadCallback,
    ) -> Result<(), ClientError> {
        if self.conn.is_closed() {
            return Err(ClientError::Closed);
        }

        let txn_id = next_txn_id();
        let request = Request::read_entry(txn_id, ledger_id, entry_id);
        let pending = Pending::read(
            ledger_id,
            entry_id,
            cb,
            self.config.read_timeout,
            self.metrics.clone(),
        );
        self.metrics
            .requests_total
            .with_label_values(&[OperationType::ReadEntry.name()])
            .inc();

        self.submit(txn_id, pending, request);
        Ok(())
    }

    /// Fences the ledger on this peer, then reads an entry from it.
    ///
    /// Fencing stops the ledger from accepting further adds; it is used
    /// during ledger recovery.
    pub fn read_entry_and_fence(
        &self,
        ledger_id: u64,
        master_key: &[u8],
        entry_id: i64,
        cb: ReadCallback,
    ) -> Result<(), ClientError> {
        if self.conn.is_closed() {
            return Err(ClientError::Closed);
        }

        let txn_id = next_txn_id();
        let request =
            Request::read_entry_and_fence(txn_id, ledger_id, entry_id, master_key.to_vec());
        let pending = Pending::read(
            ledger_id,
            entry_id,
            cb,
            self.config.read_timeout,
            self.metrics.clone(),
        );
        self.metrics
            .requests_total
            .with_label_values(&[OperationType::ReadEntry.name()])
            .inc();

        self.submit(txn_id, pending, request);
        Ok(())
    }

    /// Hands the request to the connection, connecting first if necessary.
    fn submit(&self, txn_id: u64, pending: Pending, request: Request) {
        let conn = self.conn.clone();
        self.conn.ensure_connected(Box::new(move |rc| {
            if rc == CompletionCode::Ok {
                conn.send_request(txn_id, pending, request);
            } else {
                conn.dispatch_failed(pending, rc);
            }
        }));
    }

    /// Shuts the client down.
    ///
    /// Stops the timeout sweeper, closes the transport and fails every
    /// outstanding request with `PeerUnavailable`. Idempotent; afterwards
    /// all request methods return [`ClientError::Closed`].
    pub async fn close(&self) {
        if self.conn.mark_closed() {
            return;
        }
        tracing::debug!("closing client for peer {}", self.conn.peer_addr());
        let _ = self.shutdown.send(());
        self.conn.shutdown().await;
    }
}
