//! Connection lifecycle and response routing for a single peer.
//!
//! The connection moves between `Disconnected`, `Connecting` and `Connected`.
//! Requests issued while no connection exists are deferred and released when
//! the in-flight connect attempt resolves. After a remote disconnect the
//! connection stays down until the next request asks for it; reconnecting
//! eagerly would hammer a struggling peer.

use crate::completion::{CompletionTable, Pending};
use crate::config::ClientConfig;
use crate::error::CompletionCode;
use crate::executor::OrderedExecutor;
use crate::metrics::ClientMetrics;
use bytes::Bytes;
use parking_lot::Mutex;
use quill_protocol::codec::{Decoder, Encoder};
use quill_protocol::message::{Request, Response, ResponseBody};
use quill_protocol::ProtocolError;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpSocket, TcpStream};

/// Socket read buffer size (8 KiB).
const READ_BUFFER_SIZE: usize = 8 * 1024;

/// Continuation deferred until a connection exists. Runs with `Ok` once the
/// connection is up, or with `PeerUnavailable` if the attempt failed.
pub(crate) type DeferredOp = Box<dyn FnOnce(CompletionCode) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state and the deferred-op queue, guarded together: every
/// transition that touches one touches the other.
struct SharedState {
    state: ConnectionState,
    deferred_ops: Vec<DeferredOp>,
}

pub(crate) struct Connection {
    addr: SocketAddr,
    config: ClientConfig,
    shared: Mutex<SharedState>,
    /// Fast-path mirror of `SharedState::state == Connected`.
    connected: AtomicBool,
    closed: AtomicBool,
    /// Bumped on every successful connect. A read loop carries the
    /// generation it was spawned under and only tears state down if it is
    /// still the current one.
    generation: AtomicU64,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    completions: Arc<CompletionTable>,
    executor: Arc<OrderedExecutor>,
    metrics: Arc<ClientMetrics>,
}

impl Connection {
    pub(crate) fn new(
        addr: SocketAddr,
        config: ClientConfig,
        completions: Arc<CompletionTable>,
        executor: Arc<OrderedExecutor>,
        metrics: Arc<ClientMetrics>,
    ) -> Arc<Self> {
        Arc::new(Self {
            addr,
            config,
            shared: Mutex::new(SharedState {
                state: ConnectionState::Disconnected,
                deferred_ops: Vec::new(),
            }),
            connected: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            writer: tokio::sync::Mutex::new(None),
            completions,
            executor,
            metrics,
        })
    }

    pub(crate) fn peer_addr(&self) -> SocketAddr {
        self.addr
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Marks the connection closed. Returns true if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.completions.len()
    }

    /// Runs `op` once a connection exists: immediately when already
    /// connected, otherwise after the (possibly shared) connect attempt
    /// resolves.
    pub(crate) fn ensure_connected(self: &Arc<Self>, op: DeferredOp) {
        if self.is_closed() {
            op(CompletionCode::PeerUnavailable);
            return;
        }

        // Common case without the lock.
        if self.connected.load(Ordering::Acquire) {
            op(CompletionCode::Ok);
            return;
        }

        let start_connect = {
            let mut shared = self.shared.lock();
            match shared.state {
                ConnectionState::Connected => {
                    drop(shared);
                    op(CompletionCode::Ok);
                    return;
                }
                ConnectionState::Connecting => {
                    // An attempt is already in flight; it releases the queue
                    // when it resolves.
                    shared.deferred_ops.push(op);
                    false
                }
                ConnectionState::Disconnected => {
                    shared.deferred_ops.push(op);
                    shared.state = ConnectionState::Connecting;
                    true
                }
            }
        };

        // The connect is issued outside the lock so its completion can take
        // the lock without deadlocking.
        if start_connect {
            self.clone().spawn_connect();
        }
    }

    fn spawn_connect(self: Arc<Self>) {
        tokio::spawn(async move {
            tracing::debug!("connecting to peer {}", self.addr);

            let rc = match self.do_connect().await {
                Ok(_) if self.is_closed() => {
                    // close() raced the attempt; drop the fresh socket.
                    CompletionCode::PeerUnavailable
                }
                Ok(stream) => {
                    let (reader, writer) = stream.into_split();
                    *self.writer.lock().await = Some(writer);
                    let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
                    self.spawn_read_loop(reader, generation);
                    self.metrics.connects_total.inc();
                    tracing::info!("connected to peer {}", self.addr);
                    CompletionCode::Ok
                }
                Err(e) => {
                    tracing::warn!("could not connect to peer {}: {}", self.addr, e);
                    self.metrics.connect_failures_total.inc();
                    CompletionCode::PeerUnavailable
                }
            };

            // Swap the queue out under the lock, then release the deferred
            // ops without holding it: any of them may call straight back
            // into this connection.
            let ops = {
                let mut shared = self.shared.lock();
                shared.state = if rc == CompletionCode::Ok {
                    ConnectionState::Connected
                } else {
                    ConnectionState::Disconnected
                };
                std::mem::take(&mut shared.deferred_ops)
            };
            self.connected
                .store(rc == CompletionCode::Ok, Ordering::Release);

            for op in ops {
                op(rc);
            }
        });
    }

    async fn do_connect(&self) -> std::io::Result<TcpStream> {
        let socket = if self.addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if self.config.keep_alive {
            socket.set_keepalive(true)?;
        }

        let stream = tokio::time::timeout(self.config.connect_timeout, socket.connect(self.addr))
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")
            })??;
        stream.set_nodelay(self.config.tcp_no_delay)?;
        Ok(stream)
    }

    fn spawn_read_loop(self: &Arc<Self>, mut reader: OwnedReadHalf, generation: u64) {
        let conn = self.clone();
        tokio::spawn(async move {
            conn.read_loop(&mut reader, generation).await;
            conn.handle_disconnect(generation).await;
        });
    }

    async fn read_loop(&self, reader: &mut OwnedReadHalf, generation: u64) {
        let mut decoder = Decoder::new();
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            if self.is_closed() || self.generation.load(Ordering::Acquire) != generation {
                return;
            }

            let n = match tokio::time::timeout(self.config.read_timeout, reader.read(&mut buf))
                .await
            {
                Err(_) => {
                    // Nothing arrived within the read timeout. Fail whatever
                    // has expired and keep the connection up.
                    self.expire_timed_out_entries();
                    continue;
                }
                Ok(Ok(0)) => {
                    tracing::info!("peer {} disconnected", self.addr);
                    return;
                }
                Ok(Ok(n)) => n,
                Ok(Err(e)) => {
                    // The write-path listeners already report request
                    // failures; keep transport noise out of the logs.
                    tracing::debug!("read error from peer {}: {}", self.addr, e);
                    return;
                }
            };

            decoder.extend(&buf[..n]);
            loop {
                match decoder.decode_response() {
                    Ok(Some(response)) => self.handle_response(response),
                    Ok(None) => break,
                    Err(e @ ProtocolError::FrameTooLarge { .. })
                    | Err(e @ ProtocolError::CorruptFrame(_)) => {
                        // The stream cannot be resynchronized past this.
                        tracing::error!("invalid frame from peer {}: {}", self.addr, e);
                        return;
                    }
                    Err(e) => {
                        tracing::debug!("decode error from peer {}: {}", self.addr, e);
                        return;
                    }
                }
            }
        }
    }

    /// Routes a response to its pending request. Unknown transaction ids are
    /// logged and dropped.
    fn handle_response(&self, response: Response) {
        let header = response.header;
        let Some(pending) = self.completions.remove(header.txn_id) else {
            tracing::error!(
                "unexpected response from peer {} for op {} txn {}",
                self.addr,
                header.op,
                header.txn_id
            );
            return;
        };

        if pending.op_type() != header.op {
            tracing::warn!(
                "response op {} does not match pending op {} for txn {}",
                header.op,
                pending.op_type(),
                header.txn_id
            );
        }

        let peer = self.addr;
        self.executor.submit_ordered(
            pending.ledger_id(),
            Box::new(move || match response.body {
                ResponseBody::Add(add) => {
                    pending.complete(add.status, add.ledger_id, add.entry_id, None, peer)
                }
                ResponseBody::Read(read) => pending.complete(
                    read.status,
                    read.ledger_id,
                    read.entry_id,
                    read.body.map(Bytes::from),
                    peer,
                ),
            }),
        );
    }

    /// Registers the completion and writes the request out. A failed write
    /// errors the request out locally.
    pub(crate) fn send_request(self: &Arc<Self>, txn_id: u64, pending: Pending, request: Request) {
        if let Some(rejected) = self.completions.insert(txn_id, pending) {
            // Monotonic ids make this unreachable; fail the request rather
            // than lose its callback.
            self.dispatch_failed(rejected, CompletionCode::PeerUnavailable);
            return;
        }

        let conn = self.clone();
        tokio::spawn(async move {
            match conn.write_frame(&request).await {
                Ok(()) => {
                    tracing::debug!(
                        "wrote {} request txn {} to peer {}",
                        request.header.op,
                        txn_id,
                        conn.addr
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        "writing {} request txn {} to peer {} failed: {}",
                        request.header.op,
                        txn_id,
                        conn.addr,
                        e
                    );
                    conn.error_out(txn_id);
                }
            }
        });
    }

    async fn write_frame(&self, request: &Request) -> Result<(), ProtocolError> {
        let encoded = Encoder::encode_request(request)?;
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no active connection",
            ))
        })?;
        writer.write_all(&encoded).await?;
        Ok(())
    }

    /// Fails a single in-flight request with `PeerUnavailable`. A no-op if
    /// something else (response, sweeper) already claimed it.
    pub(crate) fn error_out(&self, txn_id: u64) {
        if let Some(pending) = self.completions.remove(txn_id) {
            self.dispatch_failed(pending, CompletionCode::PeerUnavailable);
        }
    }

    /// Schedules the failure callback for a pending request that is no
    /// longer (or never was) in the table.
    pub(crate) fn dispatch_failed(&self, pending: Pending, code: CompletionCode) {
        let peer = self.addr;
        self.executor.submit_ordered(
            pending.ledger_id(),
            Box::new(move || pending.fail(code, peer)),
        );
    }

    /// Fails every in-flight request with `PeerUnavailable`, in submission
    /// order per ledger.
    fn error_out_outstanding(&self) {
        for pending in self.completions.drain() {
            self.dispatch_failed(pending, CompletionCode::PeerUnavailable);
        }
    }

    /// Removes and fails every request whose deadline has passed. Runs from
    /// the sweeper task and from the read loop's idle timeout; responses
    /// racing the sweep win by removing the entry first.
    pub(crate) fn expire_timed_out_entries(&self) {
        let now = Instant::now();
        let keys = self.completions.expired_keys(now);
        if keys.is_empty() {
            return;
        }

        let total = self.completions.len();
        let mut expired = 0usize;
        for txn_id in keys {
            if let Some(pending) = self.completions.remove_if_expired(txn_id, now) {
                expired += 1;
                self.metrics
                    .timeouts_total
                    .with_label_values(&[pending.op_type().name()])
                    .inc();
                self.dispatch_failed(pending, CompletionCode::RequestTimeout);
            }
        }

        if expired > 0 {
            tracing::warn!(
                "timed out {} of {} outstanding requests to peer {}",
                expired,
                total,
                self.addr
            );
        }
    }

    /// Tears the connection down after its read loop exits. Stale read
    /// loops (from a connection that has since been replaced) are ignored.
    async fn handle_disconnect(self: &Arc<Self>, generation: u64) {
        if self.is_closed() {
            return;
        }
        {
            let mut shared = self.shared.lock();
            if self.generation.load(Ordering::Acquire) != generation {
                return;
            }
            shared.state = ConnectionState::Disconnected;
        }
        self.connected.store(false, Ordering::Release);
        self.metrics.disconnects_total.inc();

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        // No reconnect here: the next request initiates one.
        self.error_out_outstanding();
    }

    /// Shuts the connection down for good: releases deferred ops, closes the
    /// transport and fails everything still outstanding. The closed flag
    /// must already be set.
    pub(crate) async fn shutdown(&self) {
        let ops = {
            let mut shared = self.shared.lock();
            shared.state = ConnectionState::Disconnected;
            std::mem::take(&mut shared.deferred_ops)
        };
        self.connected.store(false, Ordering::Release);

        for op in ops {
            op(CompletionCode::PeerUnavailable);
        }

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }

        self.error_out_outstanding();
    }
}
