//! Client configuration.

use std::time::Duration;

/// Configuration for a [`PeerClient`](crate::PeerClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout, and the idle window after which the read loop
    /// sweeps for expired requests. A request whose response has not arrived
    /// within this duration completes with `RequestTimeout`.
    pub read_timeout: Duration,
    /// Interval at which the background sweeper scans for expired requests.
    pub timeout_task_interval: Duration,
    /// Disable Nagle's algorithm on the connection.
    pub tcp_no_delay: bool,
    /// Enable TCP keep-alive on the connection.
    pub keep_alive: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(5),
            timeout_task_interval: Duration::from_secs(1),
            tcp_no_delay: true,
            keep_alive: true,
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_timeout_task_interval(mut self, interval: Duration) -> Self {
        self.timeout_task_interval = interval;
        self
    }

    pub fn with_tcp_no_delay(mut self, enabled: bool) -> Self {
        self.tcp_no_delay = enabled;
        self
    }

    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }
}
