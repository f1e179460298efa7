//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while framing or decoding protocol messages.
///
/// `FrameTooLarge` and `CorruptFrame` are connection-fatal: the peer is no
/// longer speaking the protocol and the stream cannot be resynchronized.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("corrupt frame: {0}")]
    CorruptFrame(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
