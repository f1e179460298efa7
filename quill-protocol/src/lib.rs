//! # quill-protocol
//!
//! Wire protocol implementation for quill (QLP - Quill Ledger Protocol).
//!
//! This crate provides:
//! - Length-prefixed binary framing
//! - Request/Response message types and builders
//! - Status codes and protocol constants

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::{Frame, LENGTH_PREFIX_SIZE};
pub use message::{
    AddFlag, AddOptions, AddRequest, AddResponse, OperationType, PacketHeader, ReadFlag,
    ReadRequest, ReadResponse, Request, RequestBody, Response, ResponseBody, StatusCode,
};

/// Protocol version supported by this implementation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default port for a quill store node.
pub const DEFAULT_PORT: u16 = 7411;

/// Maximum frame payload size (2 MiB).
pub const MAX_FRAME_LENGTH: usize = 2 * 1024 * 1024;

/// Sentinel entry id requesting the highest durably-replicated entry of a
/// ledger. The store resolves it and replies with the actual entry id.
pub const LAST_ADD_CONFIRMED: i64 = -1;
