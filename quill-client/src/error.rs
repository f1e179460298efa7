//! Client error types and completion codes.

use quill_protocol::message::StatusCode;
use std::fmt;
use thiserror::Error;

/// Result code delivered to completion callbacks.
///
/// Server status codes map onto these; the remaining variants describe
/// client-side outcomes (connection loss, timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompletionCode {
    /// The operation succeeded.
    Ok,
    /// The entry or the whole ledger does not exist on this peer.
    NoSuchEntry,
    /// The peer rejected the protocol version.
    ProtocolVersion,
    /// The master key did not authorize the operation.
    UnauthorizedAccess,
    /// The ledger is fenced; no further adds are accepted.
    LedgerFenced,
    /// An add failed with a status this client cannot interpret.
    WriteFailure,
    /// The peer could not be reached, the connection dropped, or the client
    /// was closed while the request was outstanding.
    PeerUnavailable,
    /// No response arrived before the request deadline.
    RequestTimeout,
}

impl CompletionCode {
    /// Maps a server status code to a completion code.
    ///
    /// Returns `None` for statuses with no direct mapping; the caller picks
    /// the operation-appropriate fallback.
    pub(crate) fn from_status(status: StatusCode) -> Option<CompletionCode> {
        match status {
            StatusCode::Ok => Some(CompletionCode::Ok),
            StatusCode::NoEntry | StatusCode::NoLedger => Some(CompletionCode::NoSuchEntry),
            StatusCode::BadVersion => Some(CompletionCode::ProtocolVersion),
            StatusCode::UnauthorizedAccess => Some(CompletionCode::UnauthorizedAccess),
            StatusCode::Fenced => Some(CompletionCode::LedgerFenced),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        *self == CompletionCode::Ok
    }
}

impl fmt::Display for CompletionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompletionCode::Ok => "Ok",
            CompletionCode::NoSuchEntry => "NoSuchEntry",
            CompletionCode::ProtocolVersion => "ProtocolVersion",
            CompletionCode::UnauthorizedAccess => "UnauthorizedAccess",
            CompletionCode::LedgerFenced => "LedgerFenced",
            CompletionCode::WriteFailure => "WriteFailure",
            CompletionCode::PeerUnavailable => "PeerUnavailable",
            CompletionCode::RequestTimeout => "RequestTimeout",
        };
        f.write_str(name)
    }
}

/// Errors returned synchronously by the request methods.
///
/// Completion failures are never raised here; they always arrive through the
/// request callback.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("client is closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping_is_total_for_known_codes() {
        assert_eq!(
            CompletionCode::from_status(StatusCode::Ok),
            Some(CompletionCode::Ok)
        );
        assert_eq!(
            CompletionCode::from_status(StatusCode::NoEntry),
            Some(CompletionCode::NoSuchEntry)
        );
        assert_eq!(
            CompletionCode::from_status(StatusCode::NoLedger),
            Some(CompletionCode::NoSuchEntry)
        );
        assert_eq!(
            CompletionCode::from_status(StatusCode::BadVersion),
            Some(CompletionCode::ProtocolVersion)
        );
        assert_eq!(
            CompletionCode::from_status(StatusCode::UnauthorizedAccess),
            Some(CompletionCode::UnauthorizedAccess)
        );
        assert_eq!(
            CompletionCode::from_status(StatusCode::Fenced),
            Some(CompletionCode::LedgerFenced)
        );
    }

    #[test]
    fn test_unmapped_statuses_have_no_direct_code() {
        assert_eq!(CompletionCode::from_status(StatusCode::BadRequest), None);
        assert_eq!(CompletionCode::from_status(StatusCode::Io), None);
        assert_eq!(
            CompletionCode::from_status(StatusCode::Unknown(907)),
            None
        );
    }

    #[test]
    fn test_is_ok() {
        assert!(CompletionCode::Ok.is_ok());
        assert!(!CompletionCode::RequestTimeout.is_ok());
    }
}
