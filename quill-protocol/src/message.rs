//! Message types for QLP requests and responses.
//!
//! Every message is an envelope carrying a small header (protocol version,
//! operation type, transaction id) and exactly one operation-specific
//! sub-message. Requests only travel client to store; responses only travel
//! store to client.

use serde::{Deserialize, Serialize};
use std::fmt;

/// QLP operation types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    AddEntry,
    ReadEntry,
}

impl OperationType {
    /// Stable wire/metric label for this operation.
    pub fn name(&self) -> &'static str {
        match self {
            OperationType::AddEntry => "ADD_ENTRY",
            OperationType::ReadEntry => "READ_ENTRY",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Status codes returned by the store.
///
/// These are numeric on the wire and part of the protocol contract. Codes
/// this implementation does not know about round-trip as `Unknown` so the
/// client can still surface them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum StatusCode {
    /// EOK: operation succeeded.
    Ok,
    /// ENOENTRY: no such entry in the ledger.
    NoEntry,
    /// ENOLEDGER: no such ledger on this node.
    NoLedger,
    /// EBADREQ: malformed request.
    BadRequest,
    /// EIO: store-side I/O failure.
    Io,
    /// EUA: master key mismatch.
    UnauthorizedAccess,
    /// EBADVERSION: protocol version not supported by the store.
    BadVersion,
    /// EFENCED: ledger is fenced, no further adds accepted.
    Fenced,
    /// A code this client version does not know about.
    Unknown(u32),
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        match code {
            0 => StatusCode::Ok,
            1 => StatusCode::NoEntry,
            2 => StatusCode::NoLedger,
            100 => StatusCode::BadRequest,
            101 => StatusCode::Io,
            102 => StatusCode::UnauthorizedAccess,
            103 => StatusCode::BadVersion,
            104 => StatusCode::Fenced,
            other => StatusCode::Unknown(other),
        }
    }
}

impl From<StatusCode> for u32 {
    fn from(status: StatusCode) -> Self {
        match status {
            StatusCode::Ok => 0,
            StatusCode::NoEntry => 1,
            StatusCode::NoLedger => 2,
            StatusCode::BadRequest => 100,
            StatusCode::Io => 101,
            StatusCode::UnauthorizedAccess => 102,
            StatusCode::BadVersion => 103,
            StatusCode::Fenced => 104,
            StatusCode::Unknown(other) => other,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Ok => write!(f, "EOK"),
            StatusCode::NoEntry => write!(f, "ENOENTRY"),
            StatusCode::NoLedger => write!(f, "ENOLEDGER"),
            StatusCode::BadRequest => write!(f, "EBADREQ"),
            StatusCode::Io => write!(f, "EIO"),
            StatusCode::UnauthorizedAccess => write!(f, "EUA"),
            StatusCode::BadVersion => write!(f, "EBADVERSION"),
            StatusCode::Fenced => write!(f, "EFENCED"),
            StatusCode::Unknown(code) => write!(f, "E?{}", code),
        }
    }
}

/// Header carried by every request and response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHeader {
    /// Protocol version.
    pub version: u16,
    /// Operation this message belongs to.
    pub op: OperationType,
    /// Transaction id correlating a response to its request.
    pub txn_id: u64,
}

impl PacketHeader {
    pub fn new(op: OperationType, txn_id: u64) -> Self {
        Self {
            version: crate::PROTOCOL_VERSION,
            op,
            txn_id,
        }
    }
}

/// Add-request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AddFlag {
    /// This add is part of ledger recovery.
    RecoveryAdd,
}

/// Read-request flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReadFlag {
    /// Fence the ledger before serving the read.
    FenceLedger,
}

/// Caller-facing options bitfield for add operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddOptions(u32);

impl AddOptions {
    /// The add is issued as part of ledger recovery.
    pub const RECOVERY: u32 = 1 << 0;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with_recovery(mut self) -> Self {
        self.0 |= Self::RECOVERY;
        self
    }

    pub fn is_recovery(&self) -> bool {
        self.0 & Self::RECOVERY != 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// Payload of an add-entry request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddRequest {
    pub ledger_id: u64,
    pub entry_id: i64,
    /// Credential authorizing appends to the ledger.
    pub master_key: Vec<u8>,
    /// Entry payload.
    pub body: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<AddFlag>,
}

/// Payload of a read-entry request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadRequest {
    pub ledger_id: u64,
    pub entry_id: i64,
    /// Only set for fencing reads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_key: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<ReadFlag>,
}

/// Operation-specific request sub-message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestBody {
    Add(AddRequest),
    Read(ReadRequest),
}

/// Request envelope (outbound only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub header: PacketHeader,
    pub body: RequestBody,
}

impl Request {
    /// Builds an add-entry request.
    pub fn add_entry(
        txn_id: u64,
        ledger_id: u64,
        entry_id: i64,
        master_key: Vec<u8>,
        body: Vec<u8>,
        options: AddOptions,
    ) -> Self {
        Self {
            header: PacketHeader::new(OperationType::AddEntry, txn_id),
            body: RequestBody::Add(AddRequest {
                ledger_id,
                entry_id,
                master_key,
                body,
                flag: options.is_recovery().then_some(AddFlag::RecoveryAdd),
            }),
        }
    }

    /// Builds a plain read-entry request.
    pub fn read_entry(txn_id: u64, ledger_id: u64, entry_id: i64) -> Self {
        Self {
            header: PacketHeader::new(OperationType::ReadEntry, txn_id),
            body: RequestBody::Read(ReadRequest {
                ledger_id,
                entry_id,
                master_key: None,
                flag: None,
            }),
        }
    }

    /// Builds a read-entry request that fences the ledger first.
    pub fn read_entry_and_fence(
        txn_id: u64,
        ledger_id: u64,
        entry_id: i64,
        master_key: Vec<u8>,
    ) -> Self {
        Self {
            header: PacketHeader::new(OperationType::ReadEntry, txn_id),
            body: RequestBody::Read(ReadRequest {
                ledger_id,
                entry_id,
                master_key: Some(master_key),
                flag: Some(ReadFlag::FenceLedger),
            }),
        }
    }
}

/// Payload of an add-entry response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddResponse {
    pub status: StatusCode,
    pub ledger_id: u64,
    pub entry_id: i64,
}

/// Payload of a read-entry response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub status: StatusCode,
    pub ledger_id: u64,
    pub entry_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

/// Operation-specific response sub-message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseBody {
    Add(AddResponse),
    Read(ReadResponse),
}

/// Response envelope (inbound only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub header: PacketHeader,
    pub body: ResponseBody,
}

impl Response {
    /// Builds an add-entry response.
    pub fn add(txn_id: u64, status: StatusCode, ledger_id: u64, entry_id: i64) -> Self {
        Self {
            header: PacketHeader::new(OperationType::AddEntry, txn_id),
            body: ResponseBody::Add(AddResponse {
                status,
                ledger_id,
                entry_id,
            }),
        }
    }

    /// Builds a read-entry response.
    pub fn read(
        txn_id: u64,
        status: StatusCode,
        ledger_id: u64,
        entry_id: i64,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            header: PacketHeader::new(OperationType::ReadEntry, txn_id),
            body: ResponseBody::Read(ReadResponse {
                status,
                ledger_id,
                entry_id,
                body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_request_builder() {
        let req = Request::add_entry(
            10,
            7,
            3,
            b"key".to_vec(),
            b"x".to_vec(),
            AddOptions::new(),
        );
        assert_eq!(req.header.op, OperationType::AddEntry);
        assert_eq!(req.header.txn_id, 10);
        assert_eq!(req.header.version, crate::PROTOCOL_VERSION);
        match &req.body {
            RequestBody::Add(add) => {
                assert_eq!(add.ledger_id, 7);
                assert_eq!(add.entry_id, 3);
                assert!(add.flag.is_none());
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_recovery_add_sets_flag() {
        let req = Request::add_entry(
            1,
            1,
            0,
            vec![],
            vec![],
            AddOptions::new().with_recovery(),
        );
        match req.body {
            RequestBody::Add(add) => assert_eq!(add.flag, Some(AddFlag::RecoveryAdd)),
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_fence_read_sets_flag_and_key() {
        let req = Request::read_entry_and_fence(1, 2, 0, b"key".to_vec());
        match req.body {
            RequestBody::Read(read) => {
                assert_eq!(read.flag, Some(ReadFlag::FenceLedger));
                assert_eq!(read.master_key.as_deref(), Some(&b"key"[..]));
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_plain_read_has_no_key() {
        let req = Request::read_entry(1, 9, crate::LAST_ADD_CONFIRMED);
        match req.body {
            RequestBody::Read(read) => {
                assert!(read.master_key.is_none());
                assert!(read.flag.is_none());
                assert_eq!(read.entry_id, crate::LAST_ADD_CONFIRMED);
            }
            other => panic!("unexpected body: {:?}", other),
        }
    }

    #[test]
    fn test_request_serialization() {
        let req = Request::read_entry(42, 1, 2);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains(r#""op":"READ_ENTRY""#));
        assert!(json.contains(r#""txn_id":42"#));

        let parsed: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, req);
    }

    #[test]
    fn test_status_code_wire_values() {
        assert_eq!(u32::from(StatusCode::Ok), 0);
        assert_eq!(u32::from(StatusCode::NoEntry), 1);
        assert_eq!(u32::from(StatusCode::NoLedger), 2);
        assert_eq!(u32::from(StatusCode::BadRequest), 100);
        assert_eq!(u32::from(StatusCode::Io), 101);
        assert_eq!(u32::from(StatusCode::UnauthorizedAccess), 102);
        assert_eq!(u32::from(StatusCode::BadVersion), 103);
        assert_eq!(u32::from(StatusCode::Fenced), 104);
    }

    #[test]
    fn test_unknown_status_roundtrip() {
        let status = StatusCode::from(907u32);
        assert_eq!(status, StatusCode::Unknown(907));
        assert_eq!(u32::from(status), 907);

        let json = serde_json::to_string(&status).unwrap();
        assert_eq!(json, "907");
        let parsed: StatusCode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::read(5, StatusCode::Fenced, 2, 0, None);
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""status":104"#));

        let parsed: Response = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, resp);
    }

    #[test]
    fn test_add_options() {
        let options = AddOptions::new();
        assert!(!options.is_recovery());
        assert_eq!(options.bits(), 0);

        let options = options.with_recovery();
        assert!(options.is_recovery());
        assert_eq!(options.bits(), AddOptions::RECOVERY);
    }
}
