//! Binary frame format for QLP.
//!
//! Frame layout (4-byte length prefix + payload):
//!
//! ```text
//! +-------------+------------------------+
//! | length      | payload                |
//! | 4 bytes BE  | length bytes           |
//! +-------------+------------------------+
//! ```
//!
//! The length counts only the payload bytes that follow it.

use crate::error::ProtocolError;
use crate::MAX_FRAME_LENGTH;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// A parsed QLP frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Frame payload (schema-encoded message).
    pub payload: Bytes,
}

impl Frame {
    /// Creates a new frame with the given payload.
    pub fn new(payload: Bytes) -> Self {
        Self { payload }
    }

    /// Creates a new frame from a serializable message.
    pub fn from_message<T: serde::Serialize>(value: &T) -> Result<Self, ProtocolError> {
        let payload = serde_json::to_vec(value)?;
        Ok(Self::new(Bytes::from(payload)))
    }

    /// Encodes the frame into bytes.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        if self.payload.len() > MAX_FRAME_LENGTH {
            return Err(ProtocolError::FrameTooLarge {
                size: self.payload.len(),
                max: MAX_FRAME_LENGTH,
            });
        }

        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + self.payload.len());
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        Ok(buf)
    }

    /// Decodes a frame from bytes.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol errors.
    /// Nothing is consumed from `buf` until a whole frame is available.
    pub fn decode(buf: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if buf.len() < LENGTH_PREFIX_SIZE {
            return Ok(None);
        }

        // Peek at the length without consuming; the size check must happen
        // before waiting for the body so an oversized frame fails fast.
        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if payload_len > MAX_FRAME_LENGTH {
            return Err(ProtocolError::FrameTooLarge {
                size: payload_len,
                max: MAX_FRAME_LENGTH,
            });
        }

        if buf.len() < LENGTH_PREFIX_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Self { payload }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_roundtrip() {
        let payload = Bytes::from_static(b"{\"header\":{}}");
        let frame = Frame::new(payload.clone());

        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.payload, payload);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_incomplete_prefix() {
        let mut buf = BytesMut::from(&b"\x00\x00"[..]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
        // Nothing consumed.
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_incomplete_body() {
        let frame = Frame::new(Bytes::from_static(b"0123456789"));
        let encoded = frame.encode().unwrap();

        let mut buf = BytesMut::from(&encoded[..encoded.len() - 3]);
        assert!(Frame::decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_encode_too_large() {
        let frame = Frame::new(Bytes::from(vec![0u8; MAX_FRAME_LENGTH + 1]));
        let result = frame.encode();
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_decode_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_LENGTH + 1) as u32);
        let result = Frame::decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_decode_at_max_length() {
        let frame = Frame::new(Bytes::from(vec![7u8; MAX_FRAME_LENGTH]));
        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload.len(), MAX_FRAME_LENGTH);
    }

    #[test]
    fn test_empty_payload() {
        let frame = Frame::new(Bytes::new());
        let mut buf = frame.encode().unwrap();
        let decoded = Frame::decode(&mut buf).unwrap().unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let frame1 = Frame::new(Bytes::from_static(b"first"));
        let frame2 = Frame::new(Bytes::from_static(b"second"));

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame1.encode().unwrap());
        buf.extend_from_slice(&frame2.encode().unwrap());

        let decoded1 = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded1.payload.as_ref(), b"first");

        let decoded2 = Frame::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded2.payload.as_ref(), b"second");
    }
}
