//! Encoder and decoder for QLP frames and messages.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::message::{Request, Response};
use bytes::BytesMut;

/// Encodes requests and responses into frames.
pub struct Encoder;

impl Encoder {
    /// Encodes a request into a frame.
    pub fn encode_request(request: &Request) -> Result<BytesMut, ProtocolError> {
        let frame = Frame::from_message(request)?;
        frame.encode()
    }

    /// Encodes a response into a frame.
    pub fn encode_response(response: &Response) -> Result<BytesMut, ProtocolError> {
        let frame = Frame::from_message(response)?;
        frame.encode()
    }
}

/// Decodes a byte stream into frames and messages.
pub struct Decoder {
    buffer: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(8192),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Result<Option<Frame>, ProtocolError> {
        Frame::decode(&mut self.buffer)
    }

    /// Attempts to decode the next request from the buffer.
    pub fn decode_request(&mut self) -> Result<Option<Request>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => {
                let request: Request = serde_json::from_slice(&frame.payload)?;
                Ok(Some(request))
            }
            None => Ok(None),
        }
    }

    /// Attempts to decode the next response from the buffer.
    pub fn decode_response(&mut self) -> Result<Option<Response>, ProtocolError> {
        match self.decode_frame()? {
            Some(frame) => {
                let response: Response = serde_json::from_slice(&frame.payload)?;
                Ok(Some(response))
            }
            None => Ok(None),
        }
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AddOptions, Request, Response, StatusCode};
    use bytes::Bytes;

    #[test]
    fn test_request_roundtrip() {
        let request = Request::add_entry(
            42,
            7,
            3,
            b"key".to_vec(),
            b"x".to_vec(),
            AddOptions::new(),
        );
        let encoded = Encoder::encode_request(&request).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let decoded = decoder.decode_request().unwrap().unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_response_roundtrip() {
        let response = Response::read(42, StatusCode::Ok, 9, 77, Some(b"data".to_vec()));
        let encoded = Encoder::encode_response(&response).unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let decoded = decoder.decode_response().unwrap().unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_partial_frame_decoding() {
        let request = Request::read_entry(1, 1, 1);
        let encoded = Encoder::encode_request(&request).unwrap();

        let mut decoder = Decoder::new();

        decoder.extend(&encoded[..10]);
        assert!(decoder.decode_request().unwrap().is_none());

        decoder.extend(&encoded[10..]);
        let decoded = decoder.decode_request().unwrap().unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_corrupt_frame() {
        let frame = crate::frame::Frame::new(Bytes::from_static(b"not a message"));
        let encoded = frame.encode().unwrap();

        let mut decoder = Decoder::new();
        decoder.extend(&encoded);

        let result = decoder.decode_response();
        assert!(matches!(result, Err(ProtocolError::CorruptFrame(_))));
    }

    #[test]
    fn test_back_to_back_responses() {
        let first = Response::add(1, StatusCode::Ok, 5, 0);
        let second = Response::add(2, StatusCode::Fenced, 5, 1);

        let mut decoder = Decoder::new();
        decoder.extend(&Encoder::encode_response(&first).unwrap());
        decoder.extend(&Encoder::encode_response(&second).unwrap());

        assert_eq!(decoder.decode_response().unwrap().unwrap(), first);
        assert_eq!(decoder.decode_response().unwrap().unwrap(), second);
        assert!(decoder.decode_response().unwrap().is_none());
    }
}
