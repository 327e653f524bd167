//! Frame Codec (spec.md §4.1).
//!
//! A 6-octet header — `message_id: u16` then `payload_length: u32`, both
//! big-endian — followed by a UTF-8 JSON payload. Driven through
//! `tokio_util::codec::Framed` over a raw `TcpStream`, the way `tokio-util`
//! is used for custom framing in the `rdaum-moor` pack repo.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;

const HEADER_LEN: usize = 6;
/// 64 KiB minus the header, per spec.md §4.1.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024 - HEADER_LEN;
/// Upper bound on buffered-but-incomplete bytes before a connection is
/// treated as abusive and torn down (spec.md §4.1 "buffer overflow").
const MAX_BUFFERED_LEN: usize = MAX_PAYLOAD_LEN * 4;

/// A single decoded frame: message id plus raw JSON payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub message_id: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(message_id: u16, payload: Vec<u8>) -> Self {
        Self {
            message_id,
            payload,
        }
    }
}

/// Stateless besides the partial-frame buffer `tokio_util::codec::Framed`
/// keeps on our behalf; `FrameCodec` itself carries no per-connection state.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameCodec;

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        if src.len() > MAX_BUFFERED_LEN {
            return Err(ProtocolError::BufferOverflow);
        }

        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let message_id = u16::from_be_bytes([src[0], src[1]]);
        let payload_length = u32::from_be_bytes([src[2], src[3], src[4], src[5]]) as usize;

        if payload_length > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(payload_length));
        }

        if src.len() < HEADER_LEN + payload_length {
            // Partial frame; wait for more bytes without consuming any.
            src.reserve(HEADER_LEN + payload_length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(payload_length).to_vec();

        Ok(Some(Frame::new(message_id, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, ProtocolError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedFrame),
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        if frame.payload.len() > MAX_PAYLOAD_LEN {
            return Err(ProtocolError::PayloadTooLarge(frame.payload.len()));
        }
        dst.reserve(HEADER_LEN + frame.payload.len());
        dst.put_u16(frame.message_id);
        dst.put_u32(frame.payload.len() as u32);
        dst.put_slice(&frame.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn partial_frame_stays_buffered() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_u16(0x0001);
        buf.put_u32(10);
        buf.put_slice(b"12345");
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn oversized_payload_is_fatal() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_u16(0x0001);
        buf.put_u32((MAX_PAYLOAD_LEN + 1) as u32);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::PayloadTooLarge(_)));
    }

    #[test]
    fn decode_eof_on_truncated_tail_is_fatal() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        buf.put_u16(0x0001);
        buf.put_u32(10);
        buf.put_slice(b"123");
        let err = codec.decode_eof(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::TruncatedFrame));
    }

    #[test]
    fn decode_eof_on_clean_boundary_is_none() {
        let mut codec = FrameCodec;
        let mut buf = BytesMut::new();
        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
    }

    proptest! {
        #[test]
        fn encode_then_decode_round_trips(message_id: u16, payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let mut codec = FrameCodec;
            let mut buf = BytesMut::new();
            let frame = Frame::new(message_id, payload.clone());
            codec.encode(frame, &mut buf).unwrap();
            let decoded = codec.decode(&mut buf).unwrap().expect("complete frame");
            prop_assert_eq!(decoded.message_id, message_id);
            prop_assert_eq!(decoded.payload, payload);
            prop_assert!(buf.is_empty());
        }
    }
}
