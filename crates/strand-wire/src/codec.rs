use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;
use crate::message::RpcMessage;

/// Largest payload accepted in a single frame (10 MiB).
pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Hard cap on the read buffer (16 MiB). Exceeding it is fatal to the
/// session even when no single frame is oversized.
pub const MAX_BUFFER_SIZE: usize = 16 * 1024 * 1024;

const LENGTH_HEADER: usize = 4;

/// Length-delimited MessagePack codec.
///
/// Frame format:
/// ┌──────────────┬──────────────────────────┐
/// │ Length (4B)  │ Payload (msgpack map)    │
/// │ big-endian   │                          │
/// └──────────────┴──────────────────────────┘
#[derive(Debug)]
pub struct RpcCodec {
    max_message_size: usize,
}

impl RpcCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for RpcCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl Decoder for RpcCodec {
    type Item = RpcMessage;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() > MAX_BUFFER_SIZE {
            return Err(WireError::BufferOverflow(src.len()));
        }

        if src.len() < LENGTH_HEADER {
            return Ok(None);
        }

        let mut length_bytes = [0u8; LENGTH_HEADER];
        length_bytes.copy_from_slice(&src[..LENGTH_HEADER]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        if length > self.max_message_size {
            return Err(WireError::InvalidLength(length));
        }

        // Wait for the complete frame.
        if src.len() < LENGTH_HEADER + length {
            src.reserve(LENGTH_HEADER + length - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_HEADER);
        let payload = src.split_to(length);

        let message = rmp_serde::from_slice(&payload)?;
        Ok(Some(message))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None => Err(WireError::IncompleteMessage(src.len())),
        }
    }
}

impl Encoder<RpcMessage> for RpcCodec {
    type Error = WireError;

    fn encode(&mut self, item: RpcMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = rmp_serde::to_vec_named(&item)?;

        if payload.len() > self.max_message_size {
            return Err(WireError::InvalidLength(payload.len()));
        }

        dst.reserve(LENGTH_HEADER + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::PatternKind;
    use rmpv::Value;

    fn sample(pattern: &str) -> RpcMessage {
        RpcMessage::request(
            pattern,
            Value::Map(vec![(Value::from("x"), Value::from(1))]),
        )
        .with_id("id-1")
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut codec = RpcCodec::default();
        let mut buf = BytesMut::new();

        codec.encode(sample("echo"), &mut buf).unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded.pattern, "echo");
        assert_eq!(decoded.kind, PatternKind::Request);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_header_waits_for_more() {
        let mut codec = RpcCodec::default();
        let mut full = BytesMut::new();
        codec.encode(sample("echo"), &mut full).unwrap();

        // Feed the frame one byte at a time; every prefix must yield None
        // until the final byte lands.
        let mut buf = BytesMut::new();
        let frame = full.to_vec();
        for (i, byte) in frame.iter().enumerate() {
            buf.put_u8(*byte);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < frame.len() {
                assert!(decoded.is_none(), "decoded early at byte {}", i);
            } else {
                assert_eq!(decoded.unwrap().pattern, "echo");
            }
        }
    }

    #[test]
    fn test_two_frames_in_one_read() {
        let mut codec = RpcCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(sample("first"), &mut buf).unwrap();
        codec.encode(sample("second"), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().pattern, "first");
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().pattern, "second");
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversized_length_header_rejected() {
        let mut codec = RpcCodec::default();
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_MESSAGE_SIZE + 1) as u32);
        buf.put_slice(b"garbage");

        assert!(matches!(
            codec.decode(&mut buf),
            Err(WireError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_oversized_payload_rejected_on_encode() {
        let mut codec = RpcCodec::new(64);
        let mut buf = BytesMut::new();
        let message = RpcMessage::request("big", Value::Binary(vec![0u8; 128]));

        assert!(matches!(
            codec.encode(message, &mut buf),
            Err(WireError::InvalidLength(_))
        ));
    }

    #[test]
    fn test_eof_with_clean_buffer() {
        let mut codec = RpcCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_eof_with_truncated_frame() {
        let mut codec = RpcCodec::default();
        let mut full = BytesMut::new();
        codec.encode(sample("echo"), &mut full).unwrap();

        // Drop the last byte and signal EOF.
        let mut buf = BytesMut::from(&full[..full.len() - 1]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(WireError::IncompleteMessage(_))
        ));
    }

    #[test]
    fn test_garbage_payload_is_a_decode_error() {
        let mut codec = RpcCodec::default();
        let mut buf = BytesMut::new();
        // A frame whose payload is not a valid message map.
        buf.put_u32(3);
        buf.put_slice(&[0xc1, 0xc1, 0xc1]);

        assert!(matches!(codec.decode(&mut buf), Err(WireError::Decode(_))));
    }
}
