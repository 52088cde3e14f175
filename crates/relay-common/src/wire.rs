//! Binary frame layout and resumable decoding.
//!
//! Every frame starts with a fixed 12-byte header:
//!
//! ```text
//! +------+------+---------+------+---------------+------------+
//! | 0xAA | 0xBB | version | type | sequence (i32) | length (u32) |
//! +------+------+---------+------+---------------+------------+
//!    1      1       1        1          4              4
//! ```
//!
//! followed by `length` payload bytes (the JSON-encoded envelope). All
//! multi-byte integers are big-endian. The decoder is resumable: it consumes
//! nothing from the buffer until an entire frame is present, so a frame split
//! arbitrarily across socket reads reassembles correctly.

use bytes::{Buf, BufMut, BytesMut};

use crate::protocol::{ErrorCode, Result, RpcError};

pub const MAGIC_1: u8 = 0xAA;
pub const MAGIC_2: u8 = 0xBB;
pub const VERSION: u8 = 0x01;
pub const HEADER_LENGTH: usize = 12;

/// Upper bound on a single frame's payload. A length field beyond this is
/// treated as stream corruption, not a large message.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Discriminates request frames from response frames on a multiplexed
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Request = 1,
    Response = 2,
}

impl TryFrom<u8> for FrameType {
    type Error = RpcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameType::Request),
            2 => Ok(FrameType::Response),
            other => Err(RpcError::Network {
                code: ErrorCode::ResponseParseError,
                message: format!("unknown frame type {other:#04x}"),
            }),
        }
    }
}

/// A decoded wire frame. The sequence id pairs responses with their pending
/// requests on a multiplexed connection; a response frame always echoes the
/// id of the request it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub sequence_id: i32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn request(sequence_id: i32, payload: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Request,
            sequence_id,
            payload,
        }
    }

    pub fn response(sequence_id: i32, payload: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Response,
            sequence_id,
            payload,
        }
    }
}

/// Appends the binary encoding of `frame` to `buf`.
pub fn encode(frame: &Frame, buf: &mut BytesMut) {
    buf.reserve(HEADER_LENGTH + frame.payload.len());
    buf.put_u8(MAGIC_1);
    buf.put_u8(MAGIC_2);
    buf.put_u8(VERSION);
    buf.put_u8(frame.frame_type as u8);
    buf.put_i32(frame.sequence_id);
    buf.put_u32(frame.payload.len() as u32);
    buf.put_slice(&frame.payload);
}

/// Attempts to decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` when the buffer does not yet hold a complete frame;
/// no bytes are consumed in that case, so the caller can append more data
/// and call again. Returns an error on a magic/version mismatch, an unknown
/// frame type, or an oversized length field. After an error the stream is
/// desynchronized and the connection must be closed.
pub fn decode(buf: &mut BytesMut) -> Result<Option<Frame>> {
    if buf.len() < HEADER_LENGTH {
        return Ok(None);
    }

    if buf[0] != MAGIC_1 || buf[1] != MAGIC_2 {
        return Err(RpcError::Network {
            code: ErrorCode::ResponseParseError,
            message: format!("bad magic bytes {:#04x} {:#04x}", buf[0], buf[1]),
        });
    }
    if buf[2] != VERSION {
        return Err(RpcError::Network {
            code: ErrorCode::ResponseParseError,
            message: format!("unsupported protocol version {:#04x}", buf[2]),
        });
    }

    let frame_type = FrameType::try_from(buf[3])?;
    let length = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]) as usize;
    if length > MAX_PAYLOAD_SIZE {
        return Err(RpcError::Network {
            code: ErrorCode::ResponseParseError,
            message: format!("frame payload of {length} bytes exceeds {MAX_PAYLOAD_SIZE}"),
        });
    }

    if buf.len() < HEADER_LENGTH + length {
        return Ok(None);
    }

    let sequence_id = i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
    buf.advance(HEADER_LENGTH);
    let payload = buf.split_to(length).to_vec();

    Ok(Some(Frame {
        frame_type,
        sequence_id,
        payload,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let frame = Frame::request(7, b"{\"service\":\"Echo\"}".to_vec());
        let mut buf = BytesMut::new();
        encode(&frame, &mut buf);

        let decoded = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_header_yields_none() {
        let mut buf = BytesMut::from(&[MAGIC_1, MAGIC_2, VERSION][..]);
        assert!(decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn frame_split_across_two_chunks() {
        let frame = Frame::response(-3, vec![0x42; 100]);
        let mut encoded = BytesMut::new();
        encode(&frame, &mut encoded);
        let bytes = encoded.to_vec();

        // Split inside the payload.
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&bytes[..20]);
        assert!(decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 20);

        buf.extend_from_slice(&bytes[20..]);
        let decoded = decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn split_inside_header() {
        let frame = Frame::request(1, b"x".to_vec());
        let mut encoded = BytesMut::new();
        encode(&frame, &mut encoded);
        let bytes = encoded.to_vec();

        let mut buf = BytesMut::new();
        buf.extend_from_slice(&bytes[..5]);
        assert!(decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(&bytes[5..]);
        assert_eq!(decode(&mut buf).unwrap().unwrap(), frame);
    }

    #[test]
    fn two_frames_back_to_back() {
        let first = Frame::request(1, b"a".to_vec());
        let second = Frame::request(2, b"bb".to_vec());
        let mut buf = BytesMut::new();
        encode(&first, &mut buf);
        encode(&second, &mut buf);

        assert_eq!(decode(&mut buf).unwrap().unwrap(), first);
        assert_eq!(decode(&mut buf).unwrap().unwrap(), second);
        assert!(decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn bad_magic_is_fatal() {
        let mut buf = BytesMut::from(&[0xDE, 0xAD, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0][..]);
        let err = decode(&mut buf).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::ResponseParseError));
    }

    #[test]
    fn oversized_length_is_fatal() {
        let mut buf = BytesMut::new();
        buf.put_u8(MAGIC_1);
        buf.put_u8(MAGIC_2);
        buf.put_u8(VERSION);
        buf.put_u8(FrameType::Request as u8);
        buf.put_i32(1);
        buf.put_u32((MAX_PAYLOAD_SIZE + 1) as u32);
        assert!(decode(&mut buf).is_err());
    }

    #[test]
    fn unknown_frame_type_is_fatal() {
        let mut buf = BytesMut::new();
        buf.put_u8(MAGIC_1);
        buf.put_u8(MAGIC_2);
        buf.put_u8(VERSION);
        buf.put_u8(9);
        buf.put_i32(1);
        buf.put_u32(0);
        assert!(decode(&mut buf).is_err());
    }
}
