use crate::error::{QuicError, QuicResult};

use super::types::FrameType;

/// A single frame: `{frame_type: u8, stream_id: u32, offset: u64, length:
/// u16, data: bytes[length]}` (spec data model §3), byte-packed and
/// big-endian.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Frame {
    pub frame_type: FrameType,
    pub stream_id: u32,
    pub offset: u64,
    pub data: Vec<u8>,
}

const HEADER_LEN: usize = 1 + 4 + 8 + 2;

impl Frame {
    pub fn handshake(stream_id: u32, literal: &str) -> Self {
        Self {
            frame_type: FrameType::Handshake,
            stream_id,
            offset: 0,
            data: literal.as_bytes().to_vec(),
        }
    }

    pub fn stream(stream_id: u32, offset: u64, data: Vec<u8>) -> Self {
        Self {
            frame_type: FrameType::Stream,
            stream_id,
            offset,
            data,
        }
    }

    pub fn connection_close(stream_id: u32) -> Self {
        Self {
            frame_type: FrameType::ConnectionClose,
            stream_id,
            offset: 0,
            data: super::types::CONNECTION_CLOSE_LITERAL.as_bytes().to_vec(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.push(self.frame_type.to_byte());
        out.extend_from_slice(&self.stream_id.to_be_bytes());
        out.extend_from_slice(&self.offset.to_be_bytes());
        // data.len() <= 65_535 is an encoding precondition (spec §4.1); callers
        // never construct frames with a longer payload (max_payload is far
        // smaller), so truncating here would hide a programmer error instead.
        out.extend_from_slice(&(self.data.len() as u16).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8], base_offset: usize) -> QuicResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(QuicError::MalformedPacket {
                offset: base_offset,
            });
        }
        let frame_type = FrameType::from_byte(bytes[0]).ok_or(QuicError::MalformedPacket {
            offset: base_offset,
        })?;
        let stream_id = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
        let offset = u64::from_be_bytes(bytes[5..13].try_into().unwrap());
        let length = u16::from_be_bytes(bytes[13..15].try_into().unwrap()) as usize;

        let data_start = HEADER_LEN;
        let data_end = data_start + length;
        if bytes.len() < data_end {
            return Err(QuicError::MalformedPacket {
                offset: base_offset + data_start,
            });
        }

        Ok(Self {
            frame_type,
            stream_id,
            offset,
            data: bytes[data_start..data_end].to_vec(),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn lcg(state: &mut u64) -> u64 {
        *state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        *state >> 32
    }

    #[test]
    fn round_trips_handshake_frame() {
        let frame = Frame::handshake(0, "ClientHello");
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded, 0).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn round_trips_stream_frame_with_random_payloads() {
        let mut state = 0xC0FFEEu64;
        for _ in 0..200 {
            let len = (lcg(&mut state) % 512) as usize;
            let data: Vec<u8> = (0..len).map(|_| (lcg(&mut state) % 256) as u8).collect();
            let offset = lcg(&mut state);
            let stream_id = (lcg(&mut state) % u32::MAX as u64) as u32;
            let frame = Frame::stream(stream_id, offset, data);
            let encoded = frame.encode();
            let decoded = Frame::decode(&encoded, 0).unwrap();
            assert_eq!(frame, decoded);
        }
    }

    #[test]
    fn round_trips_connection_close_frame() {
        let frame = Frame::connection_close(0);
        let encoded = frame.encode();
        let decoded = Frame::decode(&encoded, 0).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn rejects_truncated_data() {
        let frame = Frame::stream(0, 0, vec![1, 2, 3, 4]);
        let mut encoded = frame.encode();
        encoded.truncate(encoded.len() - 1);
        let err = Frame::decode(&encoded, 0).unwrap_err();
        assert!(matches!(err, QuicError::MalformedPacket { .. }));
    }

    #[test]
    fn rejects_unknown_frame_type() {
        let mut encoded = Frame::stream(0, 0, vec![1]).encode();
        encoded[0] = 0xff;
        let err = Frame::decode(&encoded, 0).unwrap_err();
        assert!(matches!(err, QuicError::MalformedPacket { offset: 0 }));
    }
}
