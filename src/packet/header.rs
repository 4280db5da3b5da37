use crate::bits::{compose_bits, decompose_bits};
use crate::error::{QuicError, QuicResult};

use super::types::{ConnectionId, LONG_FORM_BIT, QUIC_VERSION};

/// `{header_form=1, fixed=1, packet_type: 2, reserved: 2, pn_length: 2,
/// version: u32, dcid_len: u8, dcid, scid_len: u8, scid, payload_length:
/// u16, payload}` (spec data model §3). Carries handshake frames only.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LongHeader {
    pub packet_type: u8, // 2 bits
    pub reserved: u8,    // 2 bits
    pub pn_length: u8,   // 2 bits
    pub version: u32,
    pub dcid: ConnectionId,
    pub scid: ConnectionId,
}

const CID_BYTES: u8 = 4;

impl LongHeader {
    /// Builds the header shape used for both directions of the
    /// handshake (ClientHello and ServerHello carry the same header
    /// layout; only the enclosed frame's literal differs).
    pub fn handshake(dcid: ConnectionId, scid: ConnectionId) -> Self {
        Self {
            packet_type: 0,
            reserved: 0,
            pn_length: 0b11,
            version: QUIC_VERSION,
            dcid,
            scid,
        }
    }

    pub fn client_hello(dcid: ConnectionId, scid: ConnectionId) -> Self {
        Self::handshake(dcid, scid)
    }

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let first_byte = compose_bits(&[
            (LONG_FORM_BIT, 1),
            (1, 1), // fixed bit
            (self.packet_type, 2),
            (self.reserved, 2),
            (self.pn_length, 2),
        ]);

        let mut out = Vec::with_capacity(1 + 4 + 1 + 4 + 1 + 4 + 2 + payload.len());
        out.push(first_byte);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.push(CID_BYTES);
        out.extend_from_slice(&self.dcid.get().to_be_bytes());
        out.push(CID_BYTES);
        out.extend_from_slice(&self.scid.get().to_be_bytes());
        out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    /// Returns the decoded header and the slice of `bytes` holding the
    /// payload (the frame bytes that follow the header).
    pub fn decode(bytes: &[u8]) -> QuicResult<(Self, &[u8])> {
        if bytes.is_empty() {
            return Err(QuicError::MalformedPacket { offset: 0 });
        }
        let groups = decompose_bits(bytes[0], &[1, 1, 2, 2, 2]);
        let (header_form, _fixed, packet_type, reserved, pn_length) =
            (groups[0], groups[1], groups[2], groups[3], groups[4]);
        if header_form != LONG_FORM_BIT {
            return Err(QuicError::MalformedPacket { offset: 0 });
        }

        if bytes.len() < 5 {
            return Err(QuicError::MalformedPacket { offset: 1 });
        }
        let version = u32::from_be_bytes(bytes[1..5].try_into().unwrap());

        let mut cursor = 5usize;
        let dcid = Self::read_cid(bytes, &mut cursor)?;
        let scid = Self::read_cid(bytes, &mut cursor)?;

        if bytes.len() < cursor + 2 {
            return Err(QuicError::MalformedPacket { offset: cursor });
        }
        let payload_length =
            u16::from_be_bytes(bytes[cursor..cursor + 2].try_into().unwrap()) as usize;
        cursor += 2;

        if bytes.len() < cursor + payload_length {
            return Err(QuicError::MalformedPacket { offset: cursor });
        }

        Ok((
            Self {
                packet_type,
                reserved,
                pn_length,
                version,
                dcid,
                scid,
            },
            &bytes[cursor..cursor + payload_length],
        ))
    }

    fn read_cid(bytes: &[u8], cursor: &mut usize) -> QuicResult<ConnectionId> {
        if bytes.len() <= *cursor {
            return Err(QuicError::MalformedPacket { offset: *cursor });
        }
        let len = bytes[*cursor] as usize;
        *cursor += 1;
        if bytes.len() < *cursor + len || len != CID_BYTES as usize {
            return Err(QuicError::MalformedPacket { offset: *cursor });
        }
        let cid = u32::from_be_bytes(bytes[*cursor..*cursor + 4].try_into().unwrap());
        *cursor += len;
        Ok(ConnectionId::new(cid))
    }

    /// Length a header with the given CIDs would occupy, matching the
    /// feasibility check the packet decoder uses to tell a handshake
    /// header apart from an ACK packet.
    pub fn min_len() -> usize {
        1 + 4 + 1 + CID_BYTES as usize + 1 + CID_BYTES as usize + 2
    }
}

/// `{header_form=0, key_phase: 1, dcid: u64, packet_number: u32, payload}`
/// (spec data model §3). Carries STREAM and CONNECTION_CLOSE frames.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ShortHeader {
    pub key_phase: bool,
    pub dcid: ConnectionId,
    pub packet_number: u32,
}

impl ShortHeader {
    pub fn new(dcid: ConnectionId, packet_number: u32) -> Self {
        Self {
            key_phase: false,
            dcid,
            packet_number,
        }
    }

    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        let first_byte = compose_bits(&[
            (!LONG_FORM_BIT & 1, 1),
            (self.key_phase as u8, 1),
            (0, 6), // unused
        ]);
        let mut out = Vec::with_capacity(1 + 8 + 4 + payload.len());
        out.push(first_byte);
        out.extend_from_slice(&(self.dcid.get() as u64).to_be_bytes());
        out.extend_from_slice(&self.packet_number.to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    pub fn decode(bytes: &[u8]) -> QuicResult<(Self, &[u8])> {
        if bytes.len() < Self::len() {
            return Err(QuicError::MalformedPacket { offset: 0 });
        }
        let groups = decompose_bits(bytes[0], &[1, 1, 6]);
        if groups[0] != 0 {
            return Err(QuicError::MalformedPacket { offset: 0 });
        }
        let key_phase = groups[1] != 0;
        let dcid_u64 = u64::from_be_bytes(bytes[1..9].try_into().unwrap());
        let dcid = ConnectionId::new(dcid_u64 as u32);
        let packet_number = u32::from_be_bytes(bytes[9..13].try_into().unwrap());
        Ok((
            Self {
                key_phase,
                dcid,
                packet_number,
            },
            &bytes[13..],
        ))
    }

    pub const fn len() -> usize {
        1 + 8 + 4
    }
}
