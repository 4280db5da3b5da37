use crate::bits::{compose_bits, decompose_bits};
use crate::error::{QuicError, QuicResult};

use super::types::{ConnectionId, LONG_FORM_BIT};

/// `{header_form=1, key_phase: 1, dcid: u64, packet_number: u32,
/// ack_delay: u16 (ms), block_count: u32, blocks: [(low: u32, high:
/// u32)] * block_count}` (spec data model §3). Shares the long-form
/// discriminant bit with [`super::header::LongHeader`] but has no
/// version or CID-length fields, which is how the packet decoder tells
/// the two apart.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AckPacket {
    pub key_phase: bool,
    pub dcid: ConnectionId,
    pub packet_number: u32,
    pub ack_delay_ms: u16,
    pub ranges: Vec<(u32, u32)>,
}

/// Bytes before the range list: header byte + dcid(8) + packet_number(4)
/// + ack_delay(2) + block_count(4).
pub const FIXED_PREFIX_LEN: usize = 1 + 8 + 4 + 2 + 4;
const RANGE_LEN: usize = 8;

impl AckPacket {
    pub fn new(dcid: ConnectionId, packet_number: u32, ack_delay_ms: u16, ranges: Vec<(u32, u32)>) -> Self {
        Self {
            key_phase: false,
            dcid,
            packet_number,
            ack_delay_ms,
            ranges,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let first_byte = compose_bits(&[(LONG_FORM_BIT, 1), (self.key_phase as u8, 1), (0, 6)]);
        let mut out = Vec::with_capacity(FIXED_PREFIX_LEN + self.ranges.len() * RANGE_LEN);
        out.push(first_byte);
        out.extend_from_slice(&(self.dcid.get() as u64).to_be_bytes());
        out.extend_from_slice(&self.packet_number.to_be_bytes());
        out.extend_from_slice(&self.ack_delay_ms.to_be_bytes());
        out.extend_from_slice(&(self.ranges.len() as u32).to_be_bytes());
        for (low, high) in &self.ranges {
            out.extend_from_slice(&low.to_be_bytes());
            out.extend_from_slice(&high.to_be_bytes());
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> QuicResult<Self> {
        if bytes.len() < FIXED_PREFIX_LEN {
            return Err(QuicError::MalformedPacket { offset: 0 });
        }
        let groups = decompose_bits(bytes[0], &[1, 1, 6]);
        if groups[0] != LONG_FORM_BIT {
            return Err(QuicError::MalformedPacket { offset: 0 });
        }
        let key_phase = groups[1] != 0;
        let dcid = u64::from_be_bytes(bytes[1..9].try_into().unwrap());
        let packet_number = u32::from_be_bytes(bytes[9..13].try_into().unwrap());
        let ack_delay_ms = u16::from_be_bytes(bytes[13..15].try_into().unwrap());
        let block_count = u32::from_be_bytes(bytes[15..19].try_into().unwrap()) as usize;

        let expected_len = FIXED_PREFIX_LEN
            .checked_add(block_count.checked_mul(RANGE_LEN).ok_or(QuicError::MalformedPacket {
                offset: 15,
            })?)
            .ok_or(QuicError::MalformedPacket { offset: 15 })?;
        if bytes.len() != expected_len {
            return Err(QuicError::MalformedPacket {
                offset: FIXED_PREFIX_LEN,
            });
        }

        let mut ranges = Vec::with_capacity(block_count);
        let mut cursor = FIXED_PREFIX_LEN;
        for _ in 0..block_count {
            let low = u32::from_be_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
            let high = u32::from_be_bytes(bytes[cursor + 4..cursor + 8].try_into().unwrap());
            ranges.push((low, high));
            cursor += RANGE_LEN;
        }

        Ok(Self {
            key_phase,
            dcid: ConnectionId::new(dcid as u32),
            packet_number,
            ack_delay_ms,
            ranges,
        })
    }

    /// Whether `bytes` is structurally consistent as an ACK packet: the
    /// fixed prefix's declared block count must exactly account for every
    /// remaining byte. Used by [`super::packet::Packet::decode`] to
    /// distinguish an ACK packet from a handshake long header, both of
    /// which set the long-form bit.
    pub fn looks_like_ack(bytes: &[u8]) -> bool {
        if bytes.len() < FIXED_PREFIX_LEN {
            return false;
        }
        let block_count = u32::from_be_bytes(bytes[15..19].try_into().unwrap()) as usize;
        match block_count.checked_mul(RANGE_LEN).and_then(|n| n.checked_add(FIXED_PREFIX_LEN)) {
            Some(expected) => expected == bytes.len(),
            None => false,
        }
    }
}
