use crate::error::{QuicError, QuicResult};

use super::ack::AckPacket;
use super::frame::Frame;
use super::header::{LongHeader, ShortHeader};
use super::types::LONG_FORM_BIT;

/// The three packet shapes the wire actually carries. A long-form packet
/// (bit 0 of byte 0 set) is either a handshake packet or an ACK packet;
/// the two share a discriminant bit but not a layout, so the codec tells
/// them apart structurally rather than by a second type field (spec §4.1).
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Packet {
    Handshake { header: LongHeader, frame: Frame },
    Ack(AckPacket),
    Data { header: ShortHeader, frame: Frame },
}

impl Packet {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Packet::Handshake { header, frame } => header.encode(&frame.encode()),
            Packet::Ack(ack) => ack.encode(),
            Packet::Data { header, frame } => header.encode(&frame.encode()),
        }
    }

    /// Dispatches on bit 0 of byte 0, then (for long-form packets) on
    /// whether the remainder looks like a fixed ACK prefix whose declared
    /// block count exactly accounts for the rest of the buffer.
    pub fn decode(bytes: &[u8]) -> QuicResult<Self> {
        if bytes.is_empty() {
            return Err(QuicError::MalformedPacket { offset: 0 });
        }

        if bytes[0] & LONG_FORM_BIT == 0 {
            let (header, payload) = ShortHeader::decode(bytes)?;
            let frame = Frame::decode(payload, ShortHeader::len())?;
            return Ok(Packet::Data { header, frame });
        }

        if AckPacket::looks_like_ack(bytes) {
            return Ok(Packet::Ack(AckPacket::decode(bytes)?));
        }

        let (header, payload) = LongHeader::decode(bytes)?;
        let base_offset = bytes.len() - payload.len();
        let frame = Frame::decode(payload, base_offset)?;
        Ok(Packet::Handshake { header, frame })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::types::ConnectionId;

    #[test]
    fn round_trips_handshake_packet() {
        let header = LongHeader::client_hello(ConnectionId::new(2), ConnectionId::new(1));
        let frame = Frame::handshake(0, "ClientHello");
        let packet = Packet::Handshake { header, frame };
        let encoded = packet.encode();
        assert_eq!(Packet::decode(&encoded).unwrap(), packet);
    }

    #[test]
    fn round_trips_data_packet() {
        let header = ShortHeader::new(ConnectionId::new(2), 7);
        let frame = Frame::stream(0, 128, vec![1, 2, 3, 4, 5]);
        let packet = Packet::Data { header, frame };
        let encoded = packet.encode();
        assert_eq!(Packet::decode(&encoded).unwrap(), packet);
    }

    #[test]
    fn round_trips_connection_close_packet() {
        let header = ShortHeader::new(ConnectionId::new(2), 9);
        let frame = Frame::connection_close(0);
        let packet = Packet::Data { header, frame };
        let encoded = packet.encode();
        assert_eq!(Packet::decode(&encoded).unwrap(), packet);
    }

    #[test]
    fn round_trips_ack_packet() {
        let packet = Packet::Ack(AckPacket::new(ConnectionId::new(2), 3, 20, vec![(1, 2), (4, 4)]));
        let encoded = packet.encode();
        assert_eq!(Packet::decode(&encoded).unwrap(), packet);
    }

    #[test]
    fn discriminates_handshake_from_ack_with_same_leading_bit() {
        let handshake = Packet::Handshake {
            header: LongHeader::client_hello(ConnectionId::new(2), ConnectionId::new(1)),
            frame: Frame::handshake(0, "ClientHello"),
        };
        let ack = Packet::Ack(AckPacket::new(ConnectionId::new(2), 1, 20, vec![(1, 1)]));
        assert!(matches!(
            Packet::decode(&handshake.encode()).unwrap(),
            Packet::Handshake { .. }
        ));
        assert!(matches!(Packet::decode(&ack.encode()).unwrap(), Packet::Ack(_)));
    }

    #[test]
    fn rejects_empty_input() {
        assert!(Packet::decode(&[]).is_err());
    }
}
