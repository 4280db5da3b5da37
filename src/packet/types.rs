/// Bit 0 of byte 0 of every packet the codec produces: `1` marks a
/// long-form packet (handshake or ACK), `0` marks a short-form packet
/// (STREAM / CONNECTION_CLOSE). This is the one place that literal is
/// named, resolving the split between ad-hoc `'1'` comparisons and a
/// named constant in the prototype this crate replaces.
pub const LONG_FORM_BIT: u8 = 0b0000_0001;

/// A 32-bit per-endpoint connection identifier. By convention the
/// sender's own CID is `1` and the receiver's is `2`; the receiver learns
/// the sender's CID from the ClientHello's source-CID field.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    pub const SENDER: ConnectionId = ConnectionId(1);
    pub const RECEIVER: ConnectionId = ConnectionId(2);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// Recognized frame types (spec data model §3). `0x02` (legacy ACK) is
/// decoded but never constructed: superseded by the ACK packet format,
/// kept only so incoming `0x02` frames from older peers can be
/// recognized and ignored rather than treated as malformed.
#[allow(non_camel_case_types)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FrameType {
    Handshake,
    Stream,
    LegacyAck,
    ConnectionClose,
}

impl FrameType {
    pub const HANDSHAKE: u8 = 0x06;
    pub const STREAM: u8 = 0x08;
    pub const LEGACY_ACK: u8 = 0x02;
    pub const CONNECTION_CLOSE: u8 = 0x1c;

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            Self::HANDSHAKE => Some(Self::Handshake),
            Self::STREAM => Some(Self::Stream),
            Self::LEGACY_ACK => Some(Self::LegacyAck),
            Self::CONNECTION_CLOSE => Some(Self::ConnectionClose),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Self::Handshake => Self::HANDSHAKE,
            Self::Stream => Self::STREAM,
            Self::LegacyAck => Self::LEGACY_ACK,
            Self::ConnectionClose => Self::CONNECTION_CLOSE,
        }
    }
}

pub const CLIENT_HELLO: &str = "ClientHello";
pub const SERVER_HELLO: &str = "ServerHello";
pub const CONNECTION_CLOSE_LITERAL: &str = "CONNECTION_CLOSE";

pub const QUIC_VERSION: u32 = 1;
