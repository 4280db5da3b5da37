//! `quicklane`: a simplified QUIC-style reliable file-transfer transport
//! layered atop connectionless datagrams (see `SPEC_FULL.md`). Reuses
//! QUIC's terminology — long/short headers, frames, ACK ranges, CIDs —
//! over a drastically simplified wire format; not a conformant QUIC
//! implementation.

pub mod bits;
pub mod endpoint;
pub mod error;
pub mod packet;
pub mod primitives;
pub mod receiver;
pub mod recovery;
pub mod sender;
pub mod tracking;

pub use error::{QuicError, QuicResult};

pub const QUICLANE_VERSION: u32 = packet::QUIC_VERSION;
