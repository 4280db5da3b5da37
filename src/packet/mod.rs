pub mod ack;
pub mod frame;
pub mod header;
pub mod packet;
pub mod types;

pub use ack::AckPacket;
pub use frame::Frame;
pub use header::{LongHeader, ShortHeader};
pub use packet::Packet;
pub use types::*;
