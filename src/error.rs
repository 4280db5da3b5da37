use std::io;

use thiserror::Error;

/// Every fatal and advisory condition the transport can raise.
///
/// Codec failures (`MalformedPacket`) are swallowed at the datagram
/// boundary per the propagation policy: callers log and continue rather
/// than bubbling them up. Every other variant ends a session.
#[derive(Debug, Error)]
pub enum QuicError {
    #[error("malformed packet at byte offset {offset}")]
    MalformedPacket { offset: usize },

    #[error("received a short-header packet before the peer CID was learned")]
    UnexpectedDataBeforeHandshake,

    #[error("both time_threshold and reordering_threshold are disabled; no loss recovery is configured")]
    NoRecoveryAlgorithm,

    #[error("handshake retry ceiling ({limit}) exceeded without a ServerHello")]
    HandshakeRetryExceeded { limit: u32 },

    #[error("receiver idle timeout elapsed with no datagram received")]
    IdleTimeout,

    #[error("endpoint I/O error: {0}")]
    EndpointIo(#[from] io::Error),

    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),
}

pub type QuicResult<T> = Result<T, QuicError>;

/// Errors specific to offset-based stream reassembly on the receiver.
#[derive(Debug, Error)]
pub enum ReassemblyError {
    #[error(
        "stream closed with a hole: {received_bytes} bytes received out of {expected_bytes} expected"
    )]
    IncompleteStream {
        received_bytes: u64,
        expected_bytes: u64,
    },
}
