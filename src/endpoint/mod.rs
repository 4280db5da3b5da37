//! Thin interface around non-blocking datagram send/recv and timeouts
//! (spec component design §4.6). The codec and state machines consume
//! this trait and never inspect socket internals, so unit/integration
//! tests can swap a real socket for an in-process mock.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

pub mod mock;

/// Matches std's own `io::Error` with `ErrorKind::WouldBlock` (no
/// datagram available, non-blocking mode) and `ErrorKind::TimedOut` /
/// `ErrorKind::WouldBlock` (read deadline elapsed) so callers written
/// against `std::net::UdpSocket` carry over unchanged.
pub trait Endpoint {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize>;
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()>;
    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

/// Real UDP transport. Thin wrapper: every method forwards directly to
/// `std::net::UdpSocket`.
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(Self { socket })
    }
}

impl Endpoint for UdpEndpoint {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.socket.recv_from(buf)
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        self.socket.set_read_timeout(dur)
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.socket.set_nonblocking(nonblocking)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

pub use mock::{LinkCondition, MockEndpoint};
