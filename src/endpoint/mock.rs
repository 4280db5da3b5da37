//! In-process substitute for a UDP socket pair, backed by real
//! `std::sync::mpsc` channels. Used by `tests/end_to_end.rs` to drive a
//! sender and receiver session against each other (each on its own
//! thread) without opening real sockets, and to inject reproducible
//! packet loss the way the Python prototype's shell-driven `tc qdisc
//! netem` harness (`original_source/Tests/test_QUIC.py`) did externally.

use std::io;
use std::net::SocketAddr;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Endpoint;
use crate::primitives::chance;

type Datagram = (Vec<u8>, SocketAddr);

/// A rule applied to every datagram handed to [`MockEndpoint::send_to`]
/// before it reaches the peer's inbox. `drop_if` lets a test target a
/// specific packet deterministically (e.g. "drop the first stream
/// packet whose payload encodes offset 0"); `loss_percent` adds
/// independent random loss on top, using the crate's deterministic LCG
/// so test runs are reproducible.
#[derive(Default)]
pub struct LinkCondition {
    pub loss_percent: u8,
    pub drop_if: Option<Box<dyn Fn(&[u8]) -> bool + Send + Sync>>,
}

impl LinkCondition {
    fn should_drop(&self, buf: &[u8]) -> bool {
        if let Some(predicate) = &self.drop_if {
            if predicate(buf) {
                return true;
            }
        }
        self.loss_percent > 0 && chance(self.loss_percent)
    }
}

/// One endpoint of a mock datagram link. Construct a connected pair with
/// [`MockEndpoint::pair`]; each side sees the other's address via
/// `recv_from`/`send_to`.
pub struct MockEndpoint {
    self_addr: SocketAddr,
    peer_addr: SocketAddr,
    tx: Sender<Datagram>,
    rx: Receiver<Datagram>,
    read_timeout: Mutex<Option<Duration>>,
    nonblocking: Mutex<bool>,
    outbound_link: Arc<Mutex<LinkCondition>>,
}

impl MockEndpoint {
    /// Builds a connected pair of mock endpoints at the given addresses.
    /// `sender_link` conditions datagrams flowing from the first endpoint
    /// to the second; `receiver_link` conditions the reverse direction
    /// (ACKs, ServerHello, etc). Pass `LinkCondition::default()` for a
    /// lossless direction.
    pub fn pair(
        addr_a: SocketAddr,
        addr_b: SocketAddr,
        a_to_b_link: LinkCondition,
        b_to_a_link: LinkCondition,
    ) -> (Self, Self) {
        let (tx_a_to_b, rx_a_to_b) = std::sync::mpsc::channel();
        let (tx_b_to_a, rx_b_to_a) = std::sync::mpsc::channel();

        let a = MockEndpoint {
            self_addr: addr_a,
            peer_addr: addr_b,
            tx: tx_a_to_b,
            rx: rx_b_to_a,
            read_timeout: Mutex::new(None),
            nonblocking: Mutex::new(false),
            outbound_link: Arc::new(Mutex::new(a_to_b_link)),
        };
        let b = MockEndpoint {
            self_addr: addr_b,
            peer_addr: addr_a,
            tx: tx_b_to_a,
            rx: rx_a_to_b,
            read_timeout: Mutex::new(None),
            nonblocking: Mutex::new(false),
            outbound_link: Arc::new(Mutex::new(b_to_a_link)),
        };
        (a, b)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }
}

impl Endpoint for MockEndpoint {
    fn send_to(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
        let link = self.outbound_link.lock().unwrap();
        if link.should_drop(buf) {
            return Ok(buf.len());
        }
        drop(link);
        self.tx
            .send((buf.to_vec(), self.self_addr))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer endpoint dropped"))?;
        let _ = addr;
        Ok(buf.len())
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let nonblocking = *self.nonblocking.lock().unwrap();
        let datagram = if nonblocking {
            match self.rx.try_recv() {
                Ok(d) => d,
                Err(TryRecvError::Empty) => {
                    return Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagram ready"))
                }
                Err(TryRecvError::Disconnected) => {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer endpoint dropped"))
                }
            }
        } else {
            let timeout = *self.read_timeout.lock().unwrap();
            match timeout {
                Some(dur) => self.rx.recv_timeout(dur).map_err(|e| match e {
                    RecvTimeoutError::Timeout => io::Error::new(io::ErrorKind::TimedOut, "read timeout elapsed"),
                    RecvTimeoutError::Disconnected => {
                        io::Error::new(io::ErrorKind::BrokenPipe, "peer endpoint dropped")
                    }
                })?,
                None => self
                    .rx
                    .recv()
                    .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer endpoint dropped"))?,
            }
        };

        let (data, from) = datagram;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok((n, from))
    }

    fn set_read_timeout(&self, dur: Option<Duration>) -> io::Result<()> {
        *self.read_timeout.lock().unwrap() = dur;
        Ok(())
    }

    fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        *self.nonblocking.lock().unwrap() = nonblocking;
        Ok(())
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.self_addr)
    }
}
