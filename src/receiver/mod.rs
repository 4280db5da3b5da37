//! Receiver state machine (spec component design §4.5):
//! `Listening -> Handshaked -> Receiving -> Closing -> Closed`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::endpoint::Endpoint;
use crate::error::{QuicError, QuicResult, ReassemblyError};
use crate::packet::{
    AckPacket, ConnectionId, Frame, FrameType, Packet, ShortHeader, CLIENT_HELLO, LONG_FORM_BIT, SERVER_HELLO,
};

const RECV_BUF_LEN: usize = 2048;

#[derive(Clone, Debug)]
pub struct ReceiverConfig {
    pub ack_delay_ms: u16,
    pub idle_timeout: Duration,
    pub retransmission_timeout: Duration,
    pub bind_addr: SocketAddr,
    pub output_path: PathBuf,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            ack_delay_ms: 20,
            idle_timeout: Duration::from_secs(10),
            retransmission_timeout: Duration::from_millis(10),
            bind_addr: "0.0.0.0:9997".parse().unwrap(),
            output_path: PathBuf::from("received.txt"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReceiverState {
    Listening,
    Handshaked,
    Receiving,
    Closing,
    Closed,
}

pub struct ReceiverSession<E: Endpoint> {
    endpoint: E,
    config: ReceiverConfig,
    state: ReceiverState,
    peer_cid: Option<ConnectionId>,
    peer_addr: Option<SocketAddr>,
    self_cid: ConnectionId,
    ack_packet_number: u32,
    /// Out-of-order STREAM bytes buffered by offset, waiting for the
    /// contiguous prefix to catch up to them.
    pending: BTreeMap<u64, Vec<u8>>,
    /// The next byte offset the output file is missing.
    next_offset: u64,
    /// Highest `offset + len` observed across any STREAM frame, acked or
    /// not; used to report how large the stream turned out to be if a
    /// hole is still open at close time.
    high_watermark: u64,
    output: Option<File>,
}

impl<E: Endpoint> ReceiverSession<E> {
    pub fn new(endpoint: E, config: ReceiverConfig) -> Self {
        Self {
            endpoint,
            config,
            state: ReceiverState::Listening,
            peer_cid: None,
            peer_addr: None,
            self_cid: ConnectionId::RECEIVER,
            ack_packet_number: 0,
            pending: BTreeMap::new(),
            next_offset: 0,
            high_watermark: 0,
            output: None,
        }
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn ack_packets_sent(&self) -> u32 {
        self.ack_packet_number
    }

    pub fn run(&mut self) -> QuicResult<()> {
        self.listen()?;
        let stashed = self.handshaked()?;
        self.state = ReceiverState::Receiving;
        self.output = Some(File::create(&self.config.output_path)?);
        self.receive(stashed)
    }

    fn listen(&mut self) -> QuicResult<()> {
        self.endpoint.set_nonblocking(false)?;
        self.endpoint.set_read_timeout(None)?;
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let (n, from) = self.endpoint.recv_from(&mut buf).map_err(QuicError::EndpointIo)?;
            if buf[0] & LONG_FORM_BIT == 0 {
                return Err(QuicError::UnexpectedDataBeforeHandshake);
            }
            match Packet::decode(&buf[..n]) {
                Ok(Packet::Handshake { header, frame })
                    if frame.frame_type == FrameType::Handshake
                        && frame.data == CLIENT_HELLO.as_bytes()
                        && header.scid.get() != 0 =>
                {
                    self.peer_cid = Some(header.scid);
                    self.peer_addr = Some(from);
                    tracing::info!(peer_cid = header.scid.get(), "received ClientHello");
                    self.send_server_hello()?;
                    self.state = ReceiverState::Handshaked;
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(?e, "dropped malformed datagram before handshake");
                    continue;
                }
            }
        }
    }

    fn handshaked(&mut self) -> QuicResult<Option<(Vec<u8>, SocketAddr)>> {
        let deadline = Instant::now() + self.config.retransmission_timeout;
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            self.endpoint.set_read_timeout(Some(remaining))?;
            match self.endpoint.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if buf[0] & LONG_FORM_BIT == 0 {
                        return Ok(Some((buf[..n].to_vec(), from)));
                    }
                    match Packet::decode(&buf[..n]) {
                        Ok(Packet::Handshake { frame, .. }) if frame.data == CLIENT_HELLO.as_bytes() => {
                            tracing::debug!("duplicate ClientHello, re-sending ServerHello");
                            self.send_server_hello()?;
                        }
                        _ => {}
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => return Ok(None),
                Err(e) => return Err(QuicError::EndpointIo(e)),
            }
        }
    }

    fn receive(&mut self, stashed: Option<(Vec<u8>, SocketAddr)>) -> QuicResult<()> {
        self.endpoint.set_nonblocking(false)?;
        let mut pending_datagram = stashed;
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            let (bytes, from) = match pending_datagram.take() {
                Some(d) => d,
                None => {
                    self.endpoint.set_read_timeout(Some(self.config.idle_timeout))?;
                    match self.endpoint.recv_from(&mut buf) {
                        Ok((n, from)) => (buf[..n].to_vec(), from),
                        Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                            tracing::warn!("idle timeout elapsed with no datagram received");
                            return Err(QuicError::IdleTimeout);
                        }
                        Err(e) => return Err(QuicError::EndpointIo(e)),
                    }
                }
            };
            self.peer_addr = Some(from);

            if bytes.first().copied().unwrap_or(0) & LONG_FORM_BIT != 0 {
                // Stray long-form datagram (a late duplicate ClientHello, a
                // misrouted ACK) after the handshake; drop and continue.
                continue;
            }

            let (header, payload) = match ShortHeader::decode(&bytes) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(?e, "dropped malformed short-header datagram");
                    continue;
                }
            };
            let frame = match Frame::decode(payload, ShortHeader::len()) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(?e, "dropped malformed frame");
                    continue;
                }
            };

            match frame.frame_type {
                FrameType::ConnectionClose => {
                    tracing::info!("received CONNECTION_CLOSE");
                    self.state = ReceiverState::Closing;
                    return self.close();
                }
                FrameType::Stream => {
                    self.ingest_stream_frame(&frame)?;
                    self.run_ack_batch(header.packet_number)?;
                }
                FrameType::Handshake | FrameType::LegacyAck => {
                    // superseded by the ACK packet format (spec §9); ignored.
                }
            }
        }
    }

    fn ingest_stream_frame(&mut self, frame: &Frame) -> QuicResult<()> {
        let end = frame.offset + frame.data.len() as u64;
        self.high_watermark = self.high_watermark.max(end);
        self.pending.entry(frame.offset).or_insert_with(|| frame.data.clone());
        self.flush_contiguous_prefix()
    }

    fn flush_contiguous_prefix(&mut self) -> QuicResult<()> {
        while let Some(chunk) = self.pending.get(&self.next_offset).cloned() {
            if let Some(output) = self.output.as_mut() {
                output.write_all(&chunk)?;
            }
            self.pending.remove(&self.next_offset);
            self.next_offset += chunk.len() as u64;
        }
        Ok(())
    }

    /// §4.5 ACK coalescing: collects further packet numbers until
    /// `ack_delay` elapses since the first STREAM packet of the batch,
    /// then emits a single ACK packet covering every number seen.
    fn run_ack_batch(&mut self, first_pn: u32) -> QuicResult<()> {
        let mut received = vec![first_pn];
        let batch_deadline = Instant::now() + Duration::from_millis(self.config.ack_delay_ms as u64);
        let mut buf = [0u8; RECV_BUF_LEN];

        loop {
            let remaining = batch_deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            self.endpoint.set_read_timeout(Some(remaining))?;
            match self.endpoint.recv_from(&mut buf) {
                Ok((n, _from)) => {
                    if buf[0] & LONG_FORM_BIT != 0 {
                        continue;
                    }
                    let (header, payload) = match ShortHeader::decode(&buf[..n]) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    let frame = match Frame::decode(payload, ShortHeader::len()) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    match frame.frame_type {
                        FrameType::Stream => {
                            self.ingest_stream_frame(&frame)?;
                            if !received.contains(&header.packet_number) {
                                received.push(header.packet_number);
                            }
                        }
                        FrameType::ConnectionClose => {
                            // finish this batch's ACK before honoring close.
                            break;
                        }
                        _ => {}
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => break,
                Err(e) => return Err(QuicError::EndpointIo(e)),
            }
        }

        received.sort_unstable();
        let ranges = collapse_to_ranges(&received);
        self.ack_packet_number += 1;
        let ack = AckPacket::new(
            self.peer_cid.expect("peer CID learned at handshake"),
            self.ack_packet_number,
            self.config.ack_delay_ms,
            ranges,
        );
        let packet = Packet::Ack(ack);
        self.endpoint
            .send_to(&packet.encode(), self.peer_addr.expect("peer address known by Receiving"))?;
        Ok(())
    }

    fn send_server_hello(&mut self) -> QuicResult<()> {
        let header = crate::packet::LongHeader::handshake(self.peer_cid.unwrap_or(ConnectionId::new(0)), self.self_cid);
        let frame = Frame::handshake(0, SERVER_HELLO);
        let packet = Packet::Handshake { header, frame };
        self.endpoint
            .send_to(&packet.encode(), self.peer_addr.expect("peer address known after ClientHello"))?;
        tracing::info!("sent ServerHello");
        Ok(())
    }

    fn close(&mut self) -> QuicResult<()> {
        if !self.pending.is_empty() {
            return Err(ReassemblyError::IncompleteStream {
                received_bytes: self.next_offset,
                expected_bytes: self.high_watermark,
            }
            .into());
        }
        if let Some(output) = self.output.as_mut() {
            output.flush()?;
        }

        self.ack_packet_number += 1;
        let header = ShortHeader::new(self.peer_cid.expect("peer CID known at close"), self.ack_packet_number);
        let frame = Frame::connection_close(0);
        let packet = Packet::Data { header, frame };
        self.endpoint
            .send_to(&packet.encode(), self.peer_addr.expect("peer address known at close"))?;
        tracing::info!("echoed CONNECTION_CLOSE, session closed");

        self.state = ReceiverState::Closed;
        Ok(())
    }
}

/// Collapses a sorted slice of packet numbers into ascending,
/// non-overlapping inclusive `[low, high]` ranges (spec §4.5/§8).
fn collapse_to_ranges(sorted: &[u32]) -> Vec<(u32, u32)> {
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let low = sorted[i];
        let mut high = low;
        while i + 1 < sorted.len() && sorted[i + 1] == high + 1 {
            i += 1;
            high = sorted[i];
        }
        ranges.push((low, high));
        i += 1;
    }
    ranges
}
