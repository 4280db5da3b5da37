//! Sender state machine:
//! `Idle -> Handshaking -> Sending -> Draining -> Closing -> Closed`.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::endpoint::Endpoint;
use crate::error::{QuicError, QuicResult};
use crate::packet::{ConnectionId, Frame, LongHeader, Packet, ShortHeader};
use crate::recovery::{DetectorContext, LossDetector, PtoDetector, ReorderingDetector, TimeThresholdDetector};
use crate::tracking::{InFlight, TrackingQueue};

const RECV_BUF_LEN: usize = 2048;

/// Every sender-side tunable, with its default for the common case.
#[derive(Clone, Debug)]
pub struct SenderConfig {
    pub time_threshold: Duration,
    pub reordering_threshold: u32,
    pub pto_timeout: Duration,
    pub handshake_timeout: Duration,
    pub max_handshake_retries: u32,
    pub max_payload: usize,
    pub bind_addr: SocketAddr,
    pub peer_addr: SocketAddr,
    pub file_path: PathBuf,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            time_threshold: Duration::from_millis(100),
            reordering_threshold: 10,
            pto_timeout: Duration::from_millis(50),
            handshake_timeout: Duration::from_millis(5),
            max_handshake_retries: 20,
            max_payload: 1024,
            bind_addr: "0.0.0.0:0".parse().unwrap(),
            peer_addr: "127.0.0.1:9997".parse().unwrap(),
            file_path: PathBuf::from("file.txt"),
        }
    }
}

impl SenderConfig {
    /// Validates the configuration, raising `NoRecoveryAlgorithm` (spec
    /// §6/§7) if both loss detectors would be disabled. Checked before
    /// any socket is opened.
    pub fn validated(self) -> QuicResult<Self> {
        if self.time_threshold.is_zero() && self.reordering_threshold == 0 {
            return Err(QuicError::NoRecoveryAlgorithm);
        }
        Ok(self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SenderState {
    Idle,
    Handshaking,
    Sending,
    Draining,
    Closing,
    Closed,
}

/// Retransmission counters broken out by the detector that triggered
/// them, for diagnostics (spec §4.3).
#[derive(Default, Clone, Copy, Debug)]
pub struct RetransmitStats {
    pub total: u64,
    pub time_threshold: u64,
    pub reordering: u64,
    pub pto: u64,
}

pub struct SenderSession<E: Endpoint> {
    endpoint: E,
    config: SenderConfig,
    state: SenderState,
    queue: TrackingQueue,
    current_packet_number: u32,
    stats: RetransmitStats,
    time_detector: Option<TimeThresholdDetector>,
    reordering_detector: Option<ReorderingDetector>,
    pto_detector: PtoDetector,
    last_ack_arrival: Option<Instant>,
    scid: ConnectionId,
    dcid: ConnectionId,
}

impl<E: Endpoint> SenderSession<E> {
    pub fn new(endpoint: E, config: SenderConfig) -> Self {
        let time_detector = (!config.time_threshold.is_zero()).then(|| TimeThresholdDetector {
            time_threshold: config.time_threshold,
        });
        let reordering_detector = (config.reordering_threshold > 0).then(|| ReorderingDetector {
            reordering_threshold: config.reordering_threshold,
        });
        let pto_detector = PtoDetector {
            pto_timeout: config.pto_timeout,
        };
        Self {
            endpoint,
            state: SenderState::Idle,
            queue: TrackingQueue::new(),
            current_packet_number: 0,
            stats: RetransmitStats::default(),
            time_detector,
            reordering_detector,
            pto_detector,
            last_ack_arrival: None,
            scid: ConnectionId::SENDER,
            dcid: ConnectionId::RECEIVER,
            config,
        }
    }

    pub fn stats(&self) -> RetransmitStats {
        self.stats
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Drives the session through every state to `Closed`, transferring
    /// the configured file. Returns once the close handshake finishes
    /// (or times out — closing never fails the session).
    pub fn run(&mut self) -> QuicResult<()> {
        self.handshake()?;
        self.send_file()?;
        self.drain()?;
        self.close()?;
        Ok(())
    }

    fn handshake(&mut self) -> QuicResult<()> {
        self.state = SenderState::Handshaking;
        self.endpoint.set_nonblocking(false)?;
        self.endpoint.set_read_timeout(Some(self.config.handshake_timeout))?;

        let client_hello = self.encode_client_hello();
        self.endpoint.send_to(&client_hello, self.config.peer_addr)?;
        tracing::info!("sent ClientHello");

        let mut retries = 0u32;
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            match self.endpoint.recv_from(&mut buf) {
                Ok((n, _)) => match Packet::decode(&buf[..n]) {
                    Ok(Packet::Handshake { frame, .. }) if frame.data == crate::packet::SERVER_HELLO.as_bytes() => {
                        tracing::info!("received ServerHello, handshake complete");
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(?e, "dropped malformed datagram during handshake");
                        continue;
                    }
                },
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    retries += 1;
                    if retries > self.config.max_handshake_retries {
                        return Err(QuicError::HandshakeRetryExceeded {
                            limit: self.config.max_handshake_retries,
                        });
                    }
                    tracing::debug!(retries, "handshake timeout, retransmitting ClientHello");
                    self.endpoint.send_to(&client_hello, self.config.peer_addr)?;
                }
                Err(e) => return Err(QuicError::EndpointIo(e)),
            }
        }

        self.endpoint.set_read_timeout(None)?;
        self.endpoint.set_nonblocking(true)?;
        Ok(())
    }

    fn encode_client_hello(&self) -> Vec<u8> {
        let header = LongHeader::client_hello(self.dcid, self.scid);
        let frame = Frame::handshake(0, crate::packet::CLIENT_HELLO);
        Packet::Handshake { header, frame }.encode()
    }

    fn send_file(&mut self) -> QuicResult<()> {
        self.state = SenderState::Sending;
        let file = File::open(&self.config.file_path)?;
        let mut reader = BufReader::new(file);
        let mut bytes_sent: u64 = 0;
        let mut chunk = vec![0u8; self.config.max_payload];

        loop {
            let n = reader.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            self.current_packet_number += 1;
            let pn = self.current_packet_number;
            let frame = Frame::stream(0, bytes_sent, chunk[..n].to_vec());
            let header = ShortHeader::new(self.dcid, pn);
            let encoded = header.encode(&frame.encode());

            self.endpoint.send_to(&encoded, self.config.peer_addr)?;
            self.queue.enqueue(InFlight::new(pn, Instant::now(), encoded));
            bytes_sent += n as u64;

            self.drain_acks();
            self.run_loss_detectors(false);
        }

        tracing::info!(bytes_sent, "finished sending file, entering drain phase");
        Ok(())
    }

    fn drain(&mut self) -> QuicResult<()> {
        self.state = SenderState::Draining;
        while !self.queue.is_empty() {
            self.drain_acks();
            self.run_loss_detectors(true);
        }
        Ok(())
    }

    fn close(&mut self) -> QuicResult<()> {
        self.state = SenderState::Closing;
        self.current_packet_number += 1;
        let header = ShortHeader::new(self.dcid, self.current_packet_number);
        let frame = Frame::connection_close(0);
        let encoded = header.encode(&frame.encode());
        self.endpoint.send_to(&encoded, self.config.peer_addr)?;
        tracing::info!("sent CONNECTION_CLOSE");

        let deadline = if self.config.time_threshold.is_zero() {
            Duration::from_millis(50)
        } else {
            self.config.time_threshold
        };
        self.endpoint.set_nonblocking(false)?;
        self.endpoint.set_read_timeout(Some(deadline))?;

        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            match self.endpoint.recv_from(&mut buf) {
                Ok((n, _)) => match Packet::decode(&buf[..n]) {
                    Ok(Packet::Data { frame, .. }) if frame.data == crate::packet::CONNECTION_CLOSE_LITERAL.as_bytes() => {
                        tracing::info!("received CONNECTION_CLOSE echo");
                        break;
                    }
                    _ => continue,
                },
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    tracing::debug!("close deadline elapsed without an echo");
                    break;
                }
                Err(e) => return Err(QuicError::EndpointIo(e)),
            }
        }

        self.state = SenderState::Closed;
        Ok(())
    }

    fn drain_acks(&mut self) {
        let mut buf = [0u8; RECV_BUF_LEN];
        loop {
            match self.endpoint.recv_from(&mut buf) {
                Ok((n, _)) => match Packet::decode(&buf[..n]) {
                    Ok(Packet::Ack(ack)) => {
                        self.queue.mark_acked_ranges(&ack.ranges);
                        self.queue.trim_acked_prefix();
                        self.last_ack_arrival = Some(Instant::now());
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(?e, "dropped malformed datagram during ACK intake"),
                },
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => break,
                Err(e) => {
                    tracing::warn!(?e, "endpoint read error during ACK intake");
                    break;
                }
            }
        }
    }

    fn run_loss_detectors(&mut self, draining: bool) {
        let ctx = DetectorContext {
            now: Instant::now(),
            last_ack_arrival: self.last_ack_arrival,
            draining,
            reordering_threshold: self.config.reordering_threshold,
        };

        if let Some(detector) = self.time_detector.as_mut() {
            let indices = detector.detect(&self.queue, &ctx);
            self.retransmit(indices, detector.name());
        }
        if let Some(detector) = self.reordering_detector.as_mut() {
            let indices = detector.detect(&self.queue, &ctx);
            self.retransmit(indices, detector.name());
        }
        if draining {
            let indices = self.pto_detector.detect(&self.queue, &ctx);
            self.retransmit(indices, self.pto_detector.name());
        }
    }

    /// Retransmits every lost index. Processed in descending order so
    /// that removing-and-reappending an earlier index never invalidates
    /// a later index still pending in this batch.
    fn retransmit(&mut self, mut indices: Vec<usize>, detector_name: &'static str) {
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for idx in indices {
            self.current_packet_number += 1;
            let pn = self.current_packet_number;
            let bytes = self.queue.rebuild(idx, pn, Instant::now(), self.dcid);
            if let Err(e) = self.endpoint.send_to(&bytes, self.config.peer_addr) {
                tracing::warn!(?e, "failed to retransmit packet");
                continue;
            }

            self.stats.total += 1;
            match detector_name {
                "time_threshold" => self.stats.time_threshold += 1,
                "reordering" => self.stats.reordering += 1,
                "pto" => self.stats.pto += 1,
                _ => {}
            }
            tracing::debug!(packet_number = pn, detector = detector_name, "retransmitted lost packet");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io;
    use std::sync::Mutex;

    /// A minimal stand-in for a socket that just records what it was
    /// asked to send, for exercising `SenderSession` methods directly
    /// without going through `MockEndpoint`'s channel-backed link.
    #[derive(Default)]
    struct RecordingEndpoint {
        sent: Mutex<Vec<Vec<u8>>>,
    }

    impl Endpoint for RecordingEndpoint {
        fn send_to(&self, buf: &[u8], _addr: SocketAddr) -> io::Result<usize> {
            self.sent.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }

        fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "no datagram ready"))
        }

        fn set_read_timeout(&self, _dur: Option<Duration>) -> io::Result<()> {
            Ok(())
        }

        fn set_nonblocking(&self, _nonblocking: bool) -> io::Result<()> {
            Ok(())
        }

        fn local_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:0".parse().unwrap())
        }
    }

    fn test_config() -> SenderConfig {
        SenderConfig {
            time_threshold: Duration::from_millis(100),
            reordering_threshold: 10,
            ..SenderConfig::default()
        }
    }

    #[test]
    fn validated_rejects_both_detectors_disabled() {
        let config = SenderConfig {
            time_threshold: Duration::ZERO,
            reordering_threshold: 0,
            ..SenderConfig::default()
        };
        assert!(matches!(config.validated(), Err(QuicError::NoRecoveryAlgorithm)));
    }

    #[test]
    fn validated_accepts_either_detector_alone() {
        let time_only = SenderConfig {
            time_threshold: Duration::from_millis(50),
            reordering_threshold: 0,
            ..SenderConfig::default()
        };
        assert!(time_only.validated().is_ok());

        let reordering_only = SenderConfig {
            time_threshold: Duration::ZERO,
            reordering_threshold: 5,
            ..SenderConfig::default()
        };
        assert!(reordering_only.validated().is_ok());
    }

    #[test]
    fn new_session_starts_idle_with_empty_queue() {
        let session = SenderSession::new(RecordingEndpoint::default(), test_config());
        assert_eq!(session.state(), SenderState::Idle);
        assert_eq!(session.queue.len(), 0);
        assert_eq!(session.stats().total, 0);
    }

    #[test]
    fn retransmit_assigns_fresh_ascending_packet_numbers_and_updates_stats() {
        let mut session = SenderSession::new(RecordingEndpoint::default(), test_config());
        session.current_packet_number = 3;
        for pn in 1..=3u32 {
            let header = ShortHeader::new(session.dcid, pn);
            let frame = Frame::stream(0, pn as u64 * 10, vec![pn as u8; 4]);
            session
                .queue
                .enqueue(InFlight::new(pn, Instant::now(), header.encode(&frame.encode())));
        }

        // Indices 0 and 2 (packet numbers 1 and 3) are lost; index 1 stays.
        session.retransmit(vec![2, 0], "time_threshold");

        assert_eq!(session.stats().total, 2);
        assert_eq!(session.stats().time_threshold, 2);
        assert_eq!(session.stats().reordering, 0);
        assert_eq!(session.stats().pto, 0);

        // The untouched descriptor (original packet 2) is now at the
        // head; the two retransmitted ones were moved to the tail with
        // fresh, strictly increasing packet numbers.
        assert_eq!(session.queue.len(), 3);
        assert_eq!(session.queue.get(0).unwrap().packet_number, 2);
        let retransmitted: Vec<u32> = (1..3).map(|i| session.queue.get(i).unwrap().packet_number).collect();
        assert_eq!(retransmitted, vec![4, 5]);
        assert!(retransmitted.iter().all(|pn| *pn > 3));

        assert_eq!(session.endpoint.sent.lock().unwrap().len(), 2);
    }

    #[test]
    fn retransmit_on_empty_selection_is_a_no_op() {
        let mut session = SenderSession::new(RecordingEndpoint::default(), test_config());
        let header = ShortHeader::new(session.dcid, 1);
        let frame = Frame::stream(0, 0, vec![1, 2, 3]);
        session
            .queue
            .enqueue(InFlight::new(1, Instant::now(), header.encode(&frame.encode())));

        session.retransmit(Vec::new(), "reordering");

        assert_eq!(session.stats().total, 0);
        assert_eq!(session.queue.len(), 1);
        assert_eq!(session.queue.get(0).unwrap().packet_number, 1);
        assert!(session.endpoint.sent.lock().unwrap().is_empty());
    }
}
