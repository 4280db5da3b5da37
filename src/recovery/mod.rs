//! Loss detection strategies that run on the sender after every ACK
//! intake cycle (spec component design §4.3). Each detector's job is
//! purely to *declare* loss by returning the queue indices it considers
//! lost; retransmitting (fresh packet number, re-encode, refresh
//! timestamp, move to tail, transmit, bump counters) is the sender's job,
//! since only the sender owns the socket and the packet-number counter.
//!
//! Every detector does a two-pass scan (collect indices, then let the
//! caller mutate) rather than copying the queue before iterating — the
//! teacher's `deep-copy-then-iterate` pattern in `QUIC_api.py` is the
//! thing this design note explicitly replaces.

use std::time::Instant;

use crate::tracking::TrackingQueue;

/// Shared context a detector needs beyond the queue itself.
pub struct DetectorContext {
    pub now: Instant,
    /// Timestamp of the most recent ACK received during this intake
    /// cycle. `None` means no ACK arrived this cycle, in which case the
    /// time detector compares against the last-known ACK arrival instead
    /// of `now` to avoid declaring loss while simply outrunning the
    /// network.
    pub last_ack_arrival: Option<Instant>,
    pub draining: bool,
    pub reordering_threshold: u32,
}

pub trait LossDetector {
    /// Returns the queue indices this detector considers lost. Does not
    /// mutate the queue; the caller retransmits each index afterward.
    fn detect(&mut self, queue: &TrackingQueue, ctx: &DetectorContext) -> Vec<usize>;

    fn name(&self) -> &'static str;
}

/// §4.3 "Time threshold detector". `time_threshold == Duration::ZERO`
/// disables the detector entirely (handled by the sender skipping
/// construction, not here).
pub struct TimeThresholdDetector {
    pub time_threshold: std::time::Duration,
}

impl LossDetector for TimeThresholdDetector {
    fn detect(&mut self, queue: &TrackingQueue, ctx: &DetectorContext) -> Vec<usize> {
        let reference = ctx.last_ack_arrival.unwrap_or(ctx.now);
        queue
            .iter()
            .filter(|(_, e)| !e.acked && reference.saturating_duration_since(e.send_timestamp) > self.time_threshold)
            .map(|(i, _)| i)
            .collect()
    }

    fn name(&self) -> &'static str {
        "time_threshold"
    }
}

/// §4.3 "Packet-number reordering detector", following RFC 9002 §6.1.1: a
/// packet is declared lost once `reordering_threshold` later packets
/// have been acknowledged.
pub struct ReorderingDetector {
    pub reordering_threshold: u32,
}

impl LossDetector for ReorderingDetector {
    fn detect(&mut self, queue: &TrackingQueue, _ctx: &DetectorContext) -> Vec<usize> {
        let last_acked_index = match queue.iter_reverse().find(|(_, e)| e.acked) {
            Some((i, _)) => i as i64,
            None => return Vec::new(),
        };
        let threshold = self.reordering_threshold as i64;
        queue
            .iter()
            .filter(|(i, e)| !e.acked && (*i as i64) < last_acked_index - threshold)
            .map(|(i, _)| i)
            .collect()
    }

    fn name(&self) -> &'static str {
        "reordering"
    }
}

/// §4.3 PTO detector. Active only during the drain phase, and only while
/// the queue is short enough that no further ACK is expected to trigger
/// the reordering detector naturally.
pub struct PtoDetector {
    pub pto_timeout: std::time::Duration,
}

impl LossDetector for PtoDetector {
    fn detect(&mut self, queue: &TrackingQueue, ctx: &DetectorContext) -> Vec<usize> {
        let activation_len = 2 * ctx.reordering_threshold.max(10) as usize;
        if !ctx.draining || queue.len() > activation_len {
            return Vec::new();
        }
        queue
            .iter()
            .filter(|(_, e)| !e.acked && ctx.now.saturating_duration_since(e.send_timestamp) > self.pto_timeout)
            .map(|(i, _)| i)
            .collect()
    }

    fn name(&self) -> &'static str {
        "pto"
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::{ConnectionId, Frame, ShortHeader};
    use crate::tracking::InFlight;
    use std::time::Duration;

    fn descriptor(pn: u32, send_timestamp: Instant) -> InFlight {
        let header = ShortHeader::new(ConnectionId::new(2), pn);
        let frame = Frame::stream(0, pn as u64, vec![0u8; 4]);
        InFlight::new(pn, send_timestamp, header.encode(&frame.encode()))
    }

    #[test]
    fn time_threshold_flags_only_stale_unacked_entries() {
        let now = Instant::now();
        let old = now - Duration::from_millis(500);
        let mut queue = TrackingQueue::new();
        queue.enqueue(descriptor(1, old));
        queue.enqueue(descriptor(2, now));

        let mut detector = TimeThresholdDetector {
            time_threshold: Duration::from_millis(100),
        };
        let ctx = DetectorContext {
            now,
            last_ack_arrival: Some(now),
            draining: false,
            reordering_threshold: 10,
        };
        let lost = detector.detect(&queue, &ctx);
        assert_eq!(lost, vec![0]);
    }

    #[test]
    fn reordering_detector_flags_packets_behind_the_threshold() {
        let now = Instant::now();
        let mut queue = TrackingQueue::new();
        for pn in 1..=15u32 {
            queue.enqueue(descriptor(pn, now));
        }
        // ack packet 13 (index 12): newest acked index is 12.
        queue.mark_acked_ranges(&[(13, 13)]);

        let mut detector = ReorderingDetector {
            reordering_threshold: 10,
        };
        let ctx = DetectorContext {
            now,
            last_ack_arrival: Some(now),
            draining: false,
            reordering_threshold: 10,
        };
        let lost = detector.detect(&queue, &ctx);
        // indices < 12 - 10 = 2 -> index 0 (pn 1), index 1 (pn 2)
        assert_eq!(lost, vec![0, 1]);
    }

    #[test]
    fn pto_detector_inactive_outside_drain_phase() {
        let now = Instant::now();
        let old = now - Duration::from_secs(1);
        let mut queue = TrackingQueue::new();
        queue.enqueue(descriptor(1, old));

        let mut detector = PtoDetector {
            pto_timeout: Duration::from_millis(50),
        };
        let ctx = DetectorContext {
            now,
            last_ack_arrival: None,
            draining: false,
            reordering_threshold: 10,
        };
        assert!(detector.detect(&queue, &ctx).is_empty());
    }

    #[test]
    fn pto_detector_active_during_drain_with_short_queue() {
        let now = Instant::now();
        let old = now - Duration::from_secs(1);
        let mut queue = TrackingQueue::new();
        queue.enqueue(descriptor(1, old));

        let mut detector = PtoDetector {
            pto_timeout: Duration::from_millis(50),
        };
        let ctx = DetectorContext {
            now,
            last_ack_arrival: None,
            draining: true,
            reordering_threshold: 10,
        };
        assert_eq!(detector.detect(&queue, &ctx), vec![0]);
    }

    #[test]
    fn pto_detector_inactive_when_queue_too_long() {
        let now = Instant::now();
        let old = now - Duration::from_secs(1);
        let mut queue = TrackingQueue::new();
        for pn in 1..=25u32 {
            queue.enqueue(descriptor(pn, old));
        }

        let mut detector = PtoDetector {
            pto_timeout: Duration::from_millis(50),
        };
        let ctx = DetectorContext {
            now,
            last_ack_arrival: None,
            draining: true,
            reordering_threshold: 10,
        };
        assert!(detector.detect(&queue, &ctx).is_empty());
    }
}
