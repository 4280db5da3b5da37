//! The sender's ordered collection of in-flight packet descriptors
//! (spec data model §3, component design §4.2). Owned exclusively by the
//! sender's main loop; no locking, no shared mutable state.

use std::collections::VecDeque;
use std::time::Instant;

use crate::packet::{ConnectionId, ShortHeader};

/// A single in-flight packet. Owns a copy of its encoded bytes so
/// retransmission never has to re-serialize from file state.
#[derive(Clone, Debug)]
pub struct InFlight {
    pub packet_number: u32,
    pub acked: bool,
    pub send_timestamp: Instant,
    pub encoded_bytes: Vec<u8>,
}

impl InFlight {
    pub fn new(packet_number: u32, send_timestamp: Instant, encoded_bytes: Vec<u8>) -> Self {
        Self {
            packet_number,
            acked: false,
            send_timestamp,
            encoded_bytes,
        }
    }
}

/// Ordered, oldest-to-newest collection of [`InFlight`] descriptors.
///
/// Packet numbers are strictly increasing at insertion time (enforced by
/// a debug assertion, since a violation is a programmer error rather than
/// a recoverable runtime condition). At most one descriptor exists per
/// in-flight packet number: retransmissions get fresh numbers, so the
/// queue never holds two entries for the same number.
#[derive(Default, Debug)]
pub struct TrackingQueue {
    entries: VecDeque<InFlight>,
}

impl TrackingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends at the tail. O(1).
    pub fn enqueue(&mut self, descriptor: InFlight) {
        if let Some(back) = self.entries.back() {
            debug_assert!(
                descriptor.packet_number > back.packet_number,
                "packet numbers must strictly increase at enqueue"
            );
        }
        self.entries.push_back(descriptor);
    }

    /// Marks every descriptor whose packet number falls in any of `ranges`
    /// as acked. `ranges` must be sorted ascending by `low` and
    /// non-overlapping (the receiver guarantees this); the scan is a
    /// single forward pass over the queue with a range cursor, so it is
    /// linear in queue length plus range count rather than nested loops.
    /// Idempotent: re-applying the same ranges leaves the queue unchanged.
    pub fn mark_acked_ranges(&mut self, ranges: &[(u32, u32)]) {
        let mut cursor = 0usize;
        for entry in self.entries.iter_mut() {
            while cursor < ranges.len() && entry.packet_number > ranges[cursor].1 {
                cursor += 1;
            }
            if cursor >= ranges.len() {
                break;
            }
            let (low, high) = ranges[cursor];
            if entry.packet_number >= low && entry.packet_number <= high {
                entry.acked = true;
            }
        }
    }

    /// Removes acked descriptors from the head while the head is acked.
    pub fn trim_acked_prefix(&mut self) {
        while matches!(self.entries.front(), Some(e) if e.acked) {
            self.entries.pop_front();
        }
    }

    /// Iterates newest to oldest, used by the reordering detector to find
    /// the newest acked descriptor's queue index.
    pub fn iter_reverse(&self) -> impl Iterator<Item = (usize, &InFlight)> {
        self.entries.iter().enumerate().rev()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &InFlight)> {
        self.entries.iter().enumerate()
    }

    pub fn get(&self, index: usize) -> Option<&InFlight> {
        self.entries.get(index)
    }

    /// Removes the descriptor at `index`, re-encodes its enclosed
    /// short-header packet with `new_packet_number` (preserving DCID and
    /// payload), stamps `send_timestamp = now`, and re-appends it at the
    /// tail. Returns the freshly encoded bytes for retransmission.
    ///
    /// Takes an index rather than a descriptor by value so detectors can
    /// act on a first-pass-collected list of indices without holding a
    /// borrow across the mutation (a two-pass scan, never a queue copy).
    pub fn rebuild(&mut self, index: usize, new_packet_number: u32, now: Instant, dcid: ConnectionId) -> Vec<u8> {
        let mut entry = self
            .entries
            .remove(index)
            .expect("rebuild called with an out-of-range index");

        let (_, payload) =
            ShortHeader::decode(&entry.encoded_bytes).expect("tracked descriptor held a malformed packet");
        let new_header = ShortHeader::new(dcid, new_packet_number);
        let new_bytes = new_header.encode(payload);

        entry.packet_number = new_packet_number;
        entry.send_timestamp = now;
        entry.acked = false;
        entry.encoded_bytes = new_bytes.clone();
        self.entries.push_back(entry);

        new_bytes
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::packet::Frame;

    fn descriptor(pn: u32) -> InFlight {
        let header = ShortHeader::new(ConnectionId::new(2), pn);
        let frame = Frame::stream(0, pn as u64 * 10, vec![pn as u8; 4]);
        InFlight::new(pn, Instant::now(), header.encode(&frame.encode()))
    }

    #[test]
    fn enqueue_and_trim_drains_fully_acked_queue() {
        let mut queue = TrackingQueue::new();
        for pn in 1..=5u32 {
            queue.enqueue(descriptor(pn));
        }
        queue.mark_acked_ranges(&[(1, 5)]);
        queue.trim_acked_prefix();
        assert!(queue.is_empty());
    }

    #[test]
    fn mark_acked_ranges_is_idempotent() {
        let mut queue = TrackingQueue::new();
        for pn in 1..=10u32 {
            queue.enqueue(descriptor(pn));
        }
        queue.mark_acked_ranges(&[(2, 4), (7, 8)]);
        let first: Vec<bool> = queue.iter().map(|(_, e)| e.acked).collect();
        queue.mark_acked_ranges(&[(2, 4), (7, 8)]);
        let second: Vec<bool> = queue.iter().map(|(_, e)| e.acked).collect();
        assert_eq!(first, second);
        assert!(first[1] && first[2] && first[3]);
        assert!(first[6] && first[7]);
        assert!(!first[0] && !first[4]);
    }

    #[test]
    fn trim_only_removes_contiguous_acked_prefix() {
        let mut queue = TrackingQueue::new();
        for pn in 1..=4u32 {
            queue.enqueue(descriptor(pn));
        }
        queue.mark_acked_ranges(&[(1, 2), (4, 4)]);
        queue.trim_acked_prefix();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get(0).unwrap().packet_number, 3);
    }

    #[test]
    fn iter_reverse_yields_newest_first() {
        let mut queue = TrackingQueue::new();
        for pn in 1..=3u32 {
            queue.enqueue(descriptor(pn));
        }
        let order: Vec<u32> = queue.iter_reverse().map(|(_, e)| e.packet_number).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[test]
    fn rebuild_moves_descriptor_to_tail_with_new_number() {
        let mut queue = TrackingQueue::new();
        for pn in 1..=3u32 {
            queue.enqueue(descriptor(pn));
        }
        let now = Instant::now();
        let bytes = queue.rebuild(0, 99, now, ConnectionId::new(2));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.get(0).unwrap().packet_number, 2);
        assert_eq!(queue.get(2).unwrap().packet_number, 99);
        assert!(!queue.get(2).unwrap().acked);

        let (header, _) = ShortHeader::decode(&bytes).unwrap();
        assert_eq!(header.packet_number, 99);
    }
}
