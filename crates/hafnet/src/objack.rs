//! Per-object frame acknowledgement batching.
//!
//! Every OBJDATA record updates one entry per object id; entries are
//! drained into OBJACK packets of (id, frame) pairs. The selection keeps
//! the long-standing behavior of the reference server's counterpart: an
//! entry is flushed while its transmit time still lies at or ahead of the
//! clock, and an entry whose transmit time has already passed is retained
//! until a new record refreshes it.

use bytes::{BufMut, Bytes, BytesMut};
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// Holdback counted from the newest record for an object.
const OBJACK_BATCH: Duration = Duration::from_millis(80);
/// Upper bound counted from the oldest unacknowledged record.
const OBJACK_TIMEOUT: Duration = Duration::from_millis(500);
/// An OBJACK packet is flushed before it would grow past this size.
const PACKET_LIMIT: usize = 1000 - 8;

#[derive(Debug)]
struct ObjAck {
    /// Highest frame number seen for the object since the last flush.
    frame: i32,
    /// First observation of the current unacknowledged run.
    frecv: Instant,
    /// Latest observation.
    lrecv: Instant,
}

impl ObjAck {
    fn txtime(&self) -> Instant {
        (self.lrecv + OBJACK_BATCH).min(self.frecv + OBJACK_TIMEOUT)
    }
}

#[derive(Debug, Default)]
pub struct ObjAckTracker {
    acks: HashMap<u32, ObjAck>,
}

impl ObjAckTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one OBJDATA record for the given object.
    pub fn observe(&mut self, id: u32, frame: i32, now: Instant) {
        self.acks
            .entry(id)
            .and_modify(|ack| {
                ack.frame = ack.frame.max(frame);
                ack.lrecv = now;
            })
            .or_insert(ObjAck {
                frame,
                frecv: now,
                lrecv: now,
            });
    }

    /// Drains the entries selected for transmission into OBJACK payloads.
    pub fn flush(&mut self, now: Instant) -> Vec<Bytes> {
        let selected: Vec<u32> = self
            .acks
            .iter()
            .filter(|(_, ack)| ack.txtime() >= now)
            .map(|(&id, _)| id)
            .collect();

        let mut packets = Vec::new();
        let mut buf = BytesMut::new();
        for id in selected {
            if let Some(ack) = self.acks.remove(&id) {
                if buf.len() + 8 > PACKET_LIMIT {
                    packets.push(buf.split().freeze());
                }
                buf.put_u32_le(id);
                buf.put_i32_le(ack.frame);
            }
        }
        if !buf.is_empty() {
            packets.push(buf.freeze());
        }
        packets
    }

    /// Wakeup for entries still held back; only transmit times ahead of
    /// the clock count (an elapsed one would stall the select instead).
    pub fn next_deadline(&self, now: Instant) -> Option<Instant> {
        self.acks
            .values()
            .map(ObjAck::txtime)
            .filter(|&txtime| txtime > now)
            .min()
    }

    pub fn len(&self) -> usize {
        self.acks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_records_keep_the_highest_frame() {
        let mut tracker = ObjAckTracker::new();
        let t0 = Instant::now();
        tracker.observe(7, 10, t0);
        tracker.observe(7, 14, t0 + Duration::from_millis(5));
        tracker.observe(7, 12, t0 + Duration::from_millis(9));

        let packets = tracker.flush(t0 + Duration::from_millis(9));
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..4], &7u32.to_le_bytes());
        assert_eq!(&packets[0][4..], &14i32.to_le_bytes());
        assert!(tracker.is_empty());
    }

    #[test]
    fn flushes_entries_whose_txtime_is_still_ahead() {
        // Freshly observed entries have their transmit time 80 ms out and
        // are therefore selected right away; an entry whose transmit time
        // has already slipped behind the clock stays put.
        let mut tracker = ObjAckTracker::new();
        let t0 = Instant::now();
        tracker.observe(1, 5, t0);
        tracker.observe(2, 6, t0);

        let late = t0 + Duration::from_millis(200);
        tracker.observe(3, 7, late);

        let packets = tracker.flush(late);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].len(), 8);
        assert_eq!(&packets[0][..4], &3u32.to_le_bytes());

        // Objects 1 and 2 were skipped and contribute no wakeup either.
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.next_deadline(late), None);

        // A fresh record for a stale object makes it eligible again.
        tracker.observe(1, 8, late);
        let packets = tracker.flush(late);
        assert_eq!(packets.len(), 1);
        assert_eq!(&packets[0][..4], &1u32.to_le_bytes());
        assert_eq!(&packets[0][4..], &8i32.to_le_bytes());
    }

    #[test]
    fn large_batches_split_below_the_packet_limit() {
        let mut tracker = ObjAckTracker::new();
        let t0 = Instant::now();
        for id in 0..200u32 {
            tracker.observe(id, id as i32, t0);
        }

        let packets = tracker.flush(t0);
        assert_eq!(packets.len(), 2);
        for packet in &packets {
            assert!(packet.len() <= PACKET_LIMIT);
            assert_eq!(packet.len() % 8, 0);
        }
        let total: usize = packets.iter().map(|p| p.len()).sum();
        assert_eq!(total, 200 * 8);
        assert!(tracker.is_empty());
    }

    #[test]
    fn observation_times_stay_ordered() {
        let mut tracker = ObjAckTracker::new();
        let t0 = Instant::now();
        tracker.observe(9, 1, t0);
        tracker.observe(9, 2, t0 + Duration::from_millis(50));
        let ack = tracker.acks.get(&9).unwrap();
        assert!(ack.lrecv >= ack.frecv);
        assert_eq!(ack.frecv, t0);
        assert_eq!(ack.frame, 2);
    }
}
