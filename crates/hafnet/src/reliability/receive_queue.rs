//! Inbound reliable stream: reordering, in-order delivery and the
//! coalesced acknowledgement.

use crate::protocol::RMessage;
use crate::seq::seq_diff;
use std::collections::HashMap;
use tokio::time::{Duration, Instant};

/// How long a pending acknowledgement is held back so that a burst of
/// contiguous deliveries collapses into one ACK.
pub const ACK_HOLD: Duration = Duration::from_millis(30);

/// Reassembles the inbound reliable stream into exactly-once, in-order
/// deliveries.
#[derive(Debug, Default)]
pub struct ReceiveQueue {
    /// Next expected sequence number; everything before it has been
    /// delivered.
    rseq: u16,
    /// Messages that arrived ahead of the stream, keyed by seq.
    waiting: HashMap<u16, RMessage>,
    /// Highest contiguously delivered seq awaiting acknowledgement.
    ackseq: u16,
    /// When the pending ack was scheduled; `None` when nothing is owed.
    acktime: Option<Instant>,
}

impl ReceiveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts one reassembled message. In-order messages are appended to
    /// `out` together with everything they unblock; messages from the
    /// future wait in the reorder buffer; stale ones are dropped.
    pub fn receive(&mut self, msg: RMessage, now: Instant, out: &mut Vec<RMessage>) {
        let sd = seq_diff(msg.seq, self.rseq);
        if sd == 0 {
            self.deliver(msg, now, out);
            while let Some(next) = self.waiting.remove(&self.rseq) {
                self.deliver(next, now, out);
            }
        } else if sd > 0 {
            self.waiting.insert(msg.seq, msg);
        }
        // sd < 0: already delivered, drop silently.
    }

    fn deliver(&mut self, msg: RMessage, now: Instant, out: &mut Vec<RMessage>) {
        self.ackseq = msg.seq;
        if self.acktime.is_none() {
            self.acktime = Some(now);
        }
        self.rseq = self.rseq.wrapping_add(1);
        out.push(msg);
    }

    /// Returns the sequence number to acknowledge once the hold window has
    /// elapsed, clearing the pending state.
    pub fn take_due_ack(&mut self, now: Instant) -> Option<u16> {
        match self.acktime {
            Some(scheduled) if now.duration_since(scheduled) >= ACK_HOLD => {
                self.acktime = None;
                Some(self.ackseq)
            }
            _ => None,
        }
    }

    /// Deadline for the pending coalesced ack, if one is owed.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.acktime.map(|scheduled| scheduled + ACK_HOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn msg(seq: u16) -> RMessage {
        RMessage::new(seq, 1, Bytes::new())
    }

    #[test]
    fn in_order_stream_delivers_directly() {
        let mut queue = ReceiveQueue::new();
        let now = Instant::now();
        let mut out = Vec::new();
        for seq in 0..3 {
            queue.receive(msg(seq), now, &mut out);
        }
        let seqs: Vec<u16> = out.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn reordered_stream_is_straightened_out() {
        let mut queue = ReceiveQueue::new();
        let now = Instant::now();
        let mut out = Vec::new();

        // Seqs 2, 3, 4 arrive first, then 0, then 1.
        for seq in 2..5 {
            queue.receive(msg(seq), now, &mut out);
        }
        assert!(out.is_empty());
        assert!(queue.next_deadline().is_none());

        queue.receive(msg(0), now, &mut out);
        assert_eq!(out.len(), 1);
        queue.receive(msg(1), now, &mut out);

        let seqs: Vec<u16> = out.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2, 3, 4]);

        // One ack for the whole run, due a hold window after the first
        // delivery.
        assert_eq!(queue.take_due_ack(now + ACK_HOLD), Some(4));
        assert_eq!(queue.take_due_ack(now + ACK_HOLD), None);
    }

    #[test]
    fn duplicates_are_dropped() {
        let mut queue = ReceiveQueue::new();
        let now = Instant::now();
        let mut out = Vec::new();
        queue.receive(msg(0), now, &mut out);
        queue.receive(msg(0), now, &mut out);
        queue.receive(msg(1), now, &mut out);
        queue.receive(msg(0), now, &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn ack_is_held_for_the_full_window() {
        let mut queue = ReceiveQueue::new();
        let t0 = Instant::now();
        let mut out = Vec::new();

        // Ten contiguous deliveries inside 10 ms.
        for seq in 0..10 {
            let at = t0 + Duration::from_millis(seq as u64);
            queue.receive(msg(seq), at, &mut out);
        }
        assert_eq!(out.len(), 10);

        // Nothing is owed before the window closes; the window is counted
        // from the first delivery.
        assert_eq!(queue.take_due_ack(t0 + Duration::from_millis(29)), None);
        assert_eq!(queue.take_due_ack(t0 + ACK_HOLD), Some(9));
        // And nothing afterwards until the next delivery.
        assert_eq!(queue.take_due_ack(t0 + Duration::from_secs(1)), None);
        assert!(queue.next_deadline().is_none());
    }

    #[test]
    fn stream_wraps_with_the_sequence_space() {
        let mut queue = ReceiveQueue::new();
        let now = Instant::now();
        let mut out = Vec::new();

        // Fast-forward the cursor to the end of the space.
        for seq in 0..65535u32 {
            queue.receive(msg(seq as u16), now, &mut out);
        }
        out.clear();

        queue.receive(msg(0), now, &mut out); // future: waits for 65535
        assert!(out.is_empty());
        queue.receive(msg(65535), now, &mut out);
        let seqs: Vec<u16> = out.iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![65535, 0]);
    }
}
